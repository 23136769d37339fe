//! Feeds decoded mail from an input stream to a transport.

use std::{fmt::Display, io::Read, io::Write, time::Duration};

use json2mail_common::{Mail, MailScanner, ScanError, internal};
use json2mail_delivery::Mailer;
use tokio::sync::mpsc;

use crate::{
    error::DriverError,
    log::{Clock, MailLog},
};

/// One decoded mail and the input text it came from.
#[derive(Debug)]
struct Record {
    mail: Mail,
    source: String,
}

/// What happened during a run.
#[derive(Debug, Default)]
pub struct Summary {
    pub sent: usize,
    pub invalid: usize,
    pub failed: usize,
    /// The decode error that ended the input early, if any.
    pub scan_error: Option<ScanError>,
}

impl Summary {
    /// Returns `true` if the whole input was decoded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.scan_error.is_none()
    }
}

/// Decode `input` to the end and deliver every valid mail through `mailer`.
///
/// Decoding happens on a blocking thread that stays at most one record ahead
/// of delivery. Invalid mail and failed sends are logged and skipped; a
/// decode error is logged and stops the run. The mailer is closed at the end
/// in every case.
///
/// # Errors
///
/// [`DriverError::Reader`] if the decoding thread panicked.
pub async fn run<R, W, C>(
    input: R,
    mut mailer: Box<dyn Mailer>,
    log: &mut MailLog<W, C>,
    interval: Duration,
) -> Result<Summary, DriverError>
where
    R: Read + Send + 'static,
    W: Write,
    C: Clock,
{
    let (tx, mut rx) = mpsc::channel::<Record>(1);

    let reader = tokio::task::spawn_blocking(move || {
        let mut scanner = MailScanner::new(input);

        while scanner.advance() {
            let Some(mail) = scanner.current().cloned() else {
                break;
            };
            let record = Record {
                mail,
                source: scanner.raw_text(),
            };
            if tx.blocking_send(record).is_err() {
                break;
            }
        }

        let source = scanner.raw_text();
        scanner.take_error().map(|err| (err, source))
    });

    let mut summary = Summary::default();
    let mut sent_before = false;

    while let Some(Record { mail, source }) = rx.recv().await {
        if let Err(err) = mail.validate() {
            internal!(level = WARN, "Skipping invalid mail: {err}");
            write_error(log, &err, &source);
            summary.invalid += 1;
            continue;
        }

        if sent_before && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        sent_before = true;

        match mailer.send(&mail).await {
            Ok(()) => {
                internal!(level = INFO, "Sent mail to {}", mail.to);
                if let Err(err) = log.mail(&mail) {
                    internal!(level = ERROR, "Failed to write mail log: {err}");
                }
                summary.sent += 1;
            }
            Err(err) => {
                internal!(level = WARN, "Failed to send mail to {}: {err}", mail.to);
                write_error(log, &err, &source);
                summary.failed += 1;
            }
        }
    }

    let scan_failure = reader.await;

    if let Ok(Some((err, source))) = &scan_failure {
        internal!(level = ERROR, "Stopped reading input: {err}");
        write_error(log, err, source);
    }

    if let Err(err) = mailer.close().await {
        internal!(level = WARN, "Failed to close transport: {err}");
        write_error(log, &err, "");
    }

    summary.scan_error = scan_failure?.map(|(err, _)| err);

    Ok(summary)
}

fn write_error<W: Write, C: Clock>(log: &mut MailLog<W, C>, err: &dyn Display, source: &str) {
    let source = Some(source).filter(|source| !source.trim().is_empty());
    if let Err(err) = log.error(err, source) {
        internal!(level = ERROR, "Failed to write mail log: {err}");
    }
}

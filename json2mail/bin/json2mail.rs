use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use json2mail::{MailLog, Options, Transport};
use json2mail_delivery::{DryRunMailer, Mailer, SmtpMailer};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    json2mail_common::logging::init();

    let options = Options::parse();
    let settings = match options.settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return Ok(ExitCode::from(2));
        }
    };

    let mailer: Box<dyn Mailer> = match &settings.transport {
        Transport::DryRun => Box::new(DryRunMailer),
        Transport::Smtp(config) => Box::new(
            SmtpMailer::connect(config)
                .await
                .with_context(|| format!("Failed to set up SMTP session with {}", config.address()))?,
        ),
    };

    let mut log = MailLog::new(std::io::stdout());
    let summary = json2mail::run(std::io::stdin(), mailer, &mut log, settings.interval).await?;

    json2mail_common::tracing::info!(
        sent = summary.sent,
        invalid = summary.invalid,
        failed = summary.failed,
        "Finished"
    );

    match summary.scan_error {
        Some(err) => {
            eprintln!("error: {err}");
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

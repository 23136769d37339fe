//! Pull-based decoding of a stream of JSON mail values.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, BufReader, Read},
    rc::Rc,
};

use serde_json::{Deserializer, StreamDeserializer, de::IoRead};

use crate::{error::ScanError, internal, mail::Mail, mail::MailList};

/// Reader that copies every byte it hands out into a shared buffer.
struct Capture<R> {
    inner: R,
    captured: Rc<RefCell<Vec<u8>>>,
}

impl<R: Read> Read for Capture<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.captured.borrow_mut().extend_from_slice(&buf[..read]);
        Ok(read)
    }
}

type MailStream<R> = StreamDeserializer<'static, IoRead<Capture<BufReader<R>>>, MailList>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerState {
    /// Nothing buffered yet, input not exhausted.
    Ready,
    /// At least one decoded record is queued.
    Buffered,
    /// The input ended cleanly.
    Exhausted,
    /// A decode error stopped the scanner. Terminal.
    Failed,
}

/// Turns a byte stream holding any mix of mail objects and arrays of mail
/// objects into a sequence of [`Mail`] records, one per [`advance`] call.
///
/// The input is read incrementally. At most the records of one top-level
/// value are held in memory at a time.
///
/// ```
/// use json2mail_common::scanner::MailScanner;
///
/// let input = br#"{"body":"1"} [{"body":"2"},{"body":"3"}]"#;
/// let mut scanner = MailScanner::new(&input[..]);
/// let mut bodies = Vec::new();
/// while scanner.advance() {
///     bodies.push(scanner.current().map(|mail| mail.body.clone()));
/// }
/// assert!(scanner.error().is_none());
/// assert_eq!(bodies.len(), 3);
/// ```
///
/// [`advance`]: MailScanner::advance
pub struct MailScanner<R: Read> {
    stream: MailStream<R>,
    captured: Rc<RefCell<Vec<u8>>>,
    /// Stream offset of the first byte in `captured`.
    captured_from: usize,
    /// Length of the latest decode step within `captured`.
    raw_len: usize,
    buffer: VecDeque<Mail>,
    state: ScannerState,
    error: Option<ScanError>,
}

impl<R: Read> MailScanner<R> {
    pub fn new(reader: R) -> Self {
        let captured = Rc::new(RefCell::new(Vec::new()));
        let capture = Capture {
            inner: BufReader::new(reader),
            captured: Rc::clone(&captured),
        };

        Self {
            stream: Deserializer::from_reader(capture).into_iter(),
            captured,
            captured_from: 0,
            raw_len: 0,
            buffer: VecDeque::new(),
            state: ScannerState::Ready,
            error: None,
        }
    }

    /// Move to the next record.
    ///
    /// Returns `false` once the input is exhausted or a decode error occurred;
    /// [`error`](Self::error) tells the two apart. Top-level values that hold
    /// no records (`[]`, `null`) are skipped.
    pub fn advance(&mut self) -> bool {
        match self.state {
            ScannerState::Exhausted | ScannerState::Failed => return false,
            ScannerState::Buffered if self.buffer.len() >= 2 => {
                self.buffer.pop_front();
                return true;
            }
            _ => self.buffer.clear(),
        }

        loop {
            self.start_step();

            match self.stream.next() {
                None => {
                    internal!("Mail input exhausted");
                    self.raw_len = self.captured.borrow().len();
                    self.state = ScannerState::Exhausted;
                    self.error = None;
                    return false;
                }
                Some(Err(err)) => {
                    internal!(level = DEBUG, "Failed to decode mail input: {err}");
                    self.raw_len = self.captured.borrow().len();
                    self.state = ScannerState::Failed;
                    self.error = Some(ScanError::from(err));
                    return false;
                }
                Some(Ok(list)) if list.is_empty() => {}
                Some(Ok(list)) => {
                    self.raw_len = self.stream.byte_offset() - self.captured_from;
                    internal!("Decoded {} mail record(s)", list.len());
                    self.buffer = list.into();
                    self.state = ScannerState::Buffered;
                    return true;
                }
            }
        }
    }

    /// Drop the text of the previous step.
    ///
    /// The decoder reads one byte past a value such as `null` or `42` to find
    /// its end. That byte belongs to the next step and is kept.
    fn start_step(&mut self) {
        let offset = self.stream.byte_offset();
        let mut captured = self.captured.borrow_mut();
        let finished = offset.saturating_sub(self.captured_from).min(captured.len());
        captured.drain(..finished);
        self.captured_from = offset;
        self.raw_len = 0;
    }

    /// The record produced by the last successful [`advance`](Self::advance).
    #[must_use]
    pub fn current(&self) -> Option<&Mail> {
        match self.state {
            ScannerState::Buffered => self.buffer.front(),
            _ => None,
        }
    }

    /// The error that stopped the scanner, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ScanError> {
        self.error.as_ref()
    }

    /// Take the terminal error, leaving `None` behind.
    pub const fn take_error(&mut self) -> Option<ScanError> {
        self.error.take()
    }

    #[must_use]
    pub const fn state(&self) -> ScannerState {
        self.state
    }

    /// The input text consumed by the most recent decode step.
    ///
    /// All records drawn from one top-level array share the same text. After
    /// a failure this holds the text read up to the point of the error.
    #[must_use]
    pub fn raw_text(&self) -> String {
        let captured = self.captured.borrow();
        let len = self.raw_len.min(captured.len());
        String::from_utf8_lossy(&captured[..len]).into_owned()
    }
}

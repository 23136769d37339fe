//! Command line front end: reads mail descriptions from standard input and
//! sends them over SMTP, writing one JSON line per outcome to standard output.

pub mod cli;
pub mod driver;
mod error;
pub mod log;

pub use cli::{Options, Settings, Transport};
pub use driver::{Summary, run};
pub use error::{ConfigError, DriverError};
pub use log::{Clock, MailLog, SystemClock};

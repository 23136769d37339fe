use thiserror::Error;
use tokio::task::JoinError;

/// Invalid command line or environment configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required options that were given neither as flags nor in the environment.
    #[error("{}", missing_message(.0))]
    Missing(Vec<&'static str>),
}

fn missing_message(options: &[&str]) -> String {
    let mut message = String::from("error:\n");
    for option in options {
        message.push_str("  ");
        message.push_str(option);
        message.push_str(" is required.\n");
    }
    message.push_str("\nPlease see --help for more detail.");
    message
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// The input thread panicked or was cancelled.
    #[error("Input reader stopped unexpectedly: {0}")]
    Reader(#[from] JoinError),
}

use std::io;

pub type Result<T> = std::result::Result<T, HpssError>;

/// Errors surfaced by the archive client.
///
/// Connection trouble is normally absorbed by the session manager's retry
/// loop and never reaches callers; `Connection` only appears when a
/// configured attempt limit runs out.
#[derive(Debug)]
pub enum HpssError {
    /// Remote `***` output that did not match any benign pattern.
    Protocol { message: String, command: String },
    /// Local misuse detected before a command was issued.
    Precondition(String),
    /// Could not establish a session within the configured attempt limit.
    Connection(String),
    /// The session pipe broke with a command in flight.
    Io(io::Error),
}

impl std::fmt::Display for HpssError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HpssError::Protocol { message, command } => {
                write!(f, "remote error: {message} (command: {command})")
            }
            HpssError::Precondition(msg) => write!(f, "precondition failed: {msg}"),
            HpssError::Connection(msg) => write!(f, "connection failed: {msg}"),
            HpssError::Io(e) => write!(f, "session i/o error: {e}"),
        }
    }
}

impl std::error::Error for HpssError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HpssError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HpssError {
    fn from(e: io::Error) -> Self {
        HpssError::Io(e)
    }
}

use std::{error::Error, fmt::Display};

/// Failures of the terminal screens.
#[derive(Debug)]
pub enum TuiError {
    /// Drawing to or reading keys from the terminal failed
    IOError(std::io::Error),
    /// The background thread panicked
    JoinError,
    /// The background work stopped with an error, carried here as text
    WorkerError(String),
    /// There was nothing to pick from
    NoPorts,
}

impl Display for TuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TuiError::IOError(e) => write!(f, "terminal error: {}", e),
            TuiError::JoinError => write!(f, "background thread panicked"),
            TuiError::WorkerError(msg) => write!(f, "{}", msg),
            TuiError::NoPorts => write!(f, "no serial ports found"),
        }
    }
}

impl Error for TuiError {}

impl From<std::io::Error> for TuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_errors_read_plainly() {
        let e = TuiError::WorkerError("anchor stopped responding".to_owned());
        assert_eq!(e.to_string(), "anchor stopped responding");
        assert_eq!(TuiError::NoPorts.to_string(), "no serial ports found");
    }

    #[test]
    fn terminal_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "tty gone");
        let e: TuiError = io.into();
        assert!(matches!(e, TuiError::IOError(_)));
        assert_eq!(e.to_string(), "terminal error: tty gone");
        assert_eq!(TuiError::JoinError.to_string(), "background thread panicked");
    }
}

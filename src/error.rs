use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

// The public surface speaks `io::Write`/`io::Read`, so library errors
// must flow back out as io errors without losing the kind.
impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(err) => err,
            Error::Config(msg) => std::io::Error::new(std::io::ErrorKind::InvalidInput, msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

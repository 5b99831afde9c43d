use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Io(std::io::Error),
    Protocol(String),
    /// A configuration/status fetch failed. The cache keeps serving its previous snapshot.
    Fetch { system: String, reason: String },
    /// A reported value outside the known set for `kind`.
    UnmappedEnum { kind: &'static str, value: String },
    /// A remote write failed. No optimistic state was applied.
    Command { action: &'static str, source: Box<Error> },
    InvalidZone(u8),
    UnknownSystem(String),
    InvalidCommand(String),
    /// The owning polling cache has been torn down.
    Stopped,
}

impl Error {
    pub(crate) fn unmapped(kind: &'static str, value: impl Into<String>) -> Self {
        Error::UnmappedEnum {
            kind,
            value: value.into(),
        }
    }

    pub(crate) fn command(action: &'static str, source: Error) -> Self {
        Error::Command {
            action,
            source: Box::new(source),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Fetch { system, reason } => {
                write!(f, "fetch failed for system {system}: {reason}")
            }
            Error::UnmappedEnum { kind, value } => write!(f, "unmapped {kind}: {value:?}"),
            Error::Command { action, source } => write!(f, "command {action} failed: {source}"),
            Error::InvalidZone(id) => write!(f, "invalid zone: {id}"),
            Error::UnknownSystem(id) => write!(f, "unknown system: {id}"),
            Error::InvalidCommand(msg) => write!(f, "invalid command: {msg}"),
            Error::Stopped => write!(f, "polling cache stopped"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Command { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

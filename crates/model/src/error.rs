use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The provider returned something that cannot be understood.
    MalformedResponse,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => write!(f, "content blocked"),
            ErrorKind::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ErrorKind::MalformedResponse => write!(f, "malformed response"),
            ErrorKind::Other => write!(f, "request failed"),
        }
    }
}

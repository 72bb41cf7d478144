use inspector_protocol::{ErrorShape, error_codes};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown session '{0}'")]
    SessionNotFound(String),

    #[error("an exchange with id '{0}' is already in flight")]
    DuplicateExchange(String),

    #[error("no in-flight exchange with id '{0}'")]
    ExchangeNotFound(String),

    #[error(transparent)]
    Agent(#[from] inspector_a2a::Error),
}

impl Error {
    /// Wire form for a response frame.
    pub fn to_shape(&self) -> ErrorShape {
        let code = match self {
            Self::SessionNotFound(_) | Self::ExchangeNotFound(_) => error_codes::NOT_FOUND,
            Self::DuplicateExchange(_) => error_codes::INVALID_REQUEST,
            Self::Agent(_) => error_codes::UNAVAILABLE,
        };
        ErrorShape::new(code, self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

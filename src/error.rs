use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientErrorCode {
    InvalidConfig,
    InvalidTag,
    QueryTooLarge,
    Decode,
    ChannelError,
    Transport,
    Internal,
}

impl ClientErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientErrorCode::InvalidConfig => "client/invalid-config",
            ClientErrorCode::InvalidTag => "client/invalid-tag",
            ClientErrorCode::QueryTooLarge => "client/query-too-large",
            ClientErrorCode::Decode => "client/decode",
            ClientErrorCode::ChannelError => "client/channel-error",
            ClientErrorCode::Transport => "client/transport",
            ClientErrorCode::Internal => "client/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientError {
    pub code: ClientErrorCode,
    message: String,
}

impl ClientError {
    pub fn new(code: ClientErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for ClientError {}

pub type ClientResult<T> = Result<T, ClientError>;

pub fn invalid_config(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorCode::InvalidConfig, message)
}

pub fn invalid_tag(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorCode::InvalidTag, message)
}

pub fn query_too_large(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorCode::QueryTooLarge, message)
}

pub fn decode_error(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorCode::Decode, message)
}

pub fn channel_error(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorCode::ChannelError, message)
}

pub fn transport_error(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorCode::Transport, message)
}

pub fn internal_error(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorCode::Internal, message)
}

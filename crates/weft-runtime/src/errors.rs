//! Runtime error types.

use weft_core::{Ptr, RequestId};
use weft_protocol::{ProtocolError, ServerEvent, codes};

use crate::channel::ChannelError;

/// Errors raised while a scope handles client events.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Inbound bytes were not a valid event.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No callback or property registered under the pointer.
    #[error("no such pointer: {0}")]
    NoSuchPointer(Ptr),

    /// No component allocated under the pointer.
    #[error("no such component: {0}")]
    NoSuchComponent(Ptr),

    /// Factory not registered and no not-found fallback.
    #[error("no such factory: {0}")]
    NoSuchFactory(String),

    /// Factory ran but produced nothing.
    #[error("factory '{0}' returned no component")]
    FactoryFailed(String),

    /// Wire value could not be parsed into the property's type.
    #[error("invalid value for {ptr}: {message}")]
    InvalidValue {
        /// Property pointer.
        ptr: Ptr,
        /// Parse failure.
        message: String,
    },

    /// State was destroyed.
    #[error("state '{0}' is destroyed")]
    StateDestroyed(String),

    /// Scope was destroyed.
    #[error("scope is destroyed")]
    ScopeDestroyed,

    /// Channel has nobody listening.
    #[error("channel has no subscriber")]
    NotSubscribed,

    /// Transport failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A callback, factory or render panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// A worker thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl RuntimeError {
    /// Protocol error code for `ErrorOccurred`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol(_) => codes::INVALID_MESSAGE,
            Self::NoSuchPointer(_) => codes::NO_SUCH_POINTER,
            Self::NoSuchComponent(_) => codes::NO_SUCH_COMPONENT,
            Self::NoSuchFactory(_) => codes::NO_SUCH_FACTORY,
            Self::FactoryFailed(_) => codes::FACTORY_FAILED,
            Self::InvalidValue { .. } => codes::INVALID_VALUE,
            Self::StateDestroyed(_) | Self::ScopeDestroyed => codes::DESTROYED,
            Self::NotSubscribed | Self::Channel(_) | Self::Panicked(_) | Self::Spawn(_) => {
                codes::INTERNAL_ERROR
            }
        }
    }

    /// Outbound error event for this error.
    pub fn to_event(&self, request_id: RequestId) -> ServerEvent {
        ServerEvent::error(request_id, self.code(), self.to_string())
    }
}

//! Error types

use veer_net::{LocationError, NetError};

/// Errors surfaced to callers of the session
#[derive(Debug, thiserror::Error)]
pub enum VeerError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error("frame {id:?} is missing from the response to {location}")]
    FrameMissing { id: String, location: String },

    #[error("form responses must redirect to another location")]
    FormResponseMustRedirect,

    #[error("invalid location: {0}")]
    InvalidLocation(#[from] LocationError),

    #[error("no frame with id {0:?}")]
    UnknownFrame(String),

    #[error("expected {0} element")]
    InvalidElement(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VeerError>;

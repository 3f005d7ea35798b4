// Error taxonomy shared by the route planning components

use thiserror::Error;

use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum RouteError {
    // The coordinates of a waypoint could not be determined
    #[error("Resolution error: {0}")]
    Resolution(String),

    // A network collaborator (flight search, location lookup) failed
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RouteError {
    pub fn resolution<S: Into<String>>(message: S) -> Self {
        Self::Resolution(message.into())
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self, RouteError::Resolution(_))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, RouteError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, RouteError>;

use thiserror::Error;

use crate::actor::{ActorId, ComponentKind};

/// Actor lifecycle contract violations. These are caller bugs, not
/// recoverable simulation events.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error("actor is already instantiated")]
    AlreadyInstantiated,
    #[error("actor was never instantiated")]
    NotInstantiated,
    #[error("actor instance was already removed")]
    AlreadyRemoved,
    #[error("no actor with id {0}")]
    UnknownActor(ActorId),
    #[error("component {0:?} is already attached")]
    DuplicateComponent(ComponentKind),
}

/// Errors loading a JSON map layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to read layout file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse layout file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("layout cell id {0} is outside a {1}x{2} map")]
    CellOutOfRange(i32, i32, i32),
}

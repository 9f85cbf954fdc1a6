//! Errors raised while assembling a handler graph

use chordmap_config::InputEvent;
use thiserror::Error;

use crate::mapping_handlers::HandlerKind;

/// A wrapping handler tried to claim an event that the wrapped handler does
/// not watch (anymore). This is a bug in graph construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot occlude {event} from {handler}: it is not among its input events")]
pub struct OcclusionError {
    pub handler: String,
    pub event: InputEvent,
}

/// Building the handler graph for a preset failed.
#[derive(Error, Debug)]
pub enum MappingParsingError {
    #[error(transparent)]
    Occlusion(#[from] OcclusionError),

    #[error("{handler} needs ranking but has no events to rank by")]
    NothingToRank { handler: String },

    #[error("cannot create a {kind:?} handler for {combination}")]
    CannotWrap {
        kind: HandlerKind,
        combination: String,
    },
}

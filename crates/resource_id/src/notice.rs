//! Advisory notices
//!
//! Notices never interrupt an operation. They are logged through `tracing`
//! and, inside a [`capture`] scope, also collected for the calling thread.

use crate::types::ObjectId;
use std::cell::RefCell;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An object was bound under an id whose last known object is a
    /// different one.
    RebindingConflict { id: String },
    /// The object a handle was bound to no longer exists; resolution falls
    /// back to other candidates.
    LivenessLost { id: String, object: ObjectId },
    /// The id of an already interned handle was overwritten.
    UnstableId { previous: String, id: String },
}

impl Notice {
    pub fn id(&self) -> &str {
        match self {
            Notice::RebindingConflict { id }
            | Notice::LivenessLost { id, .. }
            | Notice::UnstableId { id, .. } => id,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RebindingConflict { id } => write!(
                f,
                "binding object to resource id {id} which is not equal to the last object \
                 bound to this resource id"
            ),
            Notice::LivenessLost { id, object } => write!(
                f,
                "the object with identity {object} and id {id} no longer exists, trying to \
                 find an object with the same id"
            ),
            Notice::UnstableId { previous, id } => write!(
                f,
                "overwriting the id {previous} of a resource identifier with {id}; hashed \
                 lookups keyed by the old id will no longer match"
            ),
        }
    }
}

thread_local! {
    static CAPTURED: RefCell<Option<Vec<Notice>>> = const { RefCell::new(None) };
}

pub(crate) fn emit(notice: Notice) {
    warn!(id = notice.id(), "{}", notice);
    CAPTURED.with(|captured| {
        if let Some(buffer) = captured.borrow_mut().as_mut() {
            buffer.push(notice);
        }
    });
}

/// Run `f` and return its result along with every notice it emitted on this
/// thread.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Notice>) {
    let outer = CAPTURED.with(|captured| captured.replace(Some(Vec::new())));
    let result = f();
    let notices = CAPTURED
        .with(|captured| captured.replace(outer))
        .unwrap_or_default();
    (result, notices)
}

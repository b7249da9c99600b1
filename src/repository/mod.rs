//! Owner-scoped CRUD over the document store.

use std::sync::Arc;

use crate::{auth::Identity, clock::Clock, store::DocumentStore};

pub mod lists;
pub mod todos;

pub use lists::ListRepository;
pub use todos::TodoRepository;

/// What both repositories need: the store, the caller, and a clock for
/// timestamps the store has not stamped yet.
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn Identity>,
    pub clock: Arc<dyn Clock>,
}

impl Backend {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn Identity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Backend {
            store,
            identity,
            clock,
        }
    }
}

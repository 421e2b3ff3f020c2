//! Optimistic list client: a list controller that owns the confirmed
//! collection and per-item controllers that edit, save and stage deletes
//! against a remote item resource.

use shared::domain::ItemId;

pub mod config;
pub mod error;
mod item_controller;
mod list_controller;
pub mod resource;

pub use error::ControllerError;
pub use item_controller::{
    CollectionSink, CommitOutcome, ItemController, ItemPhase, ItemSlot, ItemView,
    DEFAULT_DELETE_DELAY,
};
pub use list_controller::ListController;
pub use resource::{HttpItemResource, HttpStoreReseeder, ItemResource, StoreReseeder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    /// The last load or reseed failed; `load()` retries.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    LoadStateChanged(LoadState),
    /// Persisted ids in display order after a confirmed change.
    CollectionChanged {
        ids: Vec<ItemId>,
    },
    DraftChanged {
        present: bool,
    },
    ItemChanged {
        slot: ItemSlot,
    },
    Error {
        slot: Option<ItemSlot>,
        message: String,
    },
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

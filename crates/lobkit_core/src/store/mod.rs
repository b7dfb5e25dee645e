//! The byte store and byte-level stream views over it.

mod byte_store;
mod stream;

pub use byte_store::ByteStore;
pub(crate) use byte_store::read_some;
pub use stream::{LobInputStream, LobOutputStream};

use parking_lot::Mutex;
use std::sync::Arc;

/// A byte store aliased by a handle and its readers and writers.
pub type SharedByteStore = Arc<Mutex<ByteStore>>;

/// Wraps a store for sharing.
#[must_use]
pub fn shared(store: ByteStore) -> SharedByteStore {
    Arc::new(Mutex::new(store))
}

pub mod binding;
pub mod config;
pub mod error;
pub mod listeners;
pub mod manager;
pub mod remote;
pub mod storage;
pub mod toggle;

pub use binding::ProductFavorite;
pub use config::SyncConfig;
pub use error::FavoritesError;
pub use listeners::{ListenerRegistry, Subscription};
pub use manager::{DebugSnapshot, FavoritesManager};
pub use remote::{FavoritesApi, HttpFavoritesApi};
pub use storage::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use toggle::{ToggleOutcome, ToggleState, Transition};

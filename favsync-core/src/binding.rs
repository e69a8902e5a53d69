use std::sync::Arc;

use tokio::sync::watch;

use crate::error::FavoritesError;
use crate::listeners::Subscription;
use crate::manager::FavoritesManager;
use crate::toggle::ToggleOutcome;

/// One product's favorite flag as an observable value.
///
/// Subscribes on construction and unsubscribes when dropped, so a view can own
/// one for as long as it is on screen.
#[derive(Debug)]
pub struct ProductFavorite {
    manager: FavoritesManager,
    id: String,
    rx: watch::Receiver<bool>,
    _subscription: Subscription,
}

impl ProductFavorite {
    pub fn new(manager: &FavoritesManager, id: impl Into<String>) -> Self {
        let id = id.into();
        let (tx, mut rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let listener_tx = Arc::clone(&tx);
        let subscription = manager.subscribe(&id, move |value| {
            listener_tx.send_replace(value);
        });
        // read after subscribing so a change in between is not lost
        tx.send_replace(manager.is_favorite(&id));
        rx.borrow_and_update();
        Self {
            manager: manager.clone(),
            id,
            rx,
            _subscription: subscription,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_favorite(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for the next change and returns the new value. `None` if the
    /// sending side has been dropped.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// A receiver for callers that want to drive their own select loop.
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    pub async fn toggle(&self) -> Result<ToggleOutcome, FavoritesError> {
        self.manager.toggle_favorite(&self.id).await
    }
}

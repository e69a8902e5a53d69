use std::time::Duration;

use anyhow::{bail, Context};
use favsync_core::{FavoritesManager, ProductFavorite, SyncConfig, ToggleOutcome};
use futures_util::future::join_all;
use tracing::{info, warn};

pub async fn list(manager: &FavoritesManager) -> anyhow::Result<()> {
    manager.initialize().await;
    for id in manager.favorites() {
        println!("{id}");
    }
    Ok(())
}

pub async fn check(manager: &FavoritesManager, ids: &[String]) -> anyhow::Result<()> {
    manager.initialize().await;
    for id in ids {
        let mark = if manager.is_favorite(id) { "yes" } else { "no" };
        println!("{id}\t{mark}");
    }
    Ok(())
}

/// Toggles run concurrently; duplicate ids on the command line collapse into
/// one request through the pending guard.
pub async fn toggle(manager: &FavoritesManager, ids: &[String]) -> anyhow::Result<()> {
    manager.initialize().await;
    let results = join_all(ids.iter().map(|id| manager.toggle_favorite(id))).await;

    let mut failures = 0usize;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(ToggleOutcome::Applied(true)) => println!("{id}\tadded"),
            Ok(ToggleOutcome::Applied(false)) => println!("{id}\tremoved"),
            Ok(ToggleOutcome::AlreadyPending) => println!("{id}\tskipped (already in flight)"),
            Err(e) => {
                failures += 1;
                eprintln!("{id}\tfailed: {e}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} toggles failed and were reverted", ids.len());
    }
    Ok(())
}

pub async fn refresh(manager: &FavoritesManager) -> anyhow::Result<()> {
    manager.initialize().await;
    let ids = manager.refresh().await.context("refresh failed")?;
    info!(count = ids.len(), "favorites refreshed");
    println!("{} favorites", ids.len());
    Ok(())
}

pub async fn inspect(manager: &FavoritesManager) -> anyhow::Result<()> {
    manager.initialize().await;
    println!("{}", serde_json::to_string_pretty(&manager.debug_snapshot())?);
    Ok(())
}

/// `identity` is `Some` when the reset also switches user: `Some(None)` signs out.
pub async fn reset(manager: &FavoritesManager, identity: Option<Option<String>>) -> anyhow::Result<()> {
    match identity {
        Some(token) => manager.switch_identity(token).await,
        None => manager.force_reinitialize().await,
    }
    println!("{} favorites after reset", manager.favorites().len());
    Ok(())
}

pub async fn watch(manager: &FavoritesManager, interval_secs: u64, ids: &[String]) -> anyhow::Result<()> {
    manager.initialize().await;
    let bindings: Vec<ProductFavorite> = ids.iter().map(|id| ProductFavorite::new(manager, id.as_str())).collect();
    let mut last: Vec<bool> = bindings.iter().map(ProductFavorite::is_favorite).collect();
    for (binding, value) in bindings.iter().zip(&last) {
        println!("{}\t{}", binding.id(), value);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = manager.refresh().await {
            warn!(error = %e, "refresh failed, keeping last known state");
            continue;
        }
        for (binding, seen) in bindings.iter().zip(last.iter_mut()) {
            let now = binding.is_favorite();
            if now != *seen {
                println!("{}\t{}", binding.id(), now);
                *seen = now;
            }
        }
    }
}

pub fn show_config(config: &SyncConfig, write: bool) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.auth_token.is_some() {
        shown.auth_token = Some("<redacted>".into());
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    println!("snapshot dir: {}", config.resolved_storage_dir().display());

    if write {
        let path = SyncConfig::config_file_path()?;
        config.save_to(&path)?;
        println!("written to {}", path.display());
    }
    Ok(())
}

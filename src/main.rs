use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use newsroom_sync::config::{self, Config};
use newsroom_sync::models::NotificationFilter;
use newsroom_sync::push::{LogPlatform, PushState};
use newsroom_sync::Engine;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("NEWSROOM_LOG_JSON").is_ok() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let config = config::load()?;

    match cli.command {
        Commands::Watch {
            user_id,
            unread_only,
            interval,
        } => watch(config, user_id, unread_only, interval).await,
        Commands::SendTest { user_id } => send_test(config, user_id).await,
        Commands::Prefs { user_id } => prefs(config, user_id).await,
    }
}

/// Runs the full engine headlessly: initial page load + realtime channel
/// feed the cache, and each newly seen notification is routed through
/// the push manager (preferences + quiet hours decide delivery).
async fn watch(config: Config, user_id: Uuid, unread_only: bool, interval: u64) -> anyhow::Result<()> {
    let engine = Engine::from_config(&config, user_id, Arc::new(LogPlatform::new()))?;

    if unread_only {
        engine.store.set_filter(NotificationFilter {
            read: Some(false),
            ..Default::default()
        });
    }

    engine.start().await?;
    if engine.push.state() == PushState::Unsubscribed {
        if let Err(e) = engine.push.subscribe().await {
            warn!(error = %e, "push subscription unavailable; continuing without delivery");
        }
    }

    info!(
        cached = engine.store.len(),
        unread = engine.store.unread_count(),
        has_more = engine.store.has_more(),
        "initial page loaded"
    );

    let mut status = engine.reconciler.status();
    let mut seen: HashSet<Uuid> = engine
        .store
        .notifications()
        .iter()
        .map(|n| n.id)
        .collect();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_ok() {
                    info!(status = ?*status.borrow(), "realtime channel status");
                }
            }
            _ = ticker.tick() => {
                for n in engine.store.notifications() {
                    if !seen.insert(n.id) {
                        continue;
                    }
                    info!(id = %n.id, kind = %n.r#type, title = %n.title, "new notification");
                    match engine.push.deliver(&n).await {
                        Ok(true) => {}
                        Ok(false) => info!(id = %n.id, "delivery gated off"),
                        Err(e) => warn!(error = %e, "delivery failed"),
                    }
                }
                if let Some(err) = engine.store.last_error() {
                    warn!(error = %err, "store error state");
                }
            }
        }
    }

    info!("shutting down");
    engine.dispose();
    Ok(())
}

/// Exercises the subscription flow end to end against the logging
/// platform, then displays a test notification.
async fn send_test(config: Config, user_id: Uuid) -> anyhow::Result<()> {
    let engine = Engine::from_config(&config, user_id, Arc::new(LogPlatform::new()))?;

    engine.push.initialize().await?;
    if engine.push.state() != PushState::Subscribed {
        engine.push.request_permission().await?;
    }
    engine.push.send_test().await?;
    engine.dispose();
    Ok(())
}

async fn prefs(config: Config, user_id: Uuid) -> anyhow::Result<()> {
    let engine = Engine::from_config(&config, user_id, Arc::new(LogPlatform::new()))?;

    let prefs = engine.preferences.load(user_id).await?;
    let unread = engine.notifications.count_unread(user_id).await?;

    println!("{}", serde_json::to_string_pretty(&prefs)?);
    println!("unread: {}", unread);
    Ok(())
}

use std::sync::Arc;

use anyhow::anyhow;
use chrono::Local;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::models::{Notification, PreferencesPatch, PushSubscription};
use crate::push::gate;
use crate::push::platform::{PermissionState, PushDisplay, PushPlatform};
use crate::store::preferences::PreferencesRepository;

/// Lifecycle states of the push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    /// The platform lacks push capability. Terminal.
    Unsupported,
    Uninitialized,
    /// The user denied the prompt. Terminal until platform settings
    /// change out-of-band; the manager never re-prompts on its own.
    PermissionDenied,
    PermissionPending,
    Subscribed,
    Unsubscribed,
}

/// State machine wrapping the platform push capability. Explicitly
/// constructed and dependency-injected; the local subscription handle is
/// owned here exclusively, and the server-side record is only ever
/// written through `sync`.
pub struct PushManager {
    platform: Arc<dyn PushPlatform>,
    preferences: PreferencesRepository,
    user_id: Uuid,
    server_key: Option<String>,
    state_tx: watch::Sender<PushState>,
    state_rx: watch::Receiver<PushState>,
}

impl PushManager {
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        preferences: PreferencesRepository,
        user_id: Uuid,
        server_key: Option<String>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(PushState::Uninitialized);
        Self {
            platform,
            preferences,
            user_id,
            server_key,
            state_tx,
            state_rx,
        }
    }

    pub fn state(&self) -> PushState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PushState> {
        self.state_rx.clone()
    }

    fn transition(&self, next: PushState) -> PushState {
        self.state_tx.send_replace(next);
        next
    }

    /// Detects capability and permission once. An existing granted
    /// subscription is re-synced to the server record and resumes as
    /// `Subscribed`; everything else lands in `Unsubscribed` or a
    /// terminal state. Short-circuits all push affordances when the
    /// platform has none, without erroring.
    pub async fn initialize(&self) -> Result<PushState> {
        if !self.platform.is_supported() {
            return Ok(self.transition(PushState::Unsupported));
        }

        match self.platform.permission_state().await {
            PermissionState::Denied => Ok(self.transition(PushState::PermissionDenied)),
            PermissionState::Granted => {
                match self.platform.get_existing_subscription().await? {
                    Some(sub) => {
                        self.write_server_record(Some(&sub), None).await?;
                        Ok(self.transition(PushState::Subscribed))
                    }
                    None => Ok(self.transition(PushState::Unsubscribed)),
                }
            }
            PermissionState::Prompt => Ok(self.transition(PushState::Unsubscribed)),
        }
    }

    /// Prompts the user, then subscribes on a grant. A denial is
    /// terminal here; a dismissed prompt stays `Unsubscribed`.
    pub async fn request_permission(&self) -> Result<PushState> {
        match self.state() {
            PushState::Unsupported => return Err(EngineError::PushUnsupported),
            PushState::Subscribed => return Ok(PushState::Subscribed),
            PushState::PermissionDenied => return Ok(PushState::PermissionDenied),
            _ => {}
        }

        self.transition(PushState::PermissionPending);
        match self.platform.request_permission().await {
            Ok(PermissionState::Granted) => self.subscribe().await,
            Ok(PermissionState::Denied) => {
                info!("push permission denied by the user");
                Ok(self.transition(PushState::PermissionDenied))
            }
            Ok(PermissionState::Prompt) => Ok(self.transition(PushState::Unsubscribed)),
            Err(e) => {
                self.transition(PushState::Unsubscribed);
                Err(e)
            }
        }
    }

    /// Obtains a subscription from the platform and pushes it to the
    /// server record. A subscription that cannot be confirmed
    /// server-side is torn down locally before the error is returned.
    pub async fn subscribe(&self) -> Result<PushState> {
        let server_key = self
            .server_key
            .as_deref()
            .ok_or_else(|| anyhow!("no application server key configured"))?;

        let sub = self.platform.create_subscription(server_key).await?;
        match self.write_server_record(Some(&sub), Some(true)).await {
            Ok(()) => Ok(self.transition(PushState::Subscribed)),
            Err(e) => {
                warn!(error = %e, "server rejected the subscription; tearing down locally");
                if let Err(teardown) = self.platform.remove_subscription().await {
                    warn!(error = %teardown, "local teardown after failed sync also failed");
                }
                self.transition(PushState::Unsubscribed);
                Err(e)
            }
        }
    }

    /// Removes the server-side record first, then the local
    /// subscription. Ends `Unsubscribed` regardless of partial failure;
    /// a failed server removal is logged as reconciliation debt for the
    /// next `sync` rather than retried inline.
    pub async fn unsubscribe(&self) -> Result<PushState> {
        if let Err(e) = self.write_server_record(None, Some(false)).await {
            warn!(error = %e, "server-side subscription removal failed; continuing local teardown");
        }
        if let Err(e) = self.platform.remove_subscription().await {
            warn!(error = %e, "local subscription removal failed");
        }
        Ok(self.transition(PushState::Unsubscribed))
    }

    /// Idempotent self-heal: overwrites the server record with whatever
    /// the platform currently holds, recovering from divergence such as
    /// an app reinstall or rotated keys.
    pub async fn sync(&self) -> Result<()> {
        let local = self.platform.get_existing_subscription().await?;
        self.write_server_record(local.as_ref(), None).await
    }

    /// Consults the delivery gate and, if it passes, displays the
    /// notification via the platform. Returns whether it was surfaced.
    pub async fn deliver(&self, notification: &Notification) -> Result<bool> {
        if self.state() != PushState::Subscribed {
            return Ok(false);
        }

        let prefs = self.preferences.load(self.user_id).await?;
        if !gate::should_deliver(notification.r#type, &prefs, Local::now().time()) {
            debug!(id = %notification.id, "delivery gated off");
            return Ok(false);
        }

        self.platform
            .show_notification(&PushDisplay {
                title: notification.title.clone(),
                body: notification.message.clone(),
                icon: None,
                data: json!({
                    "notification_id": notification.id,
                    "type": notification.r#type,
                    "data": notification.data,
                }),
            })
            .await?;
        Ok(true)
    }

    /// Shows a test notification, bypassing the gate (it is an explicit
    /// user action). Requires an active subscription.
    pub async fn send_test(&self) -> Result<()> {
        if self.state() != PushState::Subscribed {
            return Err(EngineError::NoSubscription);
        }
        self.platform
            .show_notification(&PushDisplay {
                title: "Test notification".into(),
                body: Some("Push notifications are working.".into()),
                icon: None,
                data: json!({ "test": true }),
            })
            .await
    }

    /// Ends the manager's lifecycle. The local platform subscription is
    /// left intact; only the in-memory handle state is reset.
    pub fn dispose(&self) {
        self.transition(PushState::Uninitialized);
    }

    /// The only writer of the server-side subscription record. Skips
    /// the round-trip when the record already matches.
    async fn write_server_record(
        &self,
        sub: Option<&PushSubscription>,
        enable: Option<bool>,
    ) -> Result<()> {
        let current = self.preferences.load(self.user_id).await?;
        let record_matches = current.push_subscription.as_ref() == sub;
        let toggle_matches = enable.map_or(true, |e| current.push_enabled == e);
        if record_matches && toggle_matches {
            debug!("server push record already in sync");
            return Ok(());
        }

        let patch = PreferencesPatch {
            push_subscription: Some(sub.cloned()),
            push_enabled: enable,
            ..Default::default()
        };
        self.preferences.save(self.user_id, &patch).await?;
        Ok(())
    }
}

use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{PushKeys, PushSubscription};

/// Result of a platform permission check or prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not yet decided (the platform's "default" answer).
    Prompt,
}

/// What the engine hands to the platform for display. `data` is an
/// opaque payload used for click-routing by the embedding application.
#[derive(Debug, Clone)]
pub struct PushDisplay {
    pub title: String,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub data: Value,
}

/// Capability surface of the platform's push messaging. Abstracting the
/// ambient globals here keeps the subscription state machine and the
/// delivery gating testable without a real browser runtime.
#[async_trait]
pub trait PushPlatform: Send + Sync {
    /// False when the platform lacks push capability entirely.
    fn is_supported(&self) -> bool;

    async fn permission_state(&self) -> PermissionState;

    /// Prompts the user. Resolves to the (possibly unchanged) state.
    async fn request_permission(&self) -> Result<PermissionState>;

    async fn get_existing_subscription(&self) -> Result<Option<PushSubscription>>;

    /// Creates a subscription against `server_key` (the application
    /// server public key). Returns the endpoint plus key pair.
    async fn create_subscription(&self, server_key: &str) -> Result<PushSubscription>;

    /// Removes the local subscription. Returns whether one existed.
    async fn remove_subscription(&self) -> Result<bool>;

    async fn show_notification(&self, display: &PushDisplay) -> Result<()>;
}

/// Encodes raw subscription key material the way push endpoints expect
/// it: URL-safe base64 without padding.
pub fn encode_key(raw: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}

/// Push surface for headless environments: always supported, always
/// granted, notifications land in the log stream. Used by `newsroomd`
/// in place of a browser notification tray.
#[derive(Default)]
pub struct LogPlatform {
    subscription: Mutex<Option<PushSubscription>>,
}

impl LogPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn fabricate_subscription() -> PushSubscription {
        let mut p256dh = [0u8; 65];
        let mut auth = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut p256dh);
        rand::thread_rng().fill_bytes(&mut auth);
        PushSubscription {
            endpoint: format!("newsroomd://local/{}", Uuid::new_v4()),
            keys: PushKeys {
                p256dh: encode_key(&p256dh),
                auth: encode_key(&auth),
            },
            enabled: true,
        }
    }
}

#[async_trait]
impl PushPlatform for LogPlatform {
    fn is_supported(&self) -> bool {
        true
    }

    async fn permission_state(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        Ok(PermissionState::Granted)
    }

    async fn get_existing_subscription(&self) -> Result<Option<PushSubscription>> {
        Ok(self.subscription.lock().unwrap().clone())
    }

    async fn create_subscription(&self, _server_key: &str) -> Result<PushSubscription> {
        let sub = Self::fabricate_subscription();
        *self.subscription.lock().unwrap() = Some(sub.clone());
        Ok(sub)
    }

    async fn remove_subscription(&self) -> Result<bool> {
        Ok(self.subscription.lock().unwrap().take().is_some())
    }

    async fn show_notification(&self, display: &PushDisplay) -> Result<()> {
        let shown = display;
        info!(
            title = %shown.title,
            body = shown.body.as_deref().unwrap_or(""),
            "push notification"
        );
        Ok(())
    }
}

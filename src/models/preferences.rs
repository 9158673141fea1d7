use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::NotificationType;

/// How often digest emails are sent. The engine only stores this; email
/// dispatch happens server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailFrequency {
    #[default]
    Immediate,
    Hourly,
    Daily,
    Weekly,
}

/// Base64-encoded public key material of a push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// One logical push subscription per device/browser profile. Always
/// mirrored to the server record it is compared against during sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

static DEFAULT_TYPES: Lazy<BTreeMap<NotificationType, bool>> =
    Lazy::new(|| NotificationType::ALL.iter().map(|t| (*t, true)).collect());

/// Per-user notification preferences. One row per user, created with
/// defaults on first access, upserted on every edit.
///
/// Every field carries a serde default so a sparse server row still
/// deserializes into a complete object merged over the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: Uuid,
    #[serde(default = "default_true")]
    pub in_app_enabled: bool,
    #[serde(default = "default_true")]
    pub email_enabled: bool,
    #[serde(default)]
    pub push_enabled: bool,
    #[serde(default)]
    pub email_frequency: EmailFrequency,
    #[serde(default)]
    pub quiet_hours_enabled: bool,
    /// Wall-clock HH:MM; the window may wrap past midnight.
    #[serde(default = "default_quiet_start")]
    pub quiet_hours_start: String,
    #[serde(default = "default_quiet_end")]
    pub quiet_hours_end: String,
    #[serde(default)]
    pub types: BTreeMap<NotificationType, bool>,
    #[serde(default)]
    pub push_subscription: Option<PushSubscription>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_quiet_start() -> String {
    "22:00".to_string()
}

fn default_quiet_end() -> String {
    "08:00".to_string()
}

impl NotificationPreferences {
    /// The complete preferences object a user without a stored row gets.
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            in_app_enabled: true,
            email_enabled: true,
            push_enabled: false,
            email_frequency: EmailFrequency::Immediate,
            quiet_hours_enabled: false,
            quiet_hours_start: default_quiet_start(),
            quiet_hours_end: default_quiet_end(),
            types: DEFAULT_TYPES.clone(),
            push_subscription: None,
            updated_at: None,
        }
    }

    /// A kind missing from the map is enabled; only an explicit `false`
    /// disables it.
    pub fn type_enabled(&self, kind: NotificationType) -> bool {
        self.types.get(&kind).copied().unwrap_or(true)
    }
}

/// Partial update for the preferences row. Unset fields are left
/// unchanged server-side. `push_subscription` uses a double Option so a
/// patch can distinguish "leave as is" from "clear the record".
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreferencesPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_app_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_frequency: Option<EmailFrequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_hours_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_hours_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_hours_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<BTreeMap<NotificationType, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_subscription: Option<Option<PushSubscription>>,
}

impl PreferencesPatch {
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| v.as_object().map(|o| o.is_empty()).unwrap_or(true))
            .unwrap_or(true)
    }
}

use reqwest::Method;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::models::{NotificationPreferences, PreferencesPatch};
use crate::store::RestClient;

const TABLE: &str = "notification_preferences";

/// Loads and upserts per-user notification preferences. No cache layer:
/// preferences are small and read infrequently relative to notification
/// volume.
#[derive(Clone)]
pub struct PreferencesRepository {
    client: RestClient,
}

impl PreferencesRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    /// Stored preferences merged over hard-coded defaults. A user with
    /// no row yet gets the complete default object.
    pub async fn load(&self, user_id: Uuid) -> Result<NotificationPreferences> {
        let resp = self
            .client
            .request(Method::GET, TABLE)
            .query(&[("user_id", format!("eq.{}", user_id)), ("limit", "1".into())])
            .send()
            .await?;
        let resp = RestClient::expect_success(resp).await?;

        let mut rows: Vec<NotificationPreferences> = resp.json().await?;
        Ok(rows
            .pop()
            .unwrap_or_else(|| NotificationPreferences::defaults_for(user_id)))
    }

    /// Upsert: fields absent from the patch are left unchanged
    /// server-side. Returns the full row as stored.
    pub async fn save(
        &self,
        user_id: Uuid,
        patch: &PreferencesPatch,
    ) -> Result<NotificationPreferences> {
        let mut body = match serde_json::to_value(patch)? {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        body.insert("user_id".into(), Value::String(user_id.to_string()));

        let resp = self
            .client
            .request(Method::POST, TABLE)
            .header(
                "Prefer",
                "resolution=merge-duplicates,return=representation",
            )
            .query(&[("on_conflict", "user_id")])
            .json(&Value::Object(body))
            .send()
            .await?;
        let resp = RestClient::expect_success(resp).await?;

        let mut rows: Vec<NotificationPreferences> = resp.json().await?;
        rows.pop().ok_or_else(|| EngineError::Backend {
            status: 200,
            message: "upsert returned no representation".into(),
        })
    }
}

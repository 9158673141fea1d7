use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::models::{Notification, NotificationFilter, NotificationType};
use crate::store::RestClient;

const TABLE: &str = "notifications";

/// Fields for a server-side insert. The server assigns `id`,
/// `created_at` and `updated_at`.
#[derive(Debug, Clone, Serialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub r#type: NotificationType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

/// Stateless facade over the remote notification table.
#[derive(Clone)]
pub struct NotificationRepository {
    client: RestClient,
}

impl NotificationRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    // -- Read Operations --

    /// One page, newest first. Ordering includes `id` as a tiebreak so
    /// pagination is stable across rows sharing a `created_at`.
    pub async fn fetch_page(
        &self,
        user_id: Uuid,
        filter: &NotificationFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Notification>> {
        let mut query: Vec<(String, String)> = vec![
            ("user_id".into(), format!("eq.{}", user_id)),
            ("order".into(), "created_at.desc,id.desc".into()),
            ("limit".into(), limit.to_string()),
            ("offset".into(), offset.to_string()),
        ];
        Self::push_filter(&mut query, filter);

        let resp = self
            .client
            .request(Method::GET, TABLE)
            .query(&query)
            .send()
            .await?;
        let resp = RestClient::expect_success(resp).await?;
        Ok(resp.json().await?)
    }

    /// Unread row count for the user, via the `Content-Range` total.
    pub async fn count_unread(&self, user_id: Uuid) -> Result<u64> {
        let resp = self
            .client
            .request(Method::GET, TABLE)
            .header("Prefer", "count=exact")
            .query(&[
                ("user_id", format!("eq.{}", user_id)),
                ("read_at", "is.null".into()),
                ("select", "id".into()),
                ("limit", "1".into()),
            ])
            .send()
            .await?;
        let resp = RestClient::expect_success(resp).await?;

        let total = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<u64>().ok());

        total.ok_or_else(|| EngineError::Backend {
            status: 200,
            message: "missing count in content-range header".into(),
        })
    }

    // -- Write Operations --

    pub async fn mark_read(&self, id: Uuid, read_at: DateTime<Utc>) -> Result<()> {
        let resp = self
            .client
            .request(Method::PATCH, TABLE)
            .query(&[("id", format!("eq.{}", id))])
            .json(&serde_json::json!({ "read_at": read_at }))
            .send()
            .await?;
        RestClient::expect_success(resp).await?;
        Ok(())
    }

    /// Bulk-stamps every unread row for the user in one statement.
    pub async fn mark_all_read(&self, user_id: Uuid, read_at: DateTime<Utc>) -> Result<()> {
        let resp = self
            .client
            .request(Method::PATCH, TABLE)
            .query(&[
                ("user_id", format!("eq.{}", user_id)),
                ("read_at", "is.null".into()),
            ])
            .json(&serde_json::json!({ "read_at": read_at }))
            .send()
            .await?;
        RestClient::expect_success(resp).await?;
        Ok(())
    }

    pub async fn insert(&self, new: &NewNotification) -> Result<Notification> {
        let resp = self
            .client
            .request(Method::POST, TABLE)
            .header("Prefer", "return=representation")
            .json(new)
            .send()
            .await?;
        let resp = RestClient::expect_success(resp).await?;

        let mut rows: Vec<Notification> = resp.json().await?;
        rows.pop().ok_or_else(|| EngineError::Backend {
            status: 200,
            message: "insert returned no representation".into(),
        })
    }

    fn push_filter(query: &mut Vec<(String, String)>, filter: &NotificationFilter) {
        if let Some(types) = &filter.types {
            if !types.is_empty() {
                let joined = types
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                query.push(("type".into(), format!("in.({})", joined)));
            }
        }
        match filter.read {
            Some(false) => query.push(("read_at".into(), "is.null".into())),
            Some(true) => query.push(("read_at".into(), "not.is.null".into())),
            None => {}
        }
        if let Some(since) = filter.since {
            query.push(("created_at".into(), format!("gte.{}", since.to_rfc3339())));
        }
        if let Some(until) = filter.until {
            query.push(("created_at".into(), format!("lte.{}", until.to_rfc3339())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_query_encoding() {
        let filter = NotificationFilter {
            types: Some(vec![
                NotificationType::NewsPublished,
                NotificationType::CommentNew,
            ]),
            read: Some(false),
            since: None,
            until: None,
        };
        let mut query = Vec::new();
        NotificationRepository::push_filter(&mut query, &filter);

        assert_eq!(
            query,
            vec![
                ("type".into(), "in.(news_published,comment_new)".into()),
                ("read_at".into(), "is.null".into()),
            ]
        );
    }

    #[test]
    fn test_empty_type_set_adds_no_clause() {
        let filter = NotificationFilter {
            types: Some(vec![]),
            ..Default::default()
        };
        let mut query = Vec::new();
        NotificationRepository::push_filter(&mut query, &filter);
        assert!(query.is_empty());
    }
}

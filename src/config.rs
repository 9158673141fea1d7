use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the hosted backend REST API, e.g. `https://xyz.backend.co`.
    pub api_url: String,
    /// WebSocket URL of the realtime endpoint. Derived from `api_url` when
    /// NEWSROOM_REALTIME_URL is not set.
    pub realtime_url: String,
    /// Project API key sent as `apikey` + bearer token on every call.
    pub api_key: String,
    /// Application server public key (VAPID) handed to the push platform
    /// when creating a subscription.
    pub push_server_key: Option<String>,
    /// Rows requested per notification page.
    /// Set via NEWSROOM_PAGE_SIZE. Default: 20.
    pub page_size: usize,
    /// Realtime heartbeat interval in seconds. Default: 30.
    pub heartbeat_secs: u64,
    /// Reconnect backoff base in milliseconds. Default: 500.
    pub backoff_base_ms: u64,
    /// Reconnect backoff ceiling in milliseconds. Default: 30_000.
    pub backoff_max_ms: u64,
    /// Random jitter added to each backoff in milliseconds. Default: 250.
    pub backoff_jitter_ms: u64,
}

impl Config {
    /// Rewrites the REST base URL into the realtime websocket endpoint.
    fn derive_realtime_url(api_url: &str) -> String {
        let ws = api_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/realtime/v1/websocket", ws.trim_end_matches('/'))
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let api_url = std::env::var("NEWSROOM_API_URL")
        .unwrap_or_else(|_| "http://localhost:54321".into());

    let api_key = std::env::var("NEWSROOM_API_KEY")
        .unwrap_or_else(|_| "CHANGE_ME_PROJECT_API_KEY".into());

    if api_key == "CHANGE_ME_PROJECT_API_KEY" {
        let env_mode = std::env::var("NEWSROOM_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "NEWSROOM_API_KEY is still the insecure placeholder. \
                 Set the project API key before running in production."
            );
        }
        eprintln!("⚠️  NEWSROOM_API_KEY is not set — using insecure placeholder.");
    }

    Ok(Config {
        realtime_url: std::env::var("NEWSROOM_REALTIME_URL")
            .unwrap_or_else(|_| Config::derive_realtime_url(&api_url)),
        api_url,
        api_key,
        push_server_key: std::env::var("NEWSROOM_PUSH_SERVER_KEY").ok(),
        page_size: std::env::var("NEWSROOM_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20),
        heartbeat_secs: std::env::var("NEWSROOM_HEARTBEAT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
        backoff_base_ms: std::env::var("NEWSROOM_BACKOFF_BASE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500),
        backoff_max_ms: std::env::var("NEWSROOM_BACKOFF_MAX_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000),
        backoff_jitter_ms: std::env::var("NEWSROOM_BACKOFF_JITTER_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(250),
    })
}

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::Config;
use crate::errors::Result;
use crate::models::NotificationFilter;
use crate::push::platform::PushPlatform;
use crate::push::PushManager;
use crate::store::notifications::NotificationRepository;
use crate::store::preferences::PreferencesRepository;
use crate::store::RestClient;
use crate::sync::realtime::{BackoffConfig, RealtimeConfig, RealtimeReconciler};
use crate::sync::NotificationStore;

/// Wires the engine together for one authenticated user: repositories
/// over one shared REST client, the notification store, the realtime
/// reconciler, and the push manager.
pub struct Engine {
    pub store: Arc<NotificationStore>,
    pub reconciler: RealtimeReconciler,
    pub push: PushManager,
    pub notifications: NotificationRepository,
    pub preferences: PreferencesRepository,
}

impl Engine {
    pub fn from_config(
        config: &Config,
        user_id: Uuid,
        platform: Arc<dyn PushPlatform>,
    ) -> Result<Self> {
        let client = RestClient::new(&config.api_url, &config.api_key)?;
        let notifications = NotificationRepository::new(client.clone());
        let preferences = PreferencesRepository::new(client);

        let store = Arc::new(NotificationStore::new(
            notifications.clone(),
            user_id,
            config.page_size,
        ));

        let reconciler = RealtimeReconciler::new(
            store.clone(),
            RealtimeConfig {
                ws_url: config.realtime_url.clone(),
                api_key: config.api_key.clone(),
                heartbeat: Duration::from_secs(config.heartbeat_secs),
                backoff: BackoffConfig {
                    base_ms: config.backoff_base_ms,
                    max_ms: config.backoff_max_ms,
                    jitter_ms: config.backoff_jitter_ms,
                    ..Default::default()
                },
            },
        );

        let push = PushManager::new(
            platform,
            preferences.clone(),
            user_id,
            config.push_server_key.clone(),
        );

        Ok(Self {
            store,
            reconciler,
            push,
            notifications,
            preferences,
        })
    }

    /// Brings the engine up: the realtime subscription opens while the
    /// first page loads, and live events merge into the same cache the
    /// page load fills. Push capability is detected last.
    pub async fn start(&self) -> Result<()> {
        self.reconciler.subscribe();
        self.store.load_page(true).await?;
        self.push.initialize().await?;
        Ok(())
    }

    /// Applies a new filter set. When it actually changes, the in-flight
    /// page (if any) is invalidated and the realtime channel is
    /// rescoped, debounced against rapid successive changes.
    pub fn set_filter(&self, filter: NotificationFilter) {
        if self.store.set_filter(filter) {
            self.reconciler.resubscribe_on_filter_change();
        }
    }

    /// Tears down everything that outlives a call stack: the realtime
    /// channel, pending resubscribe timers, and the push lifecycle.
    pub fn dispose(&self) {
        self.reconciler.unsubscribe();
        self.push.dispose();
    }
}

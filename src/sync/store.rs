use std::collections::HashSet;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::models::{Notification, NotificationFilter};
use crate::store::notifications::NotificationRepository;

/// Outcome of a page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    /// The page was merged; `fetched` rows arrived.
    Applied { fetched: usize },
    /// The response carried a superseded generation token and was
    /// discarded without touching the cache.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeOutcome {
    Inserted,
    Replaced,
    Skipped,
}

/// Interior state guarded by one mutex. Locks are never held across an
/// await; every network round-trip re-validates the generation token
/// before applying its result.
struct CacheState {
    /// Sorted descending by (`created_at`, `id`).
    rows: Vec<Notification>,
    ids: HashSet<Uuid>,
    unread: usize,
    offset: usize,
    has_more: bool,
    generation: u64,
    loading: bool,
    error: Option<String>,
    filter: NotificationFilter,
}

impl CacheState {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            ids: HashSet::new(),
            unread: 0,
            offset: 0,
            has_more: true,
            generation: 0,
            loading: false,
            error: None,
            filter: NotificationFilter::default(),
        }
    }
}

/// In-memory, ordered, deduplicated cache of the current user's
/// notifications. All mutation paths (page merge, realtime ingest,
/// optimistic mark-read) go through the one merge routine; nothing else
/// writes the cache.
pub struct NotificationStore {
    repo: NotificationRepository,
    user_id: Uuid,
    page_size: usize,
    state: Mutex<CacheState>,
}

impl NotificationStore {
    pub fn new(repo: NotificationRepository, user_id: Uuid, page_size: usize) -> Self {
        Self {
            repo,
            user_id,
            page_size,
            state: Mutex::new(CacheState::new()),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    // -- Page Loading --

    /// Fetches the next page (or the first page if `reset`) and merges
    /// it into the cache. A reset bumps the generation token so any
    /// in-flight non-reset response is discarded instead of merged.
    pub async fn load_page(&self, reset: bool) -> Result<PageLoad> {
        let (gen, offset, filter) = self.begin_load(reset);

        match self
            .repo
            .fetch_page(self.user_id, &filter, self.page_size, offset)
            .await
        {
            Ok(rows) => Ok(self.apply_page(gen, reset, rows)),
            Err(e) => {
                self.fail_load(gen, &e);
                Err(e)
            }
        }
    }

    fn begin_load(&self, reset: bool) -> (u64, usize, NotificationFilter) {
        let mut s = self.state.lock().unwrap();
        if reset {
            s.generation += 1;
            s.offset = 0;
            s.has_more = true;
        }
        s.loading = true;
        s.error = None;
        (s.generation, s.offset, s.filter.clone())
    }

    /// Merges a fetched page under the generation token it was issued
    /// with. Advances the cursor by the rows actually returned; a short
    /// page ends pagination. A reset load finishes with a full unread
    /// recount to heal any drift.
    fn apply_page(&self, gen: u64, reset: bool, rows: Vec<Notification>) -> PageLoad {
        let fetched = rows.len();
        let mut s = self.state.lock().unwrap();
        if s.generation != gen {
            debug!(gen, current = s.generation, "discarding stale page response");
            return PageLoad::Stale;
        }

        for row in rows {
            Self::merge_row(&mut s, row);
        }
        s.offset += fetched;
        s.has_more = fetched == self.page_size;
        s.loading = false;
        if reset {
            s.unread = s.rows.iter().filter(|n| n.is_unread()).count();
        }
        PageLoad::Applied { fetched }
    }

    fn fail_load(&self, gen: u64, err: &EngineError) {
        let mut s = self.state.lock().unwrap();
        if s.generation == gen {
            s.loading = false;
            s.error = Some(err.to_string());
        }
    }

    // -- Realtime Ingest --

    /// Idempotent: an insert whose id is already cached falls through to
    /// the merge rule and cannot produce a duplicate.
    pub fn ingest_realtime_insert(&self, notification: Notification) {
        if notification.user_id != self.user_id {
            return;
        }
        let mut s = self.state.lock().unwrap();
        Self::merge_row(&mut s, notification);
    }

    /// Replaces the cached row only when the incoming `updated_at` is
    /// not older than the cached one.
    pub fn ingest_realtime_update(&self, notification: Notification) {
        if notification.user_id != self.user_id {
            return;
        }
        let mut s = self.state.lock().unwrap();
        Self::merge_row(&mut s, notification);
    }

    pub fn ingest_realtime_delete(&self, id: Uuid) {
        let mut s = self.state.lock().unwrap();
        if !s.ids.remove(&id) {
            return;
        }
        if let Some(idx) = s.rows.iter().position(|n| n.id == id) {
            let removed = s.rows.remove(idx);
            if removed.is_unread() {
                s.unread = s.unread.saturating_sub(1);
            }
        }
    }

    // -- User Actions --

    /// Optimistically stamps the cached row and tells the server. On
    /// failure the optimistic change is reverted and the error surfaced.
    /// Already-read (or uncached) ids are a local no-op.
    pub async fn mark_as_read(&self, id: Uuid) -> Result<()> {
        let stamped = Utc::now();
        {
            let mut s = self.state.lock().unwrap();
            let Some(idx) = s.rows.iter().position(|n| n.id == id) else {
                return Ok(());
            };
            if s.rows[idx].read_at.is_some() {
                return Ok(());
            }
            s.rows[idx].read_at = Some(stamped);
            s.unread = s.unread.saturating_sub(1);
        }

        match self.repo.mark_read(id, stamped).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut s = self.state.lock().unwrap();
                // Revert only if our stamp is still in place; a racing
                // realtime update may have superseded the row.
                if let Some(idx) = s.rows.iter().position(|n| n.id == id) {
                    if s.rows[idx].read_at == Some(stamped) {
                        s.rows[idx].read_at = None;
                        s.unread += 1;
                    }
                }
                s.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Optimistically stamps every unread row and issues one bulk
    /// update. A failed bulk write is not trivially reversible, so the
    /// store heals by forcing a reset load instead of a partial
    /// rollback.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        let stamped = Utc::now();
        {
            let mut s = self.state.lock().unwrap();
            for row in s.rows.iter_mut().filter(|n| n.is_unread()) {
                row.read_at = Some(stamped);
            }
            s.unread = 0;
        }

        match self.repo.mark_all_read(self.user_id, stamped).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "mark-all-read failed; forcing a resync");
                {
                    let mut s = self.state.lock().unwrap();
                    s.error = Some(e.to_string());
                }
                if let Err(resync) = self.load_page(true).await {
                    warn!(error = %resync, "resync after failed mark-all-read also failed");
                }
                Err(e)
            }
        }
    }

    // -- Filters --

    /// Swaps the active filter. Bumps the generation (invalidating any
    /// in-flight page) and rewinds the cursor; the caller follows up
    /// with `load_page(true)` and a realtime resubscribe. Returns false
    /// when the filter is unchanged.
    pub fn set_filter(&self, filter: NotificationFilter) -> bool {
        let mut s = self.state.lock().unwrap();
        if s.filter == filter {
            return false;
        }
        s.filter = filter;
        s.generation += 1;
        s.offset = 0;
        s.has_more = true;
        true
    }

    pub fn filter(&self) -> NotificationFilter {
        self.state.lock().unwrap().filter.clone()
    }

    // -- Read Surface --

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.state.lock().unwrap().unread
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().unwrap().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().error.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().rows.is_empty()
    }

    // -- Merge Rule --

    /// The single reconciliation routine. If the id is absent the row is
    /// inserted at its sorted position; if present the cached row is
    /// replaced only when the incoming `updated_at` is not older
    /// (last-writer-wins, ties go to the incoming row). Handles page
    /// rows and realtime events uniformly, so no duplicate ids can
    /// survive any arrival order.
    fn merge_row(s: &mut CacheState, incoming: Notification) -> MergeOutcome {
        if s.ids.contains(&incoming.id) {
            let idx = s
                .rows
                .iter()
                .position(|n| n.id == incoming.id)
                .expect("id set and row list out of sync");
            if incoming.updated_at < s.rows[idx].updated_at {
                return MergeOutcome::Skipped;
            }

            match (s.rows[idx].is_unread(), incoming.is_unread()) {
                (true, false) => s.unread = s.unread.saturating_sub(1),
                (false, true) => s.unread += 1,
                _ => {}
            }

            // created_at can change across an update; reinsert to keep
            // the order invariant.
            s.rows.remove(idx);
            let pos = Self::sort_position(&s.rows, &incoming);
            s.rows.insert(pos, incoming);
            MergeOutcome::Replaced
        } else {
            s.ids.insert(incoming.id);
            if incoming.is_unread() {
                s.unread += 1;
            }
            let pos = Self::sort_position(&s.rows, &incoming);
            s.rows.insert(pos, incoming);
            MergeOutcome::Inserted
        }
    }

    fn sort_position(rows: &[Notification], n: &Notification) -> usize {
        rows.partition_point(|r| (r.created_at, r.id) > (n.created_at, n.id))
    }
}

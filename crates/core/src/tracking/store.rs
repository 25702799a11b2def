use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{MediaInfo, TrackedUser, TrackingSnapshot, WatchItem};

#[derive(Debug, Default)]
struct TrackingState {
    items: BTreeMap<u64, WatchItem>,
    users: Vec<TrackedUser>,
    last_updated: Option<DateTime<Utc>>,
}

/// Process-wide tracking state shared by the scheduler's jobs.
///
/// Locks are only held for the duration of a single read or mutation, never
/// across network calls.
#[derive(Debug, Default)]
pub struct TrackingStore {
    state: RwLock<TrackingState>,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: TrackingSnapshot) -> Self {
        Self {
            state: RwLock::new(TrackingState::from(snapshot)),
        }
    }

    /// Copy of the full state for persistence.
    pub async fn snapshot(&self) -> TrackingSnapshot {
        let state = self.state.read().await;
        TrackingSnapshot {
            items: state.items.values().cloned().collect(),
            users: state.users.clone(),
            last_updated: state.last_updated,
        }
    }

    /// Replace the full state.
    pub async fn restore(&self, snapshot: TrackingSnapshot) {
        *self.state.write().await = TrackingState::from(snapshot);
    }

    pub async fn get(&self, id: u64) -> Option<WatchItem> {
        self.state.read().await.items.get(&id).cloned()
    }

    /// All items ordered by id.
    pub async fn items(&self) -> Vec<WatchItem> {
        self.state.read().await.items.values().cloned().collect()
    }

    /// Track `id`, returning true if it was not tracked before.
    pub async fn ensure_item(&self, id: u64) -> bool {
        let mut state = self.state.write().await;
        if state.items.contains_key(&id) {
            return false;
        }
        info!(media_id = id, "New watch item detected");
        state.items.insert(id, WatchItem::new(id));
        true
    }

    /// Fill in provider metadata, creating the item if needed.
    ///
    /// Items from a blacklisted country of origin are marked blacklisted and
    /// set up so they are never revisited.
    pub async fn apply_media(
        &self,
        media: &MediaInfo,
        blacklisted_origins: &[String],
    ) -> WatchItem {
        let mut state = self.state.write().await;
        let item = state
            .items
            .entry(media.id)
            .or_insert_with(|| WatchItem::new(media.id));

        item.title = Some(media.title.clone());
        item.format = media.format;
        item.start_date = Some(media.start_date);

        let blacklisted = media
            .country_of_origin
            .as_ref()
            .is_some_and(|country| blacklisted_origins.iter().any(|b| b == country));
        if blacklisted {
            info!(
                media_id = media.id,
                title = %media.title,
                "Blacklisted origin, will not download"
            );
            item.blacklist();
        }

        item.clone()
    }

    /// Apply `mutation` to the item with `id`. Returns `None` if it is not tracked.
    pub async fn update<F, R>(&self, id: u64, mutation: F) -> Option<R>
    where
        F: FnOnce(&mut WatchItem) -> R,
    {
        let mut state = self.state.write().await;
        match state.items.get_mut(&id) {
            Some(item) => Some(mutation(item)),
            None => {
                warn!(media_id = id, "Watch item not found");
                None
            }
        }
    }

    pub async fn mark_setup(&self, id: u64) -> bool {
        self.update(id, WatchItem::mark_setup).await.is_some()
    }

    pub async fn mark_no_results(&self, id: u64) -> bool {
        self.update(id, |item| item.no_results = true).await.is_some()
    }

    pub async fn set_download_time(&self, id: u64, time: Option<DateTime<Utc>>) -> bool {
        self.update(id, |item| item.download_time = time)
            .await
            .is_some()
    }

    pub async fn set_observe(&self, id: u64, observe: Option<String>) -> bool {
        self.update(id, |item| item.observe = observe).await.is_some()
    }

    pub async fn set_manual_rule(&self, id: u64, rule: &str) -> bool {
        self.update(id, |item| item.set_manual_rule(rule))
            .await
            .is_some()
    }

    pub async fn reset(&self, id: u64) -> bool {
        self.update(id, WatchItem::reset).await.is_some()
    }

    pub async fn resolve(&self, id: u64) -> bool {
        self.update(id, WatchItem::resolve).await.is_some()
    }

    /// Flag every observed, not yet stalled item whose observe string occurs in
    /// one of `torrent_names`. Returns the ids newly flagged.
    pub async fn mark_stalled_matching(&self, torrent_names: &[String]) -> Vec<u64> {
        let mut state = self.state.write().await;
        let mut flagged = Vec::new();

        for item in state.items.values_mut() {
            if item.is_stalled {
                continue;
            }
            let Some(observe) = item.observe.as_deref().filter(|o| !o.is_empty()) else {
                continue;
            };
            if torrent_names.iter().any(|name| name.contains(observe)) {
                warn!(
                    media_id = item.id,
                    title = %item.display_title(),
                    "Possible stalled download"
                );
                item.is_stalled = true;
                flagged.push(item.id);
            }
        }

        flagged
    }

    /// Start tracking a user. Returns false if already tracked.
    pub async fn add_user(&self, username: &str) -> bool {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.username == username) {
            return false;
        }
        state.users.push(TrackedUser::new(username));
        true
    }

    /// Stop tracking a user. Returns false if the user was not tracked.
    pub async fn remove_user(&self, username: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.users.len();
        state.users.retain(|u| u.username != username);
        state.users.len() != before
    }

    pub async fn users(&self) -> Vec<TrackedUser> {
        self.state.read().await.users.clone()
    }

    /// Record that `username`'s lists were just fetched.
    pub async fn touch_user(&self, username: &str, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.iter_mut().find(|u| u.username == username) {
            user.last_updated = Some(now);
        }
    }

    pub async fn set_last_updated(&self, now: DateTime<Utc>) {
        self.state.write().await.last_updated = Some(now);
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_updated
    }
}

impl From<TrackingSnapshot> for TrackingState {
    fn from(snapshot: TrackingSnapshot) -> Self {
        Self {
            items: snapshot
                .items
                .into_iter()
                .map(|item| (item.id, item))
                .collect(),
            users: snapshot.users,
            last_updated: snapshot.last_updated,
        }
    }
}

//! Auto-downloader implementation.
//!
//! An update cycle runs in phases on the scheduler's queues:
//! - **Lists**: one metadata job per user fetches the watch list and tracks new ids
//! - **Metadata**: every item missing data gets its own metadata fetch job
//! - **Setup**: complete items that are not set up get a search-queue setup job
//! - **Stalls**: a final search-queue job flags stalled downloads
//!
//! Each phase enqueues the next from inside a job, so queue order alone makes
//! a phase start after the work queued before it.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::metadata::MetadataProvider;
use crate::metrics::{SETUP_OUTCOMES, STALL_DETECTIONS};
use crate::release::{relaxed_title, resolution_of, CandidateRanker, GroupPreference};
use crate::scheduler::{JobScheduler, METADATA_QUEUE, SEARCH_QUEUE};
use crate::searcher::Searcher;
use crate::torrent_client::{
    AddTorrentRequest, DownloadRule, TorrentClient, TorrentClientError, TorrentFilters,
};
use crate::tracking::{TrackingStore, WatchItem};

use super::config::DownloaderSettings;
use super::rules;
use super::types::{OrchestratorError, ResolutionEntries, SetupOutcome};

struct Inner {
    settings: DownloaderSettings,
    store: Arc<TrackingStore>,
    metadata: Arc<dyn MetadataProvider>,
    searcher: Arc<dyn Searcher>,
    torrent_client: Arc<dyn TorrentClient>,
    scheduler: JobScheduler,
    ranker: RwLock<CandidateRanker>,
    /// Items given a setup attempt since the current cycle started.
    setup_queued: Mutex<HashSet<u64>>,
}

/// Drives watch-list items from a user's list to a download rule.
///
/// Cheaply cloneable; clones share the same state. Jobs hold a clone, so the
/// downloader lives as long as any queued work does.
#[derive(Clone)]
pub struct AutoDownloader {
    inner: Arc<Inner>,
}

impl AutoDownloader {
    /// Create a new auto-downloader.
    pub fn new(
        settings: DownloaderSettings,
        store: Arc<TrackingStore>,
        metadata: Arc<dyn MetadataProvider>,
        searcher: Arc<dyn Searcher>,
        torrent_client: Arc<dyn TorrentClient>,
        scheduler: JobScheduler,
    ) -> Self {
        let ranker = CandidateRanker::new(GroupPreference::new(
            settings.matching.group_preference.clone(),
        ));

        Self {
            inner: Arc::new(Inner {
                settings,
                store,
                metadata,
                searcher,
                torrent_client,
                scheduler,
                ranker: RwLock::new(ranker),
                setup_queued: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<TrackingStore> {
        &self.inner.store
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.inner.scheduler
    }

    /// Whether an update cycle or any other queued work is still running.
    pub fn is_work_active(&self) -> bool {
        self.inner.scheduler.is_any_queue_active()
    }

    /// Replace the release group preference used for ranking.
    pub fn set_group_preference(&self, groups: Vec<String>) {
        info!(groups = ?groups, "Updating group preference");
        self.inner
            .ranker
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_preference(groups);
    }

    // =========================================================================
    // Update cycle
    // =========================================================================

    /// Start a full update cycle.
    ///
    /// Returns false without doing anything while earlier work is still queued.
    pub async fn update_all(&self) -> bool {
        if self.is_work_active() {
            warn!(
                pending = self.inner.scheduler.pending_jobs(),
                "Work still active, skipping update"
            );
            return false;
        }

        self.inner
            .setup_queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let users = self.inner.store.users().await;
        info!(users = users.len(), "Starting update cycle");
        self.inner.store.set_last_updated(Utc::now()).await;

        for user in users {
            let this = self.clone();
            let label = format!("watch list {}", user.username);
            self.inner.scheduler.enqueue(METADATA_QUEUE, label, move || async move {
                this.refresh_watch_list(&user.username).await?;
                anyhow::Ok(())
            });
        }

        let this = self.clone();
        self.inner
            .scheduler
            .enqueue(METADATA_QUEUE, "scan missing metadata", move || async move {
                this.enqueue_metadata_fetches().await;
                anyhow::Ok(())
            });

        true
    }

    /// Fetch a user's watch list and track any new ids.
    async fn refresh_watch_list(&self, username: &str) -> Result<usize, OrchestratorError> {
        let ids = self
            .inner
            .metadata
            .fetch_watch_list(username, &self.inner.settings.lists)
            .await?;
        self.inner.store.touch_user(username, Utc::now()).await;

        let mut added = 0;
        for id in ids {
            if self.inner.store.ensure_item(id).await {
                added += 1;
            }
        }

        if added > 0 {
            info!(user = %username, added, "Tracking new watch-list items");
        } else {
            debug!(user = %username, "Watch list unchanged");
        }
        Ok(added)
    }

    /// Queue a metadata fetch for every item missing data, then the setup phase.
    async fn enqueue_metadata_fetches(&self) {
        let missing: Vec<u64> = self
            .inner
            .store
            .items()
            .await
            .into_iter()
            .filter(|item| !item.is_all_data_loaded())
            .map(|item| item.id)
            .collect();

        debug!(count = missing.len(), "Items missing metadata");

        for id in missing {
            let this = self.clone();
            self.inner
                .scheduler
                .enqueue(METADATA_QUEUE, format!("media {}", id), move || async move {
                    this.refresh_media(id).await?;
                    anyhow::Ok(())
                });
        }

        let this = self.clone();
        self.inner
            .scheduler
            .enqueue(METADATA_QUEUE, "queue pending setups", move || async move {
                this.enqueue_pending_setups().await;
                anyhow::Ok(())
            });
    }

    /// Fetch metadata for one item; queue its setup once everything is known.
    async fn refresh_media(&self, id: u64) -> Result<WatchItem, OrchestratorError> {
        let media = self.inner.metadata.fetch_media(id).await?;
        let item = self
            .inner
            .store
            .apply_media(&media, &self.inner.settings.downloader.blacklisted_origins)
            .await;

        debug!(media_id = id, title = %media.title, "Metadata updated");

        if item.needs_setup() {
            self.enqueue_setup(id);
        }
        Ok(item)
    }

    /// Queue setup for every item that still needs it, followed by a stall check.
    async fn enqueue_pending_setups(&self) {
        for item in self.inner.store.items().await {
            if item.needs_setup() {
                self.enqueue_setup(item.id);
            }
        }

        let this = self.clone();
        self.inner
            .scheduler
            .enqueue(SEARCH_QUEUE, "stall check", move || async move {
                this.check_stalled().await?;
                anyhow::Ok(())
            });
    }

    /// Queue a setup attempt for `id`.
    ///
    /// An item gets at most one attempt per update cycle; returns false if it
    /// already had one.
    pub fn enqueue_setup(&self, id: u64) -> bool {
        let inserted = self
            .inner
            .setup_queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        if !inserted {
            debug!(media_id = id, "Setup already attempted this cycle");
            return false;
        }

        let this = self.clone();
        self.inner
            .scheduler
            .enqueue(SEARCH_QUEUE, format!("setup {}", id), move || async move {
                this.try_setup_auto_download(id).await?;
                anyhow::Ok(())
            });
        true
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Try to arrange automatic downloading for one item.
    pub async fn try_setup_auto_download(
        &self,
        id: u64,
    ) -> Result<SetupOutcome, OrchestratorError> {
        let outcome = self.setup_item(id).await?;
        if let Some(label) = outcome.metric_label() {
            SETUP_OUTCOMES.with_label_values(&[label]).inc();
        }
        Ok(outcome)
    }

    async fn setup_item(&self, id: u64) -> Result<SetupOutcome, OrchestratorError> {
        let item = self
            .inner
            .store
            .get(id)
            .await
            .ok_or(OrchestratorError::NotFound(id))?;

        if item.is_blacklisted {
            debug!(media_id = id, "Blacklisted, skipping");
            return Ok(SetupOutcome::Blacklisted);
        }
        if item.is_setup {
            debug!(media_id = id, "Already set up");
            return Ok(SetupOutcome::AlreadySetup);
        }

        let Some(start_date) = item
            .start_date
            .filter(|d| d.is_confirmed())
            .and_then(|d| d.to_naive_date())
        else {
            debug!(media_id = id, "Start date not announced yet");
            return Ok(SetupOutcome::AwaitingStartDate);
        };

        let title = item.title.clone().ok_or(OrchestratorError::MissingData {
            id,
            what: "title",
        })?;

        let eligible = rules::eligible_at(
            start_date,
            self.inner.settings.downloader.required_airing_hours,
        );
        if Utc::now() < eligible {
            info!(media_id = id, title = %title, until = %eligible, "Not aired yet, deferring");
            self.inner.store.set_download_time(id, Some(eligible)).await;
            return Ok(SetupOutcome::Deferred { until: eligible });
        }
        if item.download_time.is_some() {
            self.inner.store.set_download_time(id, None).await;
        }

        if let Some(manual) = item.manual.as_deref().filter(|m| !m.is_empty()) {
            info!(media_id = id, title = %title, query = %manual, "Setting up manual feed");
            let feed_url = self.inner.searcher.feed_url(manual);
            let accepted = self.add_feed_and_rule(&item, &title, &feed_url, None).await;
            self.inner
                .store
                .set_observe(id, Some(manual.to_string()))
                .await;
            return Ok(SetupOutcome::Manual { accepted });
        }

        if self.inner.settings.matching.strict {
            self.setup_strict(&item, &title).await
        } else {
            self.setup_fallback(&item, &title).await
        }
    }

    /// Search, rank and subscribe to the best release.
    async fn setup_strict(
        &self,
        item: &WatchItem,
        title: &str,
    ) -> Result<SetupOutcome, OrchestratorError> {
        let query = relaxed_title(title);
        let listings = self.inner.searcher.search(&query).await?;

        let best = self
            .inner
            .ranker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve_best_candidate(title, &listings);

        let Some(best) = best else {
            warn!(media_id = item.id, title = %title, query = %query, "No results found");
            self.inner.store.mark_no_results(item.id).await;
            return Ok(SetupOutcome::NoResults);
        };

        let record = best.record;
        if best.stall_risk {
            warn!(
                media_id = item.id,
                listing = %record.original_title,
                "Chosen release has no seeders"
            );
        }

        if record.is_batch {
            info!(
                media_id = item.id,
                title = %title,
                listing = %record.original_title,
                "Adding batch release"
            );
            let accepted = self.add_direct_download(item, title, &record.link).await;
            self.inner
                .store
                .set_observe(item.id, Some(record.title.clone()))
                .await;
            return Ok(SetupOutcome::Batch { accepted });
        }

        let quality = resolution_of(record.quality)
            .map(|r| r.to_string())
            .unwrap_or_default();
        let quoted_title = rules::quoted(&record.title);
        let feed_query = rules::feed_query(&[
            record.group.as_str(),
            quoted_title.as_str(),
            quality.as_str(),
        ]);
        info!(
            media_id = item.id,
            title = %title,
            group = %record.group,
            query = %feed_query,
            "Adding episode feed"
        );

        let feed_url = self.inner.searcher.feed_url(&feed_query);
        let must_contain = rules::strict_must_contain(&record.title);
        let accepted = self
            .add_feed_and_rule(item, title, &feed_url, Some(&must_contain))
            .await;
        self.inner
            .store
            .set_observe(item.id, Some(record.title))
            .await;
        Ok(SetupOutcome::Feed { accepted })
    }

    /// Subscribe to a feed built from the configured group and quality.
    async fn setup_fallback(
        &self,
        item: &WatchItem,
        title: &str,
    ) -> Result<SetupOutcome, OrchestratorError> {
        let matching = &self.inner.settings.matching;
        let feed_query = rules::feed_query(&[
            matching.fallback_group.as_str(),
            title,
            matching.fallback_quality.as_str(),
        ]);
        info!(media_id = item.id, query = %feed_query, "Adding fallback feed");

        let feed_url = self.inner.searcher.feed_url(&feed_query);
        let accepted = self.add_feed_and_rule(item, title, &feed_url, None).await;
        self.inner
            .store
            .set_observe(item.id, Some(title.to_string()))
            .await;
        Ok(SetupOutcome::Fallback { accepted })
    }

    /// Replace the item's feed and point a download rule at it.
    ///
    /// Returns whether the rule was accepted; the item is set up if so.
    async fn add_feed_and_rule(
        &self,
        item: &WatchItem,
        title: &str,
        feed_url: &str,
        must_contain: Option<&str>,
    ) -> bool {
        let client = &self.inner.torrent_client;
        let feed_path = rules::folder_name(title, item.id);

        if let Err(e) = client.remove_feed(&feed_path).await {
            debug!(path = %feed_path, error = %e, "No previous feed removed");
        }
        if let Err(e) = client.add_feed(feed_url, &feed_path).await {
            warn!(media_id = item.id, path = %feed_path, error = %e, "Failed to add feed");
        }

        let rule = self.build_rule(item, title, feed_url, must_contain);
        match client.set_rule(title, &rule).await {
            Ok(()) => {
                info!(media_id = item.id, title = %title, "Download rule added");
                self.inner.store.mark_setup(item.id).await;
                true
            }
            Err(TorrentClientError::AlreadyExists(_)) => {
                info!(media_id = item.id, title = %title, "Download rule already exists");
                self.inner.store.mark_setup(item.id).await;
                true
            }
            Err(e) => {
                error!(media_id = item.id, title = %title, error = %e, "Failed to add download rule");
                false
            }
        }
    }

    fn build_rule(
        &self,
        item: &WatchItem,
        title: &str,
        feed_url: &str,
        must_contain: Option<&str>,
    ) -> DownloadRule {
        let settings = &self.inner.settings;
        let folder = rules::folder_name(title, item.id);
        let save_path = rules::save_path(&settings.download_path, &folder, item.is_movie());
        let rule = DownloadRule::new(feed_url, save_path, &settings.category).with_must_not_contain(
            rules::must_not_contain(
                &settings.downloader.blacklisted_title_words,
                must_contain.is_some(),
            ),
        );

        match must_contain {
            Some(pattern) => rule.with_must_contain(pattern),
            None => rule,
        }
    }

    /// Hand a torrent link straight to the download client.
    ///
    /// Returns whether it was accepted; the item is set up if so.
    async fn add_direct_download(&self, item: &WatchItem, title: &str, link: &str) -> bool {
        let settings = &self.inner.settings;
        let folder = rules::folder_name(title, item.id);
        let request = AddTorrentRequest::url(link)
            .with_save_path(rules::save_path(&settings.download_path, &folder, item.is_movie()))
            .with_category(&settings.category);

        match self.inner.torrent_client.add_torrent(request).await {
            Ok(added) => {
                info!(media_id = item.id, title = %title, hash = ?added.hash, "Torrent added");
                self.inner.store.mark_setup(item.id).await;
                true
            }
            Err(TorrentClientError::InvalidTorrent(msg)) => {
                error!(media_id = item.id, link = %link, reason = %msg, "Torrent file is not valid");
                false
            }
            Err(e) => {
                error!(media_id = item.id, link = %link, error = %e, "Failed to add torrent");
                false
            }
        }
    }

    // =========================================================================
    // Stall detection
    // =========================================================================

    /// Flag items whose observed name matches a stalled download.
    ///
    /// Returns the ids newly flagged.
    pub async fn check_stalled(&self) -> Result<Vec<u64>, OrchestratorError> {
        let torrents = self
            .inner
            .torrent_client
            .list_torrents(&TorrentFilters::stalled())
            .await?;

        if torrents.is_empty() {
            debug!("No stalled torrents");
            return Ok(Vec::new());
        }

        let names: Vec<String> = torrents.into_iter().map(|t| t.name).collect();
        let flagged = self.inner.store.mark_stalled_matching(&names).await;
        STALL_DETECTIONS.inc_by(flagged.len() as u64);

        info!(
            stalled_torrents = names.len(),
            flagged = flagged.len(),
            "Stall check complete"
        );
        Ok(flagged)
    }

    // =========================================================================
    // User-facing operations
    // =========================================================================

    /// Search candidates the user can pick from for an item.
    ///
    /// Runs on the search queue so it respects the same pacing as setups.
    pub async fn resolution_entries(&self, id: u64) -> Result<ResolutionEntries, OrchestratorError> {
        let this = self.clone();
        self.run_on_queue(SEARCH_QUEUE, format!("resolution entries {}", id), async move {
            this.search_resolution_entries(id).await
        })
        .await
    }

    async fn search_resolution_entries(
        &self,
        id: u64,
    ) -> Result<ResolutionEntries, OrchestratorError> {
        let item = self
            .inner
            .store
            .get(id)
            .await
            .ok_or(OrchestratorError::NotFound(id))?;
        let title = item
            .title
            .ok_or(OrchestratorError::MissingData { id, what: "title" })?;

        let relaxed = relaxed_title(&title);
        let search_term = rules::shorten_search_term(&relaxed).to_string();
        let results = self
            .inner
            .searcher
            .search(&search_term)
            .await?
            .into_iter()
            .filter(|listing| listing.seeders > 0)
            .collect();

        Ok(ResolutionEntries {
            search_term,
            results,
        })
    }

    /// Download a listing the user picked by hand.
    ///
    /// Returns whether the download client accepted it. The item stops being
    /// watched for stalls either way.
    pub async fn add_manual_download(&self, id: u64, link: &str) -> Result<bool, OrchestratorError> {
        let this = self.clone();
        let link = link.to_string();
        self.run_on_queue(SEARCH_QUEUE, format!("manual download {}", id), async move {
            let item = this
                .inner
                .store
                .get(id)
                .await
                .ok_or(OrchestratorError::NotFound(id))?;
            let title = item.display_title();
            let accepted = this.add_direct_download(&item, &title, &link).await;
            this.inner.store.set_observe(id, None).await;
            Ok(accepted)
        })
        .await
    }

    /// Run `work` as a job on `queue` and wait for its result.
    async fn run_on_queue<T, Fut>(
        &self,
        queue: &str,
        label: String,
        work: Fut,
    ) -> Result<T, OrchestratorError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, OrchestratorError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.inner.scheduler.enqueue(queue, label, move || async move {
            // The caller may have stopped waiting.
            let _ = tx.send(work.await);
            anyhow::Ok(())
        });
        rx.await.map_err(|_| OrchestratorError::JobDropped)?
    }

    /// Override ranking with a manual search query.
    pub async fn set_manual_rule(&self, id: u64, rule: &str) -> Result<(), OrchestratorError> {
        if !self.inner.store.set_manual_rule(id, rule).await {
            return Err(OrchestratorError::NotFound(id));
        }
        info!(media_id = id, rule = %rule, "Manual rule set");
        Ok(())
    }

    /// Clear setup state so the item is retried on the next cycle.
    pub async fn reset(&self, id: u64) -> Result<(), OrchestratorError> {
        if !self.inner.store.reset(id).await {
            return Err(OrchestratorError::NotFound(id));
        }
        info!(media_id = id, "Item reset");
        Ok(())
    }

    /// Mark an item as handled by the user.
    pub async fn resolve(&self, id: u64) -> Result<(), OrchestratorError> {
        if !self.inner.store.resolve(id).await {
            return Err(OrchestratorError::NotFound(id));
        }
        info!(media_id = id, "Item resolved");
        Ok(())
    }

    /// Track a user and start an update cycle. Returns false if already tracked.
    pub async fn add_user(&self, username: &str) -> bool {
        if !self.inner.store.add_user(username).await {
            debug!(user = %username, "User already tracked");
            return false;
        }
        info!(user = %username, "User added");
        self.update_all().await;
        true
    }

    /// Stop tracking a user. Their items stay tracked.
    pub async fn remove_user(&self, username: &str) -> bool {
        let removed = self.inner.store.remove_user(username).await;
        if removed {
            info!(user = %username, "User removed");
        }
        removed
    }
}

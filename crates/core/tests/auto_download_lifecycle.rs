//! Auto-downloader lifecycle integration tests.
//!
//! These tests drive full update cycles through the scheduler against mock
//! services: watch list -> metadata -> setup -> stall check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use tokio_test::{assert_err, assert_ok};

use anidl_core::{
    config::MatchingConfig,
    orchestrator::SetupOutcome,
    persistence::{SqliteTrackingPersistence, TrackingPersistence},
    testing::{fixtures, MockMetadataProvider, MockSearcher, MockTorrentClient, TorrentOperation},
    torrent_client::{TorrentClientError, TorrentState},
    tracking::{FuzzyDate, MediaInfo},
    AutoDownloader, DownloaderConfig, DownloaderSettings, JobScheduler, OrchestratorError,
    TrackingStore, SEARCH_QUEUE,
};

const USER: &str = "alice";
const LIST: &str = "Watching";

/// Test helper wiring an auto-downloader to mock services.
struct TestHarness {
    downloader: AutoDownloader,
    metadata: Arc<MockMetadataProvider>,
    searcher: Arc<MockSearcher>,
    torrent_client: Arc<MockTorrentClient>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_settings(Self::settings())
    }

    fn settings() -> DownloaderSettings {
        DownloaderSettings {
            downloader: DownloaderConfig::default(),
            matching: MatchingConfig::default(),
            lists: vec![LIST.to_string()],
            download_path: "/downloads/".to_string(),
            category: "Anime".to_string(),
        }
    }

    fn with_settings(settings: DownloaderSettings) -> Self {
        let metadata = Arc::new(MockMetadataProvider::new());
        let searcher = Arc::new(MockSearcher::new());
        let torrent_client = Arc::new(MockTorrentClient::new());

        let downloader = AutoDownloader::new(
            settings,
            Arc::new(TrackingStore::new()),
            Arc::clone(&metadata) as Arc<dyn anidl_core::MetadataProvider>,
            Arc::clone(&searcher) as Arc<dyn anidl_core::Searcher>,
            Arc::clone(&torrent_client) as Arc<dyn anidl_core::TorrentClient>,
            JobScheduler::new(Duration::ZERO),
        );

        Self {
            downloader,
            metadata,
            searcher,
            torrent_client,
        }
    }

    /// Put `media` on the test user's watch list.
    async fn watch(&self, media: MediaInfo) {
        self.metadata.add_list_entry(USER, LIST, media.id).await;
        self.metadata.add_media(media).await;
    }

    /// Run one full update cycle and wait for every queued job.
    async fn run_cycle(&self) {
        if !self.downloader.store().users().await.iter().any(|u| u.username == USER) {
            assert!(self.downloader.add_user(USER).await);
        } else {
            assert!(self.downloader.update_all().await);
        }
        self.wait_idle().await;
    }

    async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.downloader.scheduler().wait_idle())
            .await
            .expect("Queues did not drain in time");
    }
}

fn sample_show_listings() -> Vec<anidl_core::RawListing> {
    vec![
        fixtures::episode_listing("Erai-raws", "Sample Show", 5, "720p", 80),
        fixtures::episode_listing("SubsPlease", "Sample Show", 5, "1080p", 40),
    ]
}

#[tokio::test]
async fn test_full_cycle_adds_strict_feed() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;

    h.run_cycle().await;

    let feeds = h.torrent_client.feeds().await;
    assert_eq!(
        feeds.get("Sample Show").map(String::as_str),
        Some("mock://feed?q=SubsPlease%20%22Sample%20Show%22%201080")
    );

    let rules = h.torrent_client.rules().await;
    let rule = rules.get("Sample Show").expect("rule should be added");
    assert_eq!(rule.must_contain, r"\] Sample Show -");
    assert_eq!(rule.must_not_contain, "batch");
    assert!(rule.use_regex);
    assert_eq!(rule.save_path, "/downloads/Anime/Sample Show");
    assert_eq!(rule.assigned_category, "Anime");

    let item = h.downloader.store().get(1).await.unwrap();
    assert!(item.is_setup);
    assert_eq!(item.observe.as_deref(), Some("Sample Show"));

    let users = h.downloader.store().users().await;
    assert!(users[0].last_updated.is_some());
    assert!(h.downloader.store().last_updated().await.is_some());
}

#[tokio::test]
async fn test_second_cycle_leaves_setup_items_alone() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;

    h.run_cycle().await;
    h.run_cycle().await;

    assert_eq!(h.searcher.search_count().await, 1);
    assert_eq!(h.metadata.media_fetch_count().await, 1);
}

#[tokio::test]
async fn test_batch_release_is_downloaded_directly() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher
        .set_results(vec![
            fixtures::episode_listing("SubsPlease", "Sample Show", 12, "1080p", 90),
            fixtures::batch_listing("SubsPlease", "Sample Show", "1080p", 30),
        ])
        .await;

    h.run_cycle().await;

    let added = h.torrent_client.added_torrents().await;
    assert_eq!(added.len(), 1);
    assert!(added[0].request.url.ends_with(".torrent"));
    assert!(added[0].request.url.contains("batch"));
    assert_eq!(
        added[0].request.save_path.as_deref(),
        Some("/downloads/Anime/Sample Show")
    );
    assert_eq!(added[0].request.category.as_deref(), Some("Anime"));
    assert!(h.torrent_client.rules().await.is_empty());

    let item = h.downloader.store().get(1).await.unwrap();
    assert!(item.is_setup);
    assert_eq!(item.observe.as_deref(), Some("Sample Show"));
}

#[tokio::test]
async fn test_no_results_marks_item() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;

    h.run_cycle().await;

    let item = h.downloader.store().get(1).await.unwrap();
    assert!(item.no_results);
    assert!(!item.is_setup);
    assert!(h.torrent_client.rules().await.is_empty());
}

#[tokio::test]
async fn test_fallback_feed_for_movie() {
    let mut settings = TestHarness::settings();
    settings.matching.strict = false;
    settings.downloader.blacklisted_title_words = vec!["Dub".to_string()];
    let h = TestHarness::with_settings(settings);
    h.watch(fixtures::movie_info(1, "Sample: The Movie")).await;

    h.run_cycle().await;

    assert_eq!(h.searcher.search_count().await, 0);

    let feeds = h.torrent_client.feeds().await;
    assert_eq!(
        feeds.get("Sample The Movie").map(String::as_str),
        Some("mock://feed?q=HorribleSubs%20Sample%3A%20The%20Movie%201080")
    );

    let rules = h.torrent_client.rules().await;
    let rule = rules.get("Sample: The Movie").unwrap();
    assert!(rule.must_contain.is_empty());
    assert!(!rule.use_regex);
    assert_eq!(rule.must_not_contain, "Dub");
    assert_eq!(rule.save_path, "/downloads/Anime Movie/Sample The Movie");

    let item = h.downloader.store().get(1).await.unwrap();
    assert!(item.is_setup);
    assert_eq!(item.observe.as_deref(), Some("Sample: The Movie"));
}

#[tokio::test]
async fn test_manual_rule_overrides_search() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.run_cycle().await;
    assert!(h.downloader.store().get(1).await.unwrap().no_results);

    assert_ok!(
        h.downloader
            .set_manual_rule(1, "[Group] Sample Show 720p")
            .await
    );
    h.run_cycle().await;

    // Only the first cycle searched.
    assert_eq!(h.searcher.search_count().await, 1);

    let rules = h.torrent_client.rules().await;
    let rule = rules.get("Sample Show").unwrap();
    assert_eq!(
        rule.affected_feeds,
        vec!["mock://feed?q=%5BGroup%5D%20Sample%20Show%20720p"]
    );
    assert!(!rule.use_regex);

    let item = h.downloader.store().get(1).await.unwrap();
    assert!(item.is_setup);
    assert!(!item.no_results);
    assert_eq!(item.observe.as_deref(), Some("[Group] Sample Show 720p"));
}

#[tokio::test]
async fn test_blacklisted_origin_is_never_searched() {
    let mut settings = TestHarness::settings();
    settings.downloader.blacklisted_origins = vec!["CN".to_string()];
    let h = TestHarness::with_settings(settings);

    h.watch(MediaInfo {
        country_of_origin: Some("CN".to_string()),
        ..fixtures::media_info(1, "Donghua Show")
    })
    .await;
    h.watch(fixtures::media_info(2, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;

    h.run_cycle().await;

    let blacklisted = h.downloader.store().get(1).await.unwrap();
    assert!(blacklisted.is_blacklisted);
    assert!(blacklisted.is_setup);
    assert_eq!(h.searcher.recorded_searches().await, vec!["Sample Show"]);

    // Neither a reset nor a manual rule brings the item back.
    assert_ok!(h.downloader.reset(1).await);
    h.run_cycle().await;
    assert_ok!(h.downloader.set_manual_rule(1, "[Group] Donghua Show").await);
    h.run_cycle().await;

    assert_eq!(h.searcher.recorded_searches().await, vec!["Sample Show"]);
    let rules = h.torrent_client.rules().await;
    assert_eq!(rules.keys().collect::<Vec<_>>(), vec!["Sample Show"]);
    assert!(h.torrent_client.added_torrents().await.is_empty());
    assert!(h.downloader.store().get(1).await.unwrap().is_setup);
}

#[tokio::test]
async fn test_unaired_item_is_deferred() {
    let h = TestHarness::new();
    let start = Utc::now().date_naive() + chrono::Days::new(10);
    h.watch(MediaInfo {
        start_date: FuzzyDate::new(start.year(), start.month(), start.day()),
        ..fixtures::media_info(1, "Upcoming Show")
    })
    .await;

    h.run_cycle().await;

    let item = h.downloader.store().get(1).await.unwrap();
    assert!(!item.is_setup);
    let download_time = item.download_time.expect("download time should be set");
    assert_eq!(download_time.date_naive(), start - chrono::Days::new(1));
    assert_eq!(h.searcher.search_count().await, 0);
}

#[tokio::test]
async fn test_unannounced_item_waits_for_metadata() {
    let h = TestHarness::new();
    h.watch(fixtures::unannounced_media_info(1, "Rumored Show"))
        .await;

    h.run_cycle().await;
    h.run_cycle().await;

    // Metadata is refetched every cycle until the start date is known.
    assert_eq!(h.metadata.media_fetch_count().await, 2);
    assert_eq!(h.searcher.search_count().await, 0);
    assert!(!h.downloader.store().get(1).await.unwrap().is_setup);
}

#[tokio::test]
async fn test_existing_rule_still_counts_as_setup() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;
    h.torrent_client
        .set_next_error(
            TorrentOperation::SetRule,
            TorrentClientError::AlreadyExists("rule".into()),
        )
        .await;

    h.run_cycle().await;

    assert!(h.downloader.store().get(1).await.unwrap().is_setup);
}

#[tokio::test]
async fn test_rejected_rule_is_retried_next_cycle() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;
    h.torrent_client
        .set_next_error(
            TorrentOperation::SetRule,
            TorrentClientError::ApiError("boom".into()),
        )
        .await;

    h.run_cycle().await;
    assert!(!h.downloader.store().get(1).await.unwrap().is_setup);

    h.run_cycle().await;
    assert!(h.downloader.store().get(1).await.unwrap().is_setup);
    // The second attempt replaced the feed added by the first.
    assert_eq!(
        h.torrent_client.removed_feeds().await,
        vec!["Sample Show", "Sample Show"]
    );
    assert_eq!(h.torrent_client.feeds().await.len(), 1);
}

#[tokio::test]
async fn test_metadata_failure_does_not_block_other_items() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    // Listed but unknown to the provider.
    h.metadata.add_list_entry(USER, LIST, 2).await;
    h.searcher.set_results(sample_show_listings()).await;

    h.run_cycle().await;

    assert!(h.downloader.store().get(1).await.unwrap().is_setup);
    let missing = h.downloader.store().get(2).await.unwrap();
    assert!(missing.title.is_none());
    assert!(!missing.is_setup);
}

#[tokio::test]
async fn test_stalled_download_is_flagged() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;
    h.run_cycle().await;

    h.torrent_client
        .add_listed_torrent("[SubsPlease] Sample Show - 06 [1080p]", TorrentState::Stalled)
        .await;
    h.torrent_client
        .add_listed_torrent("[SubsPlease] Other Show - 06 [1080p]", TorrentState::Seeding)
        .await;

    // The cycle ends with a stall check.
    h.run_cycle().await;

    let item = h.downloader.store().get(1).await.unwrap();
    assert!(item.is_stalled);

    // Already flagged items are not reported again.
    assert!(h.downloader.check_stalled().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_skipped_while_work_active() {
    let h = TestHarness::new();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    h.downloader
        .scheduler()
        .enqueue(SEARCH_QUEUE, "blocker", move || async move {
            let _ = release_rx.await;
            anyhow::Ok(())
        });

    assert!(h.downloader.is_work_active());
    assert!(!h.downloader.update_all().await);

    release_tx.send(()).unwrap();
    h.wait_idle().await;
    assert!(!h.downloader.is_work_active());
    assert!(h.downloader.update_all().await);
    h.wait_idle().await;
}

#[tokio::test]
async fn test_add_user_twice() {
    let h = TestHarness::new();
    h.metadata.add_user(USER).await;

    assert!(h.downloader.add_user(USER).await);
    h.wait_idle().await;
    assert!(!h.downloader.add_user(USER).await);
    assert!(h.downloader.remove_user(USER).await);
    assert!(!h.downloader.remove_user(USER).await);
}

#[tokio::test]
async fn test_resolution_entries_shorten_and_filter() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show Second Season Part 2"))
        .await;
    h.searcher
        .set_results_for(
            "Sample Show Second",
            vec![
                fixtures::raw_listing("[A] Sample Show S2 - 01 [1080p]", 5),
                fixtures::raw_listing("[B] Sample Show S2 - 01 [720p]", 0),
            ],
        )
        .await;
    h.run_cycle().await;

    let entries = h.downloader.resolution_entries(1).await.unwrap();
    assert_eq!(entries.search_term, "Sample Show Second");
    assert_eq!(entries.results.len(), 1);
    assert_eq!(entries.results[0].seeders, 5);

    let err = assert_err!(h.downloader.resolution_entries(42).await);
    assert!(matches!(err, OrchestratorError::NotFound(42)));
}

#[tokio::test]
async fn test_manual_download_stops_observing() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;
    h.run_cycle().await;
    assert!(h.downloader.store().get(1).await.unwrap().observe.is_some());

    let accepted = assert_ok!(
        h.downloader
            .add_manual_download(1, "https://nyaa.example/download/picked.torrent")
            .await
    );
    assert!(accepted);

    let added = h.torrent_client.added_torrents().await;
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].request.url, "https://nyaa.example/download/picked.torrent");

    let item = h.downloader.store().get(1).await.unwrap();
    assert!(item.is_setup);
    assert!(item.observe.is_none());
}

#[tokio::test]
async fn test_invalid_manual_download_is_rejected() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.run_cycle().await;
    h.torrent_client
        .set_next_error(
            TorrentOperation::AddTorrent,
            TorrentClientError::InvalidTorrent("not a torrent".into()),
        )
        .await;

    let accepted = h
        .downloader
        .add_manual_download(1, "https://nyaa.example/download/bad.torrent")
        .await
        .unwrap();
    assert!(!accepted);
    assert!(!h.downloader.store().get(1).await.unwrap().is_setup);
}

#[tokio::test]
async fn test_reset_and_resolve() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;
    h.run_cycle().await;

    assert_ok!(h.downloader.resolve(1).await);
    let item = h.downloader.store().get(1).await.unwrap();
    assert!(item.is_setup);
    assert!(item.no_results);

    assert_ok!(h.downloader.reset(1).await);
    assert_eq!(
        h.downloader.try_setup_auto_download(1).await.unwrap(),
        SetupOutcome::Feed { accepted: true }
    );

    assert!(matches!(
        h.downloader.reset(9).await,
        Err(OrchestratorError::NotFound(9))
    ));
}

#[tokio::test]
async fn test_state_survives_persistence() {
    let h = TestHarness::new();
    h.watch(fixtures::media_info(1, "Sample Show")).await;
    h.searcher.set_results(sample_show_listings()).await;
    h.run_cycle().await;

    let persistence = SqliteTrackingPersistence::in_memory().unwrap();
    let snapshot = h.downloader.store().snapshot().await;
    persistence.save(&snapshot).unwrap();

    let restored = TrackingStore::from_snapshot(persistence.load().unwrap());
    assert_eq!(restored.snapshot().await, snapshot);
}

pub mod config;
pub mod metadata;
pub mod metrics;
pub mod orchestrator;
pub mod persistence;
pub mod release;
pub mod scheduler;
pub mod searcher;
pub mod testing;
pub mod torrent_client;
pub mod tracking;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use metadata::{AniListClient, MetadataError, MetadataProvider};
pub use orchestrator::{
    AutoDownloader, DownloaderConfig, DownloaderSettings, OrchestratorError, ResolutionEntries,
    SetupOutcome,
};
pub use persistence::{PersistenceError, SqliteTrackingPersistence, TrackingPersistence};
pub use release::{
    parse_listing, relaxed_title, BestCandidate, CandidateRanker, GroupPreference, ListingRecord,
    RankingResult, RawListing,
};
pub use scheduler::{JobScheduler, METADATA_QUEUE, SEARCH_QUEUE};
pub use searcher::{NyaaSearcher, SearchError, Searcher};
pub use torrent_client::{QBittorrentClient, TorrentClient, TorrentClientError};
pub use tracking::{MediaInfo, TrackedUser, TrackingSnapshot, TrackingStore, WatchItem};

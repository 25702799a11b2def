//! Release matching: turns noisy feed listings into structured records and
//! picks the single best release for a canonical title.

mod normalize;
mod parser;
mod quality;
mod ranker;
mod types;

pub use normalize::{normalize_title, relaxed_title};
pub use parser::parse_listing;
pub use quality::{resolution_of, score_quality};
pub use ranker::{title_closeness, CandidateRanker, DefaultRankCache, GroupPreference};
pub use types::*;

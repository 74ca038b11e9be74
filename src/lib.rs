//! flag-quiz - asset resolution, offline caching and game logic for a
//! flag-guessing game.
//!
//! Country lists and flag images are read from bundled files when present and
//! fetched from remote providers otherwise. Remote responses go through a
//! cache-first [`OfflineCache`] so a game keeps working once its assets have
//! been seen.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use flag_quiz::{AppConfig, AssetResolver, HttpFetcher, MemoryStore};
//!
//! # async fn example() -> flag_quiz::Result<()> {
//! let config = AppConfig::default();
//! let fetcher = HttpFetcher::new(flag_quiz::build_http_client()?);
//! let resolver = AssetResolver::new(
//!     config.assets,
//!     config.remote,
//!     Arc::new(fetcher),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! let list = resolver.load_countries().await?;
//! println!("{} countries ({})", list.countries.len(), list.origin);
//!
//! let flag = resolver.load_flag("FR").await?;
//! println!("{} bytes of {}", flag.bytes.len(), flag.format);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cache;
pub mod config;
pub mod country;
pub mod error;
pub mod fs;
pub mod game;
pub mod net;
pub mod prefetch;
pub mod prefs;
pub mod resolver;
pub mod stats;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use cache::{CacheStorage, DiskCache, MemoryCache, OfflineCache, Policy, PrecacheReport};
pub use config::{AppConfig, AssetPaths, ImageFormat, PrefetchConfig, RemoteConfig};
pub use country::{Country, RemoteCountry};
pub use error::{AssetKind, Error, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use game::{PairsBoard, QuizRound, QuizSession, RevealOutcome};
pub use net::{Fetcher, HttpFetcher, Request, Response, ResponseKind, build_http_client};
pub use prefetch::{ImageSelection, NoProgress, PrefetchPlan, PrefetchProgress, Prefetcher};
pub use prefs::{GameMode, Preferences, Theme};
pub use resolver::{AssetOrigin, AssetResolver, CountryList, FlagImage, FlagSource};
pub use stats::{FileStats, SessionStats, SessionStatsBuilder};
pub use store::{FileStore, MemoryStore, Store};

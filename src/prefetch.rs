//! One-shot prefetcher that writes the bundled country list and flag images
//! to the paths the resolver reads.

use std::fmt;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::config::{AssetPaths, ImageFormat, PrefetchConfig, RemoteConfig};
use crate::country::{self, Country};
use crate::error::{AssetKind, Error, Result};
use crate::fs::{FileSystem, TokioFileSystem, write_atomic};
use crate::net::{Fetcher, Request};
use crate::resolver::fetch_country_list;
use crate::stats::{FileStats, SessionStats, SessionStatsBuilder};

/// Which image formats to download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageSelection {
    /// No images.
    None,
    /// Vector images only.
    #[default]
    Svg,
    /// Raster images only.
    Png,
    /// Both formats.
    Both,
}

impl ImageSelection {
    /// Formats covered by this selection.
    #[must_use]
    pub const fn formats(self) -> &'static [ImageFormat] {
        match self {
            Self::None => &[],
            Self::Svg => &[ImageFormat::Svg],
            Self::Png => &[ImageFormat::Png],
            Self::Both => &[ImageFormat::Svg, ImageFormat::Png],
        }
    }
}

/// What a prefetch run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchPlan {
    /// Write the simplified country list file.
    pub write_json: bool,
    /// Image formats to download.
    pub images: ImageSelection,
    /// Only download images for the first `n` countries (by name).
    pub limit: Option<usize>,
}

impl Default for PrefetchPlan {
    fn default() -> Self {
        Self {
            write_json: true,
            images: ImageSelection::Svg,
            limit: None,
        }
    }
}

/// Trait for receiving prefetch progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait PrefetchProgress: Send + Sync {
    /// Called once the remote country list has been fetched.
    fn on_list_fetched(&self, _count: usize) {}

    /// Called when the country list file has been written.
    fn on_list_written(&self, _path: &str) {}

    /// Called before image downloads start with the number of pending files.
    fn on_downloads_start(&self, _pending: usize, _skipped: usize) {}

    /// Called when a file download completes successfully.
    fn on_file_complete(&self, _name: &str, _stats: &FileStats) {}

    /// Called when a file download fails.
    fn on_error(&self, _name: &str, _error: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl PrefetchProgress for NoProgress {}

/// One image to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTarget {
    /// Uppercase country code.
    pub code: String,
    /// Image format.
    pub format: ImageFormat,
    /// Remote provider URL.
    pub url: String,
    /// Destination path.
    pub path: PathBuf,
}

impl ImageTarget {
    /// Short display name, e.g. `fr.svg`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}.{}", self.code.to_ascii_lowercase(), self.format)
    }
}

impl fmt::Display for ImageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.path.display(), self.url)
    }
}

/// Result of checking targets against the files already on disk.
#[derive(Debug, Default)]
pub struct CollectedTargets {
    /// Targets that need downloading.
    pub to_download: Vec<ImageTarget>,
    /// Number of targets skipped because the file already exists.
    pub skipped: usize,
}

impl CollectedTargets {
    /// Returns true if there is nothing to download.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.to_download.is_empty()
    }
}

/// Downloads the country list and flag images into the bundled asset layout.
pub struct Prefetcher<F: FileSystem = TokioFileSystem> {
    fetcher: Arc<dyn Fetcher>,
    fs: F,
    assets: AssetPaths,
    remote: RemoteConfig,
    config: PrefetchConfig,
}

impl Prefetcher<TokioFileSystem> {
    /// Creates a prefetcher writing to disk.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        assets: AssetPaths,
        remote: RemoteConfig,
        config: PrefetchConfig,
    ) -> Self {
        Self::with_fs(fetcher, assets, remote, config, TokioFileSystem)
    }
}

impl<F: FileSystem> Prefetcher<F> {
    /// Creates a prefetcher with a custom file system implementation.
    #[must_use]
    pub fn with_fs(
        fetcher: Arc<dyn Fetcher>,
        assets: AssetPaths,
        remote: RemoteConfig,
        config: PrefetchConfig,
        fs: F,
    ) -> Self {
        Self {
            fetcher,
            fs,
            assets,
            remote,
            config,
        }
    }

    /// Returns a reference to the prefetch configuration.
    #[must_use]
    pub const fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Fetches the simplified remote country list.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is unusable.
    pub async fn fetch_countries(&self) -> Result<Vec<Country>> {
        fetch_country_list(self.fetcher.as_ref(), &self.remote).await
    }

    /// Writes the country list in the bundled format.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_country_list(&self, countries: &[Country]) -> Result<PathBuf> {
        let path = self.assets.country_list_path();
        let json = country::to_json(countries)?;
        write_atomic(&self.fs, &path, json.as_bytes()).await?;
        log::info!("Wrote {} countries to {}", countries.len(), path.display());
        Ok(path)
    }

    /// Lists the images a plan asks for, capped to the first `limit` countries.
    #[must_use]
    pub fn plan_targets(&self, countries: &[Country], plan: &PrefetchPlan) -> Vec<ImageTarget> {
        let limit = plan.limit.unwrap_or(countries.len());
        countries
            .iter()
            .take(limit)
            .flat_map(|c| {
                plan.images.formats().iter().map(move |&format| ImageTarget {
                    code: c.code.clone(),
                    format,
                    url: self.remote.flag_url(&c.code, format),
                    path: self.assets.flag_path(&c.code, format),
                })
            })
            .collect()
    }

    /// Drops targets whose file already exists with content, unless forced.
    pub async fn collect_targets(&self, targets: Vec<ImageTarget>) -> CollectedTargets {
        let mut collected = CollectedTargets::default();
        for target in targets {
            let exists = !self.config.force_overwrite
                && self.fs.file_size(&target.path).await.is_some_and(|s| s > 0);
            if exists {
                collected.skipped += 1;
            } else {
                collected.to_download.push(target);
            }
        }
        collected
    }

    /// Downloads a single image using atomic `.part` file semantics.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, returns a non-2xx or empty
    /// body, the write fails, or the token is cancelled.
    pub async fn download_target(
        &self,
        target: &ImageTarget,
        cancellation_token: Option<&CancellationToken>,
    ) -> Result<FileStats> {
        let started = Instant::now();
        let request = Request::image(&target.url)?;

        let response = if let Some(token) = cancellation_token {
            tokio::select! {
                biased;
                () = token.cancelled() => return Err(Error::Cancelled),
                res = self.fetcher.fetch(&request) => res?,
            }
        } else {
            self.fetcher.fetch(&request).await?
        };

        let response = response.error_for_status()?;
        if response.body.is_empty() {
            return Err(Error::MissingAsset {
                kind: AssetKind::FlagImage,
                key: target.code.clone(),
            });
        }

        write_atomic(&self.fs, &target.path, &response.body).await?;
        Ok(FileStats {
            size: response.body.len() as u64,
            elapsed: started.elapsed(),
        })
    }

    /// Downloads all targets with bounded concurrency.
    ///
    /// Individual failures are logged and counted; they do not abort the run.
    pub async fn download_all(
        &self,
        targets: &[ImageTarget],
        progress: &Arc<dyn PrefetchProgress>,
        builder: &mut SessionStatsBuilder,
        cancellation_token: Option<&CancellationToken>,
    ) {
        if targets.is_empty() {
            return;
        }

        let mut downloads = pin!(
            stream::iter(targets)
                .map(|target| async move {
                    let result = self.download_target(target, cancellation_token).await;
                    (target, result)
                })
                .buffer_unordered(self.config.concurrent_downloads.max(1))
        );

        while let Some((target, result)) = downloads.next().await {
            match result {
                Ok(file_stats) => {
                    progress.on_file_complete(&target.name(), &file_stats);
                    builder.add_download(&file_stats);
                }
                Err(Error::Cancelled) => builder.add_failure(),
                Err(e) => {
                    log::error!("Download failed: {target}: {e}");
                    progress.on_error(&target.name(), &e.to_string());
                    builder.add_failure();
                }
            }
        }
    }

    /// Runs a whole plan: fetch the list, optionally write it, download images.
    ///
    /// # Errors
    ///
    /// Returns an error if the country list cannot be fetched or written, or
    /// if the run is cancelled. Image failures are reported in the stats.
    pub async fn run(
        &self,
        plan: &PrefetchPlan,
        progress: &Arc<dyn PrefetchProgress>,
        cancellation_token: Option<&CancellationToken>,
    ) -> Result<SessionStats> {
        let mut builder = SessionStatsBuilder::new();

        let countries = self.fetch_countries().await?;
        progress.on_list_fetched(countries.len());

        if plan.write_json {
            let path = self.write_country_list(&countries).await?;
            progress.on_list_written(&path.display().to_string());
        }
        builder.set_countries(countries.len(), plan.write_json);

        let collected = self
            .collect_targets(self.plan_targets(&countries, plan))
            .await;
        builder.set_skipped(collected.skipped);
        progress.on_downloads_start(collected.to_download.len(), collected.skipped);

        self.download_all(
            &collected.to_download,
            progress,
            &mut builder,
            cancellation_token,
        )
        .await;

        if cancellation_token.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        Ok(builder.build())
    }
}

//! Asset resolution: bundled files first, remote services second.
//!
//! The country list comes from the bundled JSON file when present. Otherwise
//! it is fetched from the remote API, reduced to `{code, name}`, persisted in
//! the [`Store`] and returned; if the API is unreachable the persisted copy
//! from an earlier session is used. Flag images come from the bundled
//! directory (preferred format first), then from the matching remote
//! provider, then from the other one.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{AssetPaths, ImageFormat, RemoteConfig};
use crate::country::{self, Country};
use crate::error::{AssetKind, Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::net::{Destination, Fetcher, Request};
use crate::store::{Store, keys};

/// Where a resolved asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOrigin {
    /// Bundled local file.
    Bundled,
    /// Remote service (possibly replayed from the offline cache).
    Remote,
    /// Copy persisted in the store by an earlier session.
    Persisted,
}

impl fmt::Display for AssetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => f.write_str("bundled"),
            Self::Remote => f.write_str("remote"),
            Self::Persisted => f.write_str("persisted"),
        }
    }
}

/// A resolved country list.
#[derive(Debug, Clone)]
pub struct CountryList {
    /// Filtered countries, sorted by name.
    pub countries: Vec<Country>,
    /// Source of the list.
    pub origin: AssetOrigin,
}

/// Location a flag image would be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagSource {
    /// Bundled file.
    Local(PathBuf),
    /// Remote provider URL.
    Remote(String),
}

impl fmt::Display for FlagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// A loaded flag image.
#[derive(Debug, Clone)]
pub struct FlagImage {
    /// Uppercase country code.
    pub code: String,
    /// Image format.
    pub format: ImageFormat,
    /// Source of the bytes.
    pub origin: AssetOrigin,
    /// Image data.
    pub bytes: Bytes,
}

/// Fetches and simplifies the remote country list.
///
/// # Errors
///
/// Returns an error if the request fails, the response is not a 2xx, or the
/// body is not a JSON array.
pub async fn fetch_country_list(fetcher: &dyn Fetcher, remote: &RemoteConfig) -> Result<Vec<Country>> {
    let request = Request::get(&remote.country_list_url)?.with_destination(Destination::Data);
    let response = fetcher.fetch(&request).await?.error_for_status()?;
    country::parse_remote(&response.body, &remote.excluded_codes)
}

/// Resolves the country list and flag images.
pub struct AssetResolver<F: FileSystem = TokioFileSystem> {
    fs: F,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    assets: AssetPaths,
    remote: RemoteConfig,
}

impl AssetResolver<TokioFileSystem> {
    /// Creates a resolver reading bundled assets from disk.
    #[must_use]
    pub fn new(
        assets: AssetPaths,
        remote: RemoteConfig,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self::with_fs(assets, remote, fetcher, store, TokioFileSystem)
    }
}

impl<F: FileSystem> AssetResolver<F> {
    /// Creates a resolver with a custom file system implementation.
    #[must_use]
    pub fn with_fs(
        assets: AssetPaths,
        remote: RemoteConfig,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        fs: F,
    ) -> Self {
        Self {
            fs,
            fetcher,
            store,
            assets,
            remote,
        }
    }

    /// Bundled asset locations.
    #[must_use]
    pub const fn assets(&self) -> &AssetPaths {
        &self.assets
    }

    /// Remote endpoint configuration.
    #[must_use]
    pub const fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    /// Resolves the country list.
    ///
    /// The network is not touched when the bundled file is readable and
    /// non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAsset`] when the bundled file, the remote API
    /// and the persisted copy all fail.
    pub async fn load_countries(&self) -> Result<CountryList> {
        match self.load_bundled_list().await {
            Ok(countries) => {
                log::debug!("Loaded {} bundled countries", countries.len());
                return Ok(CountryList {
                    countries,
                    origin: AssetOrigin::Bundled,
                });
            }
            Err(e) => log::debug!(
                "Bundled country list unavailable at {}: {e}",
                self.assets.country_list_path().display()
            ),
        }

        match self.fetch_remote_list().await {
            Ok(countries) => {
                self.persist_list(&countries).await;
                log::info!("Fetched {} countries from remote API", countries.len());
                return Ok(CountryList {
                    countries,
                    origin: AssetOrigin::Remote,
                });
            }
            Err(e) => log::warn!("Remote country list failed: {e}"),
        }

        match self.load_persisted_list().await {
            Some(countries) => {
                log::info!("Using {} persisted countries", countries.len());
                Ok(CountryList {
                    countries,
                    origin: AssetOrigin::Persisted,
                })
            }
            None => Err(Error::MissingAsset {
                kind: AssetKind::CountryList,
                key: self.remote.country_list_url.clone(),
            }),
        }
    }

    async fn load_bundled_list(&self) -> Result<Vec<Country>> {
        let bytes = self
            .fs
            .read_file(&self.assets.country_list_path())
            .await?;
        let countries = country::parse_local(&bytes, &self.remote.excluded_codes)?;
        if countries.is_empty() {
            return Err(Error::MissingAsset {
                kind: AssetKind::CountryList,
                key: self.assets.country_list_path().display().to_string(),
            });
        }
        Ok(countries)
    }

    async fn fetch_remote_list(&self) -> Result<Vec<Country>> {
        let countries = fetch_country_list(self.fetcher.as_ref(), &self.remote).await?;
        if countries.is_empty() {
            return Err(Error::MissingAsset {
                kind: AssetKind::CountryList,
                key: self.remote.country_list_url.clone(),
            });
        }
        Ok(countries)
    }

    async fn persist_list(&self, countries: &[Country]) {
        let result = match country::to_json(countries) {
            Ok(json) => self.store.set(keys::COUNTRIES, &json).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::warn!("Failed to persist country list: {e}");
        }
    }

    async fn load_persisted_list(&self) -> Option<Vec<Country>> {
        let raw = match self.store.get(keys::COUNTRIES).await {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("Failed to read persisted country list: {e}");
                return None;
            }
        };
        match country::parse_local(raw.as_bytes(), &self.remote.excluded_codes) {
            Ok(countries) if !countries.is_empty() => Some(countries),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Ignoring corrupt persisted country list: {e}");
                None
            }
        }
    }

    /// Returns where the flag for `code` would be loaded from.
    ///
    /// Bundled files are checked (preferred format first) before any remote
    /// URL is built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCode`] for malformed codes.
    pub async fn flag_source(&self, code: &str) -> Result<FlagSource> {
        let code = country::normalize_code(code)?;
        for format in self.remote.preferred_format.preference_order() {
            let path = self.assets.flag_path(&code, format);
            if self.fs.file_exists(&path).await {
                return Ok(FlagSource::Local(path));
            }
        }
        Ok(FlagSource::Remote(
            self.remote.flag_url(&code, self.remote.preferred_format),
        ))
    }

    /// Loads the flag image for `code`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCode`] for malformed codes and
    /// [`Error::MissingAsset`] when no local or remote source can provide it.
    pub async fn load_flag(&self, code: &str) -> Result<FlagImage> {
        let code = country::normalize_code(code)?;
        let order = self.remote.preferred_format.preference_order();

        for format in order {
            let path = self.assets.flag_path(&code, format);
            match self.fs.read_file(&path).await {
                Ok(bytes) if bytes.is_empty() => {
                    log::debug!("Bundled flag at {} is empty", path.display());
                }
                Ok(bytes) => {
                    return Ok(FlagImage {
                        code,
                        format,
                        origin: AssetOrigin::Bundled,
                        bytes: bytes.into(),
                    });
                }
                Err(e) => log::debug!("No bundled flag at {}: {e}", path.display()),
            }
        }

        for format in order {
            let url = self.remote.flag_url(&code, format);
            match self.fetch_flag(&url).await {
                Ok(bytes) => {
                    return Ok(FlagImage {
                        code,
                        format,
                        origin: AssetOrigin::Remote,
                        bytes,
                    });
                }
                Err(e) => log::warn!("Flag {code} unavailable from {url}: {e}"),
            }
        }

        Err(Error::MissingAsset {
            kind: AssetKind::FlagImage,
            key: code,
        })
    }

    async fn fetch_flag(&self, url: &str) -> Result<Bytes> {
        let request = Request::image(url)?;
        let response = self.fetcher.fetch(&request).await?;
        let body = if response.is_opaque() {
            // Status unknown; accepted the same way the offline cache accepts it.
            response.body
        } else {
            response.error_for_status()?.body
        };
        if body.is_empty() {
            return Err(Error::MissingAsset {
                kind: AssetKind::FlagImage,
                key: url.to_string(),
            });
        }
        Ok(body)
    }
}

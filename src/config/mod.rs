//! Configuration types for asset resolution, caching and prefetching.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name used for the config, data and cache directories.
pub const APP_DIR_NAME: &str = "flag-quiz";

/// Flag image file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Vector image (`.svg`).
    Svg,
    /// Raster image (`.png`).
    Png,
}

impl ImageFormat {
    /// File extension without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }

    /// The other format, used as the fallback when this one is unavailable.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Svg => Self::Png,
            Self::Png => Self::Svg,
        }
    }

    /// Returns this format followed by its fallback.
    #[must_use]
    pub const fn preference_order(self) -> [Self; 2] {
        [self, self.other()]
    }

    /// MIME type served for this format.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            other => Err(format!("unknown image format: {other}")),
        }
    }
}

/// Locations of the bundled assets, relative to `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    /// Directory the relative paths below are resolved against.
    pub root: PathBuf,
    /// Bundled country list (JSON array of `{code, name}`).
    pub country_list: PathBuf,
    /// Directory holding `<code>.svg` / `<code>.png` flag images.
    pub flags_dir: PathBuf,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            country_list: PathBuf::from("data/countries.json"),
            flags_dir: PathBuf::from("flags"),
        }
    }
}

impl AssetPaths {
    /// Creates asset paths rooted at `root` with the default layout.
    #[must_use]
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Full path of the bundled country list.
    #[must_use]
    pub fn country_list_path(&self) -> PathBuf {
        self.root.join(&self.country_list)
    }

    /// Directory holding the bundled flag images.
    #[must_use]
    pub fn flags_path(&self) -> PathBuf {
        self.root.join(&self.flags_dir)
    }

    /// Full path of a bundled flag image; file names use the lowercase code.
    #[must_use]
    pub fn flag_path(&self, code: &str, format: ImageFormat) -> PathBuf {
        self.flags_path().join(format!(
            "{}.{}",
            code.to_ascii_lowercase(),
            format.extension()
        ))
    }
}

/// Remote endpoints used when bundled assets are missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Country list API returning objects with code/name/region fields.
    pub country_list_url: String,
    /// Vector image provider. `{code}` expands to the lowercase code.
    pub svg_url_template: String,
    /// Raster image provider. `{CODE}`, `{style}` and `{size}` are expanded.
    pub png_url_template: String,
    /// Raster style parameter.
    pub png_style: String,
    /// Raster size parameter in pixels.
    pub png_size: u32,
    /// Format tried first, both locally and remotely.
    pub preferred_format: ImageFormat,
    /// Codes that are never shown even if upstream lists them.
    pub excluded_codes: Vec<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            country_list_url: "https://restcountries.com/v3.1/all?fields=cca2,name,region"
                .to_string(),
            svg_url_template: "https://flagcdn.com/{code}.svg".to_string(),
            png_url_template: "https://flagsapi.com/{CODE}/{style}/{size}.png".to_string(),
            png_style: "flat".to_string(),
            png_size: 64,
            preferred_format: ImageFormat::Svg,
            excluded_codes: vec!["XK".to_string()],
        }
    }
}

impl RemoteConfig {
    /// Builds the remote URL of a flag image for the given provider format.
    #[must_use]
    pub fn flag_url(&self, code: &str, format: ImageFormat) -> String {
        let template = match format {
            ImageFormat::Svg => &self.svg_url_template,
            ImageFormat::Png => &self.png_url_template,
        };
        template
            .replace("{code}", &code.to_ascii_lowercase())
            .replace("{CODE}", &code.to_ascii_uppercase())
            .replace("{style}", &self.png_style)
            .replace("{size}", &self.png_size.to_string())
    }

    /// Sets the preferred image format.
    #[must_use]
    pub const fn with_preferred_format(mut self, format: ImageFormat) -> Self {
        self.preferred_format = format;
        self
    }

    /// Sets the country list URL.
    #[must_use]
    pub fn with_country_list_url(mut self, url: impl Into<String>) -> Self {
        self.country_list_url = url.into();
        self
    }
}

/// Offline cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache namespace. Changing it abandons responses stored under the old name.
    pub name: String,
    /// Origin treated as same-origin by the interception policy.
    pub origin: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "flag-quiz-v1".to_string(),
            origin: "http://localhost".to_string(),
        }
    }
}

/// Configuration for the asset prefetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Number of concurrent image downloads.
    pub concurrent_downloads: usize,
    /// Whether to overwrite existing files.
    pub force_overwrite: bool,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: 8,
            force_overwrite: false,
        }
    }
}

impl PrefetchConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of concurrent downloads (at least one).
    #[must_use]
    pub fn with_concurrent_downloads(mut self, concurrent: usize) -> Self {
        self.concurrent_downloads = concurrent.max(1);
        self
    }

    /// Sets whether to force overwrite existing files.
    #[must_use]
    pub const fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }
}

/// Directories for persisted state and cached responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory where the key/value store keeps its files.
    pub store_dir: PathBuf,
    /// Directory holding offline cache namespaces.
    pub cache_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            store_dir: data_dir.join(APP_DIR_NAME).join("store"),
            cache_dir: cache_dir.join(APP_DIR_NAME).join("offline"),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bundled asset locations.
    pub assets: AssetPaths,
    /// Remote fallbacks.
    pub remote: RemoteConfig,
    /// Offline cache settings.
    pub cache: CacheConfig,
    /// Prefetcher settings.
    pub prefetch: PrefetchConfig,
    /// State and cache directories.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("config.toml")
    }

    /// Loads configuration from a TOML file, falling back to defaults when
    /// the file does not exist. Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> crate::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents)?;
                log::debug!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sets the bundled asset root.
    #[must_use]
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.assets.root = root.into();
        self
    }
}

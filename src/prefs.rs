//! Theme and game-mode preferences persisted through a [`Store`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{Store, keys};

/// Colour theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Always light.
    Light,
    /// Always dark.
    Dark,
    /// Follow the platform setting.
    #[default]
    System,
}

impl Theme {
    /// The theme an explicit toggle switches to.
    ///
    /// `System` resolves to the opposite of what the platform currently shows.
    #[must_use]
    pub const fn toggled(self, system_prefers_dark: bool) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
            Self::System if system_prefers_dark => Self::Light,
            Self::System => Self::Dark,
        }
    }

    /// Whether the dark palette should be shown.
    #[must_use]
    pub const fn is_dark(self, system_prefers_dark: bool) -> bool {
        match self {
            Self::Light => false,
            Self::Dark => true,
            Self::System => system_prefers_dark,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(format!("unknown theme: {other}")),
        }
    }
}

/// Game mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Multiple-choice: name the shown flag.
    #[default]
    Quiz,
    /// Memory: match each flag with its name.
    Pairs,
}

impl GameMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Pairs => "pairs",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiz" => Ok(Self::Quiz),
            "pairs" => Ok(Self::Pairs),
            other => Err(format!("unknown game mode: {other}")),
        }
    }
}

/// Both persisted preferences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preferences {
    /// Colour theme.
    pub theme: Theme,
    /// Game mode.
    pub mode: GameMode,
}

impl Preferences {
    /// Loads preferences; missing or unrecognised values fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself fails.
    pub async fn load(store: &dyn Store) -> Result<Self> {
        let theme = load_value(store, keys::THEME).await?;
        let mode = load_value(store, keys::MODE).await?;
        Ok(Self { theme, mode })
    }

    /// Persists a new theme.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn set_theme(&mut self, store: &dyn Store, theme: Theme) -> Result<()> {
        store.set(keys::THEME, theme.as_str()).await?;
        self.theme = theme;
        log::debug!("Theme set to {theme}");
        Ok(())
    }

    /// Applies an explicit user toggle and persists the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn toggle_theme(&mut self, store: &dyn Store, system_prefers_dark: bool) -> Result<Theme> {
        let theme = self.theme.toggled(system_prefers_dark);
        self.set_theme(store, theme).await?;
        Ok(theme)
    }

    /// Persists a new game mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn set_mode(&mut self, store: &dyn Store, mode: GameMode) -> Result<()> {
        store.set(keys::MODE, mode.as_str()).await?;
        self.mode = mode;
        log::debug!("Game mode set to {mode}");
        Ok(())
    }
}

async fn load_value<T>(store: &dyn Store, key: &str) -> Result<T>
where
    T: FromStr<Err = String> + Default,
{
    Ok(match store.get(key).await? {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            log::warn!("Ignoring stored {key}: {e}");
            T::default()
        }),
        None => T::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn theme_toggle_cycle() {
        assert_eq!(Theme::Light.toggled(false), Theme::Dark);
        assert_eq!(Theme::Dark.toggled(false), Theme::Light);
        assert_eq!(Theme::System.toggled(true), Theme::Light);
        assert_eq!(Theme::System.toggled(false), Theme::Dark);
    }

    #[test]
    fn theme_is_dark_follows_system_only_for_system() {
        assert!(Theme::System.is_dark(true));
        assert!(!Theme::System.is_dark(false));
        assert!(Theme::Dark.is_dark(false));
        assert!(!Theme::Light.is_dark(true));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("DARK".parse::<Theme>(), Ok(Theme::Dark));
        assert_eq!(" Pairs ".parse::<GameMode>(), Ok(GameMode::Pairs));
        assert!("sepia".parse::<Theme>().is_err());
    }

    #[tokio::test]
    async fn defaults_when_store_empty() {
        let store = MemoryStore::new();
        let prefs = Preferences::load(&store).await.unwrap();
        assert_eq!(prefs.theme, Theme::System);
        assert_eq!(prefs.mode, GameMode::Quiz);
    }

    #[tokio::test]
    async fn unrecognised_values_fall_back() {
        let store = MemoryStore::new();
        store.set(keys::THEME, "neon").await.unwrap();
        store.set(keys::MODE, "pairs").await.unwrap();

        let prefs = Preferences::load(&store).await.unwrap();
        assert_eq!(prefs.theme, Theme::System);
        assert_eq!(prefs.mode, GameMode::Pairs);
    }

    #[tokio::test]
    async fn changes_persist() {
        let store = MemoryStore::new();
        let mut prefs = Preferences::load(&store).await.unwrap();

        assert_eq!(prefs.toggle_theme(&store, true).await.unwrap(), Theme::Light);
        prefs.set_mode(&store, GameMode::Pairs).await.unwrap();

        let reloaded = Preferences::load(&store).await.unwrap();
        assert_eq!(reloaded, prefs);
        assert_eq!(store.get(keys::THEME).await.unwrap().as_deref(), Some("light"));
    }
}

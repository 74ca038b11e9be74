//! Country records and the filtering applied to every source of them.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").expect("valid regex"));

/// A simplified country record: the projection stored locally and shown in games.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Country {
    /// Two uppercase ASCII letters.
    pub code: String,
    /// Display name.
    pub name: String,
}

impl Country {
    /// Creates a country record without validating it.
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    /// Renders the code as a pair of regional indicator symbols.
    #[must_use]
    pub fn flag_emoji(&self) -> String {
        self.code
            .chars()
            .filter(char::is_ascii_uppercase)
            .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
            .collect()
    }
}

/// Name field of an upstream record: either a plain string or `{ "common": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteName {
    /// `"name": "France"`
    Plain(String),
    /// `"name": { "common": "France", ... }`
    Detailed {
        /// Common English name.
        common: String,
    },
}

impl RemoteName {
    fn as_str(&self) -> &str {
        match self {
            Self::Plain(name) | Self::Detailed { common: name } => name,
        }
    }
}

/// A record as returned by the remote country list API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCountry {
    /// ISO 3166-1 alpha-2 code.
    #[serde(default, alias = "cca2")]
    pub code: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<RemoteName>,
    /// Geographic region, unused by the simplified projection.
    #[serde(default)]
    pub region: Option<String>,
}

impl RemoteCountry {
    /// Projects to a [`Country`], or `None` when code or name are unusable.
    #[must_use]
    pub fn simplify(&self) -> Option<Country> {
        let code = self.code.as_deref()?.trim();
        let name = self.name.as_ref()?.as_str().trim();
        (is_valid_code(code) && !name.is_empty()).then(|| Country::new(code, name))
    }
}

/// Returns true if `code` is exactly two uppercase ASCII letters.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    CODE_RE.is_match(code)
}

/// Normalizes user input (`"fr"`, `" Fr "`) to a validated uppercase code.
///
/// # Errors
///
/// Returns [`Error::InvalidCode`] if the input is not two ASCII letters.
pub fn normalize_code(input: &str) -> Result<String> {
    let code = input.trim().to_ascii_uppercase();
    if is_valid_code(&code) {
        Ok(code)
    } else {
        Err(Error::InvalidCode(input.to_string()))
    }
}

/// Filters, de-duplicates and sorts country records.
///
/// Drops records without a valid code or a non-empty name and any code in
/// `excluded`. The first record wins when a code repeats. The result is
/// sorted by name, case-insensitively, with ties broken by code.
#[must_use]
pub fn simplify<I>(records: I, excluded: &[String]) -> Vec<Country>
where
    I: IntoIterator<Item = Country>,
{
    let mut seen = HashSet::new();
    let mut countries: Vec<Country> = records
        .into_iter()
        .map(|c| Country::new(c.code.trim(), c.name.trim()))
        .filter(|c| is_valid_code(&c.code) && !c.name.is_empty())
        .filter(|c| !excluded.iter().any(|x| x.eq_ignore_ascii_case(&c.code)))
        .filter(|c| seen.insert(c.code.clone()))
        .collect();

    sort_by_name(&mut countries);
    countries
}

/// Sorts countries for display.
pub fn sort_by_name(countries: &mut [Country]) {
    countries.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.code.cmp(&b.code))
    });
}

/// Parses the remote API response into simplified records.
///
/// Individual records that fail to deserialize are skipped.
///
/// # Errors
///
/// Returns an error if the body is not a JSON array.
pub fn parse_remote(body: &[u8], excluded: &[String]) -> Result<Vec<Country>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    let total = values.len();

    let records: Vec<Country> = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RemoteCountry>(value) {
            Ok(record) => record.simplify(),
            Err(e) => {
                log::debug!("Skipping malformed country record: {e}");
                None
            }
        })
        .collect();

    let countries = simplify(records, excluded);
    log::debug!("Kept {} of {total} remote country records", countries.len());
    Ok(countries)
}

/// Parses a bundled or persisted `[{code, name}]` list.
///
/// # Errors
///
/// Returns an error if the body is not a JSON array of `{code, name}` objects.
pub fn parse_local(body: &[u8], excluded: &[String]) -> Result<Vec<Country>> {
    let records: Vec<Country> = serde_json::from_slice(body)?;
    Ok(simplify(records, excluded))
}

/// Serializes a list in the bundled `[{code, name}]` format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(countries: &[Country]) -> Result<String> {
    Ok(serde_json::to_string_pretty(countries)?)
}

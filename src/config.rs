//! Persistent configuration model and defaults.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::ConfigError;

const CONFIG_DIR_NAME: &str = "reelgate";
const CONFIG_FILE_NAME: &str = "config.toml";
const CACHE_FILE_NAME: &str = "resolution_cache.db";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Accept/reject predicates.
    pub filter: FilterConfig,
    #[serde(default)]
    /// Search, matching, and provider settings.
    pub resolver: ResolverConfig,
    #[serde(default)]
    /// Resolution cache location and lifetimes.
    pub cache: CacheConfig,
}

/// Quality predicates evaluated against every item's metadata.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FilterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_votes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_year: Option<i32>,
    /// Reject when any genre is in this set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_genres: Option<BTreeSet<String>>,
    /// Reject when any language is in this set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_languages: Option<BTreeSet<String>>,
    /// Reject unless every language is in this set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_languages: Option<BTreeSet<String>>,
    /// Reject items whose reference cannot be determined.
    #[serde(default = "default_true")]
    pub filter_invalid: bool,
}

/// Settings for title cleanup, candidate ranking, and provider access.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ResolverConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Minimum spacing between two provider requests.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Skips request pacing and enables debug logging.
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_noise_words")]
    pub noise_words: Vec<String>,
    #[serde(default = "default_cutoff_keywords")]
    pub cutoff_keywords: Vec<String>,
    #[serde(default = "default_min_match")]
    pub min_match: f64,
    #[serde(default = "default_min_diff")]
    pub min_diff: f64,
    #[serde(default = "default_aka_weight")]
    pub aka_weight: f64,
    #[serde(default = "default_unpopular_weight")]
    pub unpopular_weight: f64,
    #[serde(default = "default_ignored_types")]
    pub ignored_types: Vec<String>,
}

/// Resolution cache location and entry lifetimes.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    /// Database path. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_failure_ttl_days")]
    pub failure_ttl_days: u32,
    #[serde(default = "default_record_ttl_days")]
    pub record_ttl_days: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_score: None,
            min_votes: None,
            min_year: None,
            reject_genres: None,
            reject_languages: None,
            accept_languages: None,
            filter_invalid: true,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            cooldown_ms: default_cooldown_ms(),
            debug: false,
            request_timeout_secs: default_request_timeout_secs(),
            noise_words: default_noise_words(),
            cutoff_keywords: default_cutoff_keywords(),
            min_match: default_min_match(),
            min_diff: default_min_diff(),
            aka_weight: default_aka_weight(),
            unpopular_weight: default_unpopular_weight(),
            ignored_types: default_ignored_types(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            failure_ttl_days: default_failure_ttl_days(),
            record_ttl_days: default_record_ttl_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://www.imdb.com".to_string()
}

fn default_user_agent() -> String {
    concat!("reelgate/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_cooldown_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_noise_words() -> Vec<String> {
    vec!["imax".to_string()]
}

fn default_cutoff_keywords() -> Vec<String> {
    [
        "dvdrip", "dvdscr", "cam", "r5", "limited", "xvid", "h264", "x264", "h.264", "x.264",
        "dvd", "screener", "unrated", "repack", "rerip", "proper", "720p", "1080p", "1080i",
        "bluray",
    ]
    .iter()
    .map(|keyword| keyword.to_string())
    .collect()
}

fn default_min_match() -> f64 {
    0.5
}

fn default_min_diff() -> f64 {
    0.01
}

fn default_aka_weight() -> f64 {
    0.9
}

fn default_unpopular_weight() -> f64 {
    0.95
}

fn default_ignored_types() -> Vec<String> {
    vec!["VG".to_string()]
}

fn default_failure_ttl_days() -> u32 {
    7
}

fn default_record_ttl_days() -> u32 {
    30
}

fn lowercase_set(values: Option<BTreeSet<String>>) -> Option<BTreeSet<String>> {
    values.map(|set| {
        set.into_iter()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .collect()
    })
}

fn lowercase_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Clamps ratios into `[0, 1]` and lower-cases every matching vocabulary.
pub fn sanitize_config(config: Config) -> Config {
    let clamp_unit = |value: f64| {
        if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        }
    };

    let mut resolver = config.resolver;
    resolver.min_match = clamp_unit(resolver.min_match);
    resolver.min_diff = clamp_unit(resolver.min_diff);
    resolver.aka_weight = clamp_unit(resolver.aka_weight);
    resolver.unpopular_weight = clamp_unit(resolver.unpopular_weight);
    resolver.request_timeout_secs = resolver.request_timeout_secs.max(1);
    resolver.noise_words = lowercase_list(resolver.noise_words);
    resolver.cutoff_keywords = lowercase_list(resolver.cutoff_keywords);
    resolver.ignored_types = lowercase_list(resolver.ignored_types);
    resolver.base_url = resolver.base_url.trim().trim_end_matches('/').to_string();
    if resolver.base_url.is_empty() {
        resolver.base_url = default_base_url();
    }

    let filter = FilterConfig {
        reject_genres: lowercase_set(config.filter.reject_genres),
        reject_languages: lowercase_set(config.filter.reject_languages),
        accept_languages: lowercase_set(config.filter.accept_languages),
        ..config.filter
    };

    let cache = CacheConfig {
        failure_ttl_days: config.cache.failure_ttl_days.max(1),
        record_ttl_days: config.cache.record_ttl_days.max(1),
        ..config.cache
    };

    Config {
        filter,
        resolver,
        cache,
    }
}

/// Default `config.toml` location under the platform config directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

/// Cache database path, honoring an explicit override from the config.
pub fn resolve_cache_path(cache: &CacheConfig) -> Option<PathBuf> {
    if let Some(path) = cache.path.as_deref().filter(|path| !path.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::data_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CACHE_FILE_NAME))
}

/// Loads `path`, writing the defaults there first when the file does not exist.
pub fn load_or_create_config(path: &Path) -> Result<Config, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, toml::to_string(&Config::default())?).map_err(io_error)?;
    }

    let content = std::fs::read_to_string(path).map_err(io_error)?;
    let parsed = toml::from_str::<Config>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sanitize_config(parsed))
}

#[cfg(test)]
mod tests {
    use super::{load_or_create_config, sanitize_config, Config, FilterConfig, ResolverConfig};

    #[test]
    fn test_empty_config_uses_defaults() {
        let parsed: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(parsed, Config::default());
        assert!(parsed.filter.filter_invalid);
        assert_eq!(parsed.resolver.cooldown_ms, 3000);
        assert_eq!(parsed.resolver.ignored_types, vec!["VG".to_string()]);
        assert_eq!(parsed.cache.failure_ttl_days, 7);
    }

    #[test]
    fn test_filter_section_parses_optional_predicates() {
        let parsed: Config = toml::from_str(
            r#"
            [filter]
            min_score = 6.5
            min_votes = 1000
            reject_genres = ["Horror"]
            accept_languages = ["english"]
            filter_invalid = false
            "#,
        )
        .expect("filter config should parse");
        assert_eq!(parsed.filter.min_score, Some(6.5));
        assert_eq!(parsed.filter.min_votes, Some(1000));
        assert_eq!(parsed.filter.min_year, None);
        assert!(!parsed.filter.filter_invalid);

        let sanitized = sanitize_config(parsed);
        assert!(sanitized
            .filter
            .reject_genres
            .as_ref()
            .is_some_and(|genres| genres.contains("horror")));
    }

    #[test]
    fn test_sanitize_config_clamps_ratios() {
        let input = Config {
            resolver: ResolverConfig {
                min_match: 1.7,
                aka_weight: -0.2,
                unpopular_weight: f64::NAN,
                base_url: "http://mirror.test/ ".to_string(),
                ..ResolverConfig::default()
            },
            filter: FilterConfig::default(),
            ..Config::default()
        };

        let sanitized = sanitize_config(input);
        assert_eq!(sanitized.resolver.min_match, 1.0);
        assert_eq!(sanitized.resolver.aka_weight, 0.0);
        assert_eq!(sanitized.resolver.unpopular_weight, 0.0);
        assert_eq!(sanitized.resolver.base_url, "http://mirror.test");
        assert_eq!(sanitized.resolver.ignored_types, vec!["vg".to_string()]);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let serialized =
            toml::to_string(&Config::default()).expect("default config should serialize");
        let parsed: Config = toml::from_str(&serialized).expect("default config should parse");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_load_or_create_config_writes_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");
        let loaded = load_or_create_config(&path).expect("config should load");
        assert!(path.exists());
        assert_eq!(loaded, sanitize_config(Config::default()));
    }
}

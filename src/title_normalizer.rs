//! Turns release-style titles into a search phrase plus an optional year hint.

use std::collections::HashSet;

use log::debug;
use regex::Regex;

use crate::config::ResolverConfig;
use crate::error::LookupError;
use crate::model::NormalizedQuery;

const MIN_YEAR_HINT: i32 = 1930;
const MAX_YEAR_HINT: i32 = 2050;

pub struct TitleNormalizer {
    noise_patterns: Vec<Regex>,
    cutoff_keywords: HashSet<String>,
}

impl TitleNormalizer {
    pub fn new(noise_words: &[String], cutoff_keywords: &[String]) -> Self {
        let noise_patterns = noise_words
            .iter()
            .filter(|word| !word.trim().is_empty())
            .filter_map(|word| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word.trim()))).ok()
            })
            .collect();
        let cutoff_keywords = cutoff_keywords
            .iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self {
            noise_patterns,
            cutoff_keywords,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(&config.noise_words, &config.cutoff_keywords)
    }

    fn collapse_whitespace(value: &str) -> String {
        value.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn year_token(token: &str) -> Option<i32> {
        if token.len() != 4 || !token.chars().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        token
            .parse::<i32>()
            .ok()
            .filter(|year| (MIN_YEAR_HINT..=MAX_YEAR_HINT).contains(year))
    }

    fn looks_like_group_marker(token: &str) -> bool {
        token.chars().count() > 3
            && token
                .chars()
                .all(|ch| ch.is_alphabetic() && ch.is_uppercase())
    }

    fn clean(&self, raw: &str) -> String {
        let mut cleaned: String = raw
            .chars()
            .map(|ch| match ch {
                '[' | ']' | '_' => ' ',
                other => other,
            })
            .collect();
        if !cleaned.contains(' ') {
            cleaned = cleaned.replace('.', " ");
        }
        if !cleaned.contains(' ') {
            cleaned = cleaned.replace('-', " ");
        }
        for pattern in &self.noise_patterns {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        Self::collapse_whitespace(&cleaned)
    }

    /// Cuts the title at the earliest year, group marker, or cutoff keyword.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedQuery, LookupError> {
        let cleaned = self.clean(raw);
        let tokens: Vec<&str> = cleaned.split(' ').filter(|token| !token.is_empty()).collect();

        let mut year_hint = None;
        let mut cut_index = tokens.len();
        for (index, token) in tokens.iter().enumerate() {
            let mut is_cut = false;
            if let Some(year) = Self::year_token(token) {
                // Later years win so "Title 2049 2017" hints 2017.
                year_hint = Some(year);
                is_cut = true;
            }
            if Self::looks_like_group_marker(token)
                || self.cutoff_keywords.contains(&token.to_lowercase())
            {
                is_cut = true;
            }
            if is_cut && index < cut_index {
                cut_index = index;
            }
        }

        let text = tokens[..cut_index].join(" ");
        if text.is_empty() {
            return Err(LookupError::UnparseableTitle {
                title: raw.to_string(),
            });
        }
        debug!("Normalized '{}' to '{}' (year {:?})", raw, text, year_hint);
        Ok(NormalizedQuery { text, year_hint })
    }
}

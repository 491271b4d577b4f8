//! Data shared between the resolution pipeline, the cache, and the item stream.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::{ErrorKind, LookupError};

pub const ATTR_SCORE: &str = "score";
pub const ATTR_VOTES: &str = "votes";
pub const ATTR_YEAR: &str = "year";
pub const ATTR_GENRES: &str = "genres";
pub const ATTR_LANGUAGES: &str = "languages";

/// Search phrase derived from a raw title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub text: String,
    pub year_hint: Option<i32>,
}

/// One search hit scored against the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub reference: String,
    /// Similarity against the query, always within `[0, 1]`.
    pub score: f64,
    pub year: Option<i32>,
    /// Provider annotation such as `VG` or `TV`.
    pub kind: Option<String>,
}

/// Structured metadata extracted for one reference.
///
/// Missing fields keep neutral defaults so filter predicates degrade safely.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct MetadataRecord {
    pub name: Option<String>,
    pub genres: BTreeSet<String>,
    /// Unique, in order of first appearance.
    pub languages: Vec<String>,
    pub score: f64,
    pub votes: u64,
    pub year: i32,
    pub plot_outline: Option<String>,
}

impl MetadataRecord {
    /// Builds a record from attributes the item already carried.
    pub fn from_preparsed(attributes: &PreparsedAttributes) -> Self {
        let mut record = Self {
            score: attributes.score.unwrap_or_default(),
            votes: attributes.votes.unwrap_or_default(),
            year: attributes.year.unwrap_or_default(),
            genres: attributes.genres.iter().flatten().cloned().collect(),
            ..Self::default()
        };
        for language in attributes.languages.iter().flatten() {
            record.push_language(language);
        }
        record
    }

    /// Appends a language unless it is already present.
    pub fn push_language(&mut self, language: &str) {
        let language = language.trim().to_lowercase();
        if language.is_empty() || self.languages.contains(&language) {
            return;
        }
        self.languages.push(language);
    }
}

/// Value held by the resolution cache.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
    /// Reference a title resolved to.
    Reference(String),
    /// Parsed metadata for a reference.
    Metadata(MetadataRecord),
    /// Searched or processed before without a usable result.
    Failure,
}

/// Typed view of the pre-parsed metadata an item may already carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparsedAttributes {
    pub score: Option<f64>,
    pub votes: Option<u64>,
    pub year: Option<i32>,
    pub genres: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
}

impl PreparsedAttributes {
    /// Reads pre-parsed values out of an item's attribute bag.
    ///
    /// `null` counts as absent. Any other value of the wrong primitive type is a
    /// schema error.
    pub fn from_attributes(attributes: &Map<String, Value>) -> Result<Self, LookupError> {
        let present = |key: &str| attributes.get(key).filter(|value| !value.is_null());

        let score = match present(ATTR_SCORE) {
            None => None,
            Some(value) => Some(value.as_f64().ok_or(LookupError::SchemaField {
                field: ATTR_SCORE,
                expected: "a number",
            })?),
        };
        let votes = match present(ATTR_VOTES) {
            None => None,
            Some(value) => Some(value.as_u64().ok_or(LookupError::SchemaField {
                field: ATTR_VOTES,
                expected: "a non-negative integer",
            })?),
        };
        let year = match present(ATTR_YEAR) {
            None => None,
            Some(value) => Some(
                value
                    .as_i64()
                    .and_then(|year| i32::try_from(year).ok())
                    .ok_or(LookupError::SchemaField {
                        field: ATTR_YEAR,
                        expected: "an integer year",
                    })?,
            ),
        };

        Ok(Self {
            score,
            votes,
            year,
            genres: Self::string_list(present(ATTR_GENRES), ATTR_GENRES)?,
            languages: Self::string_list(present(ATTR_LANGUAGES), ATTR_LANGUAGES)?,
        })
    }

    fn string_list(
        value: Option<&Value>,
        field: &'static str,
    ) -> Result<Option<Vec<String>>, LookupError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let schema_error = LookupError::SchemaField {
            field,
            expected: "a list of strings",
        };
        let Value::Array(items) = value else {
            return Err(schema_error);
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let Some(text) = item.as_str() else {
                return Err(schema_error);
            };
            values.push(text.trim().to_lowercase());
        }
        Ok(Some(values))
    }
}

/// Why an item was rejected.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RejectReason {
    MinScore { actual: f64, required: f64 },
    MinVotes { actual: u64, required: u64 },
    MinYear { actual: i32, required: i32 },
    RejectGenres { genre: String },
    RejectLanguages { language: String },
    AcceptLanguages { language: String },
    /// No reference could be determined for the title.
    UndeterminableReference,
    /// The reference failed processing before and is not retried.
    PoisonedReference,
    /// Lookup for this item failed.
    Lookup { kind: ErrorKind },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinScore { actual, required } => write!(f, "min_score ({actual} < {required})"),
            Self::MinVotes { actual, required } => write!(f, "min_votes ({actual} < {required})"),
            Self::MinYear { actual, required } => write!(f, "min_year ({actual} < {required})"),
            Self::RejectGenres { genre } => write!(f, "reject_genres ({genre})"),
            Self::RejectLanguages { language } => write!(f, "reject_languages ({language})"),
            Self::AcceptLanguages { language } => write!(f, "accept_languages ({language})"),
            Self::UndeterminableReference => f.write_str("undeterminable reference"),
            Self::PoisonedReference => f.write_str("previously failed reference"),
            Self::Lookup { kind } => write!(f, "lookup failed ({})", kind.as_str()),
        }
    }
}

/// Decision written back onto an item.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected { reasons: Vec<RejectReason> },
    /// Passed through unchecked because no reference could be determined and
    /// `filter_invalid` is off.
    Unverified,
}

impl Verdict {
    pub fn rejected(reason: RejectReason) -> Self {
        Self::Rejected {
            reasons: vec![reason],
        }
    }

    #[cfg(test)]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    #[cfg(test)]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// One entry of the item stream.
///
/// Collaborator-specific keys, including pre-parsed metadata, land in
/// `attributes`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Item {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_outline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Item {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        CacheValue, Item, MetadataRecord, PreparsedAttributes, RejectReason, Verdict, ATTR_VOTES,
    };
    use crate::error::LookupError;

    fn sample_record() -> MetadataRecord {
        MetadataRecord {
            name: Some("Sample Picture".to_string()),
            genres: ["drama".to_string(), "thriller".to_string()]
                .into_iter()
                .collect(),
            languages: vec!["english".to_string(), "french".to_string()],
            score: 7.4,
            votes: 125_000,
            year: 2011,
            plot_outline: Some("Someone goes somewhere.".to_string()),
        }
    }

    #[test]
    fn test_cached_metadata_record_reproduces_every_field() {
        let record = sample_record();
        let serialized = serde_json::to_string(&CacheValue::Metadata(record.clone()))
            .expect("record should serialize");
        let parsed: CacheValue =
            serde_json::from_str(&serialized).expect("record should deserialize");
        assert_eq!(parsed, CacheValue::Metadata(record));
    }

    #[test]
    fn test_cached_record_missing_fields_fall_back_to_neutral_values() {
        let parsed: CacheValue =
            serde_json::from_str(r#"{"kind":"metadata","value":{"votes":12}}"#)
                .expect("partial record should deserialize");
        let CacheValue::Metadata(record) = parsed else {
            panic!("expected metadata value");
        };
        assert_eq!(record.votes, 12);
        assert_eq!(record.score, 0.0);
        assert!(record.genres.is_empty());
        assert_eq!(record.name, None);
    }

    #[test]
    fn test_preparsed_attributes_reject_fractional_votes() {
        let item = Item::new("Sample").with_attribute(ATTR_VOTES, json!(12.5));
        let error = PreparsedAttributes::from_attributes(&item.attributes)
            .expect_err("fractional votes should be a schema error");
        assert!(matches!(
            error,
            LookupError::SchemaField { field: "votes", .. }
        ));
    }

    #[test]
    fn test_preparsed_attributes_treat_null_as_absent() {
        let item = Item::new("Sample")
            .with_attribute("score", json!(null))
            .with_attribute("genres", json!(["Drama", " Comedy "]));
        let parsed = PreparsedAttributes::from_attributes(&item.attributes)
            .expect("attributes should parse");
        assert_eq!(parsed.score, None);
        assert_eq!(
            parsed.genres,
            Some(vec!["drama".to_string(), "comedy".to_string()])
        );
    }

    #[test]
    fn test_record_from_preparsed_deduplicates_languages() {
        let attributes = PreparsedAttributes {
            languages: Some(vec![
                "english".to_string(),
                "german".to_string(),
                "english".to_string(),
            ]),
            votes: Some(40),
            ..PreparsedAttributes::default()
        };
        let record = MetadataRecord::from_preparsed(&attributes);
        assert_eq!(record.languages, vec!["english", "german"]);
        assert_eq!(record.votes, 40);
        assert_eq!(record.year, 0);
    }

    #[test]
    fn test_item_keeps_unknown_keys_in_attribute_bag() {
        let item: Item = serde_json::from_str(
            r#"{"title":"Sample.Movie.2010","url":"http://tracker.test/1","votes":10}"#,
        )
        .expect("item should deserialize");
        assert_eq!(item.title, "Sample.Movie.2010");
        assert_eq!(item.attributes.get("url"), Some(&json!("http://tracker.test/1")));
        assert_eq!(item.attributes.get("votes"), Some(&json!(10)));
    }

    #[test]
    fn test_reject_reason_display_reads_like_a_rule_tag() {
        let reason = RejectReason::MinVotes {
            actual: 10,
            required: 500,
        };
        assert_eq!(reason.to_string(), "min_votes (10 < 500)");
        assert!(Verdict::rejected(reason).is_rejected());
    }
}

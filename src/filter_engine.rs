//! Configured accept/reject rules over a [`MetadataRecord`].

use crate::config::FilterConfig;
use crate::model::{MetadataRecord, PreparsedAttributes, RejectReason, Verdict};

pub struct FilterDecisionEngine {
    config: FilterConfig,
}

impl FilterDecisionEngine {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Returns true when some configured rule needs a field the item does not
    /// already carry.
    pub fn required_from_lookup(&self, preparsed: &PreparsedAttributes) -> bool {
        let config = &self.config;
        (config.min_score.is_some() && preparsed.score.is_none())
            || (config.min_votes.is_some() && preparsed.votes.is_none())
            || (config.min_year.is_some() && preparsed.year.is_none())
            || (config.reject_genres.is_some() && preparsed.genres.is_none())
            || ((config.reject_languages.is_some() || config.accept_languages.is_some())
                && preparsed.languages.is_none())
    }

    /// Evaluates every configured rule and collects all failures.
    pub fn evaluate(&self, record: &MetadataRecord) -> Verdict {
        let config = &self.config;
        let mut reasons = Vec::new();

        if let Some(required) = config.min_score {
            if record.score < required {
                reasons.push(RejectReason::MinScore {
                    actual: record.score,
                    required,
                });
            }
        }
        if let Some(required) = config.min_votes {
            if record.votes < required {
                reasons.push(RejectReason::MinVotes {
                    actual: record.votes,
                    required,
                });
            }
        }
        if let Some(required) = config.min_year {
            if record.year < required {
                reasons.push(RejectReason::MinYear {
                    actual: record.year,
                    required,
                });
            }
        }
        if let Some(rejected) = &config.reject_genres {
            if let Some(genre) = record.genres.iter().find(|genre| rejected.contains(*genre)) {
                reasons.push(RejectReason::RejectGenres {
                    genre: genre.clone(),
                });
            }
        }
        if let Some(rejected) = &config.reject_languages {
            if let Some(language) = record
                .languages
                .iter()
                .find(|language| rejected.contains(*language))
            {
                reasons.push(RejectReason::RejectLanguages {
                    language: language.clone(),
                });
            }
        }
        if let Some(accepted) = &config.accept_languages {
            if let Some(language) = record
                .languages
                .iter()
                .find(|language| !accepted.contains(*language))
            {
                reasons.push(RejectReason::AcceptLanguages {
                    language: language.clone(),
                });
            }
        }

        if reasons.is_empty() {
            Verdict::Accepted
        } else {
            Verdict::Rejected { reasons }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::FilterDecisionEngine;
    use crate::config::FilterConfig;
    use crate::model::{MetadataRecord, PreparsedAttributes, RejectReason, Verdict};

    fn set(values: &[&str]) -> Option<BTreeSet<String>> {
        Some(values.iter().map(|value| value.to_string()).collect())
    }

    fn record_with_languages(languages: &[&str]) -> MetadataRecord {
        MetadataRecord {
            languages: languages.iter().map(|value| value.to_string()).collect(),
            ..MetadataRecord::default()
        }
    }

    #[test]
    fn test_accept_languages_requires_every_language_to_be_listed() {
        let engine = FilterDecisionEngine::new(FilterConfig {
            accept_languages: set(&["english"]),
            ..FilterConfig::default()
        });
        assert_eq!(
            engine.evaluate(&record_with_languages(&["english", "french"])),
            Verdict::rejected(RejectReason::AcceptLanguages {
                language: "french".to_string()
            })
        );
        assert!(engine
            .evaluate(&record_with_languages(&["english"]))
            .is_accepted());
    }

    #[test]
    fn test_reject_genres_matches_any_listed_genre() {
        let engine = FilterDecisionEngine::new(FilterConfig {
            reject_genres: set(&["horror"]),
            ..FilterConfig::default()
        });
        let record = MetadataRecord {
            genres: ["comedy".to_string(), "horror".to_string()]
                .into_iter()
                .collect(),
            ..MetadataRecord::default()
        };
        assert!(engine.evaluate(&record).is_rejected());
        assert!(engine.evaluate(&MetadataRecord::default()).is_accepted());
    }

    #[test]
    fn test_evaluate_collects_every_failing_rule() {
        let engine = FilterDecisionEngine::new(FilterConfig {
            min_score: Some(6.5),
            min_votes: Some(500),
            min_year: Some(2000),
            reject_languages: set(&["german"]),
            ..FilterConfig::default()
        });
        let record = MetadataRecord {
            score: 5.0,
            votes: 10,
            year: 1990,
            languages: vec!["german".to_string()],
            ..MetadataRecord::default()
        };
        let Verdict::Rejected { reasons } = engine.evaluate(&record) else {
            panic!("record should be rejected");
        };
        let rendered: Vec<String> = reasons.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "min_score (5 < 6.5)",
                "min_votes (10 < 500)",
                "min_year (1990 < 2000)",
                "reject_languages (german)",
            ]
        );
    }

    #[test]
    fn test_required_from_lookup_respects_preparsed_values() {
        let engine = FilterDecisionEngine::new(FilterConfig {
            min_votes: Some(100),
            accept_languages: set(&["english"]),
            ..FilterConfig::default()
        });
        assert!(engine.required_from_lookup(&PreparsedAttributes::default()));
        assert!(engine.required_from_lookup(&PreparsedAttributes {
            votes: Some(1_000),
            ..PreparsedAttributes::default()
        }));
        assert!(!engine.required_from_lookup(&PreparsedAttributes {
            votes: Some(1_000),
            languages: Some(vec!["english".to_string()]),
            ..PreparsedAttributes::default()
        }));
        assert!(!FilterDecisionEngine::new(FilterConfig::default())
            .required_from_lookup(&PreparsedAttributes::default()));
    }
}

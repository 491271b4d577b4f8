//! Ranked candidate search against a metadata provider.

use std::cmp::Ordering;

use log::debug;

use crate::config::ResolverConfig;
use crate::error::LookupError;
use crate::model::Candidate;
use crate::providers::{MetadataProvider, SearchLink, SearchResponse, SectionKind};

/// Scores search hits against a query and ranks them.
pub struct CandidateSearcher {
    aka_weight: f64,
    unpopular_weight: f64,
}

impl CandidateSearcher {
    pub fn new(aka_weight: f64, unpopular_weight: f64) -> Self {
        Self {
            aka_weight,
            unpopular_weight,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.aka_weight, config.unpopular_weight)
    }

    fn compact_text(value: &str) -> String {
        value
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect()
    }

    /// Edit similarity in `[0, 1]` that ignores whitespace and case.
    pub fn similarity(left: &str, right: &str) -> f64 {
        let ratio = strsim::normalized_levenshtein(
            &Self::compact_text(left),
            &Self::compact_text(right),
        );
        if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn score_link(&self, query: &str, link: &SearchLink, section: SectionKind) -> f64 {
        let mut ratio = Self::similarity(&link.name, query);
        for aka in &link.akas {
            let aka_ratio = Self::similarity(aka, query) * self.aka_weight;
            if aka_ratio > ratio {
                debug!("- aka {} has better ratio {:.3}", aka, aka_ratio);
                ratio = aka_ratio;
            }
        }
        if section != SectionKind::Popular {
            ratio *= self.unpopular_weight;
        }
        ratio.clamp(0.0, 1.0)
    }

    /// Turns a provider response into candidates sorted by descending score.
    pub fn rank(&self, query: &str, response: SearchResponse) -> Vec<Candidate> {
        let sections = match response {
            SearchResponse::Redirect { reference } => {
                return vec![Candidate {
                    name: query.to_string(),
                    reference,
                    score: 1.0,
                    year: None,
                    kind: None,
                }];
            }
            SearchResponse::Sections(sections) => sections,
        };

        let mut candidates = Vec::new();
        for section in sections {
            for link in section.links {
                let score = self.score_link(query, &link, section.kind);
                debug!(
                    "Candidate {} ({}) scored {:.3} in {:?}",
                    link.name, link.reference, score, section.kind
                );
                candidates.push(Candidate {
                    name: link.name,
                    reference: link.reference,
                    score,
                    year: link.year,
                    kind: link.kind,
                });
            }
        }
        sort_by_score_desc(&mut candidates);
        candidates
    }

    pub fn search(
        &self,
        provider: &dyn MetadataProvider,
        query: &str,
    ) -> Result<Vec<Candidate>, LookupError> {
        debug!("Searching: {}", query);
        let response = provider.search(query)?;
        Ok(self.rank(query, response))
    }
}

/// Stable sort, highest score first.
pub fn sort_by_score_desc(candidates: &mut [Candidate]) {
    candidates.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::CandidateSearcher;
    use crate::providers::{SearchLink, SearchResponse, SearchSection, SectionKind};

    fn link(name: &str, reference: &str, akas: &[&str]) -> SearchLink {
        SearchLink {
            name: name.to_string(),
            reference: reference.to_string(),
            year: None,
            kind: None,
            akas: akas.iter().map(|aka| aka.to_string()).collect(),
        }
    }

    fn searcher() -> CandidateSearcher {
        CandidateSearcher::new(0.9, 0.95)
    }

    #[test]
    fn test_similarity_ignores_whitespace_and_case() {
        assert_eq!(CandidateSearcher::similarity("The Matrix", "thematrix"), 1.0);
        let partial = CandidateSearcher::similarity("The Matrix", "The Matrix Reloaded");
        assert!(partial > 0.0 && partial < 1.0);
        assert_eq!(CandidateSearcher::similarity("", ""), 1.0);
    }

    #[test]
    fn test_rank_redirect_yields_single_perfect_candidate() {
        let candidates = searcher().rank(
            "Heat",
            SearchResponse::Redirect {
                reference: "http://www.imdb.com/title/tt0113277/".to_string(),
            },
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].score, 1.0);
        assert_eq!(candidates[0].year, None);
        assert_eq!(candidates[0].name, "Heat");
    }

    #[test]
    fn test_rank_discounts_sections_below_popular() {
        let candidates = searcher().rank(
            "Heat",
            SearchResponse::Sections(vec![
                SearchSection {
                    kind: SectionKind::Popular,
                    links: vec![link("Heat", "popular", &[])],
                },
                SearchSection {
                    kind: SectionKind::Exact,
                    links: vec![link("Heat", "exact", &[])],
                },
            ]),
        );
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].reference, "popular");
        assert_eq!(candidates[0].score, 1.0);
        assert!((candidates[1].score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_rank_uses_weighted_aka_when_it_beats_primary_name() {
        let candidates = searcher().rank(
            "Heat",
            SearchResponse::Sections(vec![SearchSection {
                kind: SectionKind::Popular,
                links: vec![link("Completely Different", "aka", &["Heat"])],
            }]),
        );
        assert!((candidates[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_rank_sorts_descending_and_keeps_tie_order() {
        let candidates = searcher().rank(
            "Heat",
            SearchResponse::Sections(vec![SearchSection {
                kind: SectionKind::Popular,
                links: vec![
                    link("Heater", "first-partial", &[]),
                    link("Heat", "exact", &[]),
                    link("Heater", "second-partial", &[]),
                ],
            }]),
        );
        let order: Vec<&str> = candidates
            .iter()
            .map(|candidate| candidate.reference.as_str())
            .collect();
        assert_eq!(order, vec!["exact", "first-partial", "second-partial"]);
        assert!(candidates
            .iter()
            .all(|candidate| (0.0..=1.0).contains(&candidate.score)));
    }
}

//! Picks at most one authoritative candidate from a ranked search.

use std::collections::HashSet;

use log::debug;

use crate::candidate_search::sort_by_score_desc;
use crate::config::ResolverConfig;
use crate::model::Candidate;

pub struct MatchSelector {
    min_match: f64,
    min_diff: f64,
    ignored_types: HashSet<String>,
}

impl MatchSelector {
    pub fn new(min_match: f64, min_diff: f64, ignored_types: &[String]) -> Self {
        Self {
            min_match,
            min_diff,
            ignored_types: ignored_types
                .iter()
                .map(|kind| kind.trim().to_lowercase())
                .filter(|kind| !kind.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.min_match, config.min_diff, &config.ignored_types)
    }

    fn keep_candidate(&self, candidate: &Candidate, year_hint: Option<i32>) -> bool {
        if let (Some(hint), Some(year)) = (year_hint, candidate.year) {
            if hint != year {
                debug!(
                    "best_match removing {} - {} (wrong year: {})",
                    candidate.name, candidate.reference, year
                );
                return false;
            }
        }
        if candidate.score < self.min_match {
            debug!("best_match removing {} (min_match)", candidate.name);
            return false;
        }
        if candidate
            .kind
            .as_ref()
            .is_some_and(|kind| self.ignored_types.contains(&kind.to_lowercase()))
        {
            debug!("best_match removing {} (ignored type)", candidate.name);
            return false;
        }
        true
    }

    /// Returns the single best candidate, or `None` when nothing qualifies or
    /// the top two are too close to call.
    ///
    /// Only the top two survivors are compared. Near-ties further down the
    /// list are never examined.
    pub fn select(&self, candidates: Vec<Candidate>, year_hint: Option<i32>) -> Option<Candidate> {
        let mut remaining: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| self.keep_candidate(candidate, year_hint))
            .collect();
        sort_by_score_desc(&mut remaining);

        match remaining.len() {
            0 => {
                debug!("no candidates remain");
                None
            }
            1 => {
                debug!("only one candidate remains");
                remaining.pop()
            }
            _ => {
                let diff = remaining[0].score - remaining[1].score;
                if diff < self.min_diff {
                    debug!("unable to determine correct candidate, min_diff too small");
                    for candidate in &remaining {
                        debug!(
                            "remain: {} (match: {:.3}) {}",
                            candidate.name, candidate.score, candidate.reference
                        );
                    }
                    return None;
                }
                remaining.into_iter().next()
            }
        }
    }
}

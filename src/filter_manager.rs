//! Batch runner that resolves, enriches, and filters items in stream order.

use std::collections::HashSet;

use log::{debug, error, info, warn};

use crate::candidate_search::CandidateSearcher;
use crate::config::Config;
use crate::error::LookupError;
use crate::filter_engine::FilterDecisionEngine;
use crate::match_selector::MatchSelector;
use crate::metadata_parser::MetadataParser;
use crate::model::{Item, MetadataRecord, PreparsedAttributes, RejectReason, Verdict};
use crate::providers::MetadataProvider;
use crate::request_pacer::RequestPacer;
use crate::resolution_cache::{CacheStore, RecordLookup, ResolutionCache, TitleLookup};
use crate::title_normalizer::TitleNormalizer;

/// Verdict counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: usize,
    pub unverified: usize,
}

impl BatchReport {
    fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Accepted => self.accepted += 1,
            Verdict::Rejected { .. } => self.rejected += 1,
            Verdict::Unverified => self.unverified += 1,
        }
    }
}

/// Suppresses repeated log lines within one batch.
#[derive(Debug, Default)]
struct LogOnce {
    seen: HashSet<String>,
}

impl LogOnce {
    fn info(&mut self, message: String) {
        if self.seen.insert(message.clone()) {
            info!("{}", message);
        }
    }

    fn reset(&mut self) {
        self.seen.clear();
    }
}

enum ReferenceOutcome {
    Resolved(String),
    /// The title is cached as a failure. Always rejected.
    KnownFailure,
    /// A fresh search produced no usable match.
    Undeterminable,
    /// No lookup is needed and the cache had nothing to offer.
    Skipped,
}

pub struct FilterManager<P: MetadataProvider> {
    provider: P,
    normalizer: TitleNormalizer,
    searcher: CandidateSearcher,
    selector: MatchSelector,
    parser: MetadataParser,
    engine: FilterDecisionEngine,
    pacer: RequestPacer,
    log_once: LogOnce,
}

impl<P: MetadataProvider> FilterManager<P> {
    pub fn new(provider: P, config: &Config) -> Result<Self, regex::Error> {
        Ok(Self {
            provider,
            normalizer: TitleNormalizer::from_config(&config.resolver),
            searcher: CandidateSearcher::from_config(&config.resolver),
            selector: MatchSelector::from_config(&config.resolver),
            parser: MetadataParser::new()?,
            engine: FilterDecisionEngine::new(config.filter.clone()),
            pacer: RequestPacer::from_config(&config.resolver),
            log_once: LogOnce::default(),
        })
    }

    #[cfg(test)]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Processes every item in order and writes the verdict onto it.
    ///
    /// Per-item failures become rejections. A schema error in pre-parsed
    /// attributes aborts the batch.
    pub fn run_batch(
        &mut self,
        items: &mut [Item],
        store: &mut dyn CacheStore,
    ) -> Result<BatchReport, LookupError> {
        let mut cache = ResolutionCache::new(store);
        let mut report = BatchReport::default();
        self.log_once.reset();

        for item in items.iter_mut() {
            let verdict = match self.process_item(item, &mut cache) {
                Ok(verdict) => verdict,
                Err(error) if error.is_batch_fatal() => {
                    error!("Aborting batch at '{}': {}", item.title, error);
                    return Err(error);
                }
                Err(error) => {
                    error!("Failed to process '{}': {}", item.title, error);
                    Verdict::rejected(RejectReason::Lookup { kind: error.kind() })
                }
            };
            report.record(&verdict);
            item.verdict = Some(verdict);
        }

        Ok(report)
    }

    fn process_item(
        &mut self,
        item: &mut Item,
        cache: &mut ResolutionCache<'_>,
    ) -> Result<Verdict, LookupError> {
        let preparsed = PreparsedAttributes::from_attributes(&item.attributes)?;

        if let Some(raw) = item.reference.take() {
            match self.provider.canonical_reference(&raw) {
                Some(reference) => item.reference = Some(reference),
                None => warn!("Ignoring invalid reference {} for '{}'", raw, item.title),
            }
        }

        let required = self.engine.required_from_lookup(&preparsed);
        if item.reference.is_none() {
            match self.resolve_reference(&item.title, required, cache)? {
                ReferenceOutcome::Resolved(reference) => item.reference = Some(reference),
                ReferenceOutcome::KnownFailure => {
                    let reason = RejectReason::UndeterminableReference;
                    self.log_once
                        .info(format!("Filtering '{}' because of {}", item.title, reason));
                    return Ok(Verdict::rejected(reason));
                }
                ReferenceOutcome::Undeterminable => return Ok(self.undeterminable(item)),
                ReferenceOutcome::Skipped => {}
            }
        }

        let record = match (&item.reference, required) {
            (Some(reference), true) => match self.lookup_record(reference, cache)? {
                Some(record) => record,
                None => {
                    let reason = RejectReason::PoisonedReference;
                    self.log_once
                        .info(format!("Filtering '{}' because of {}", item.title, reason));
                    return Ok(Verdict::rejected(reason));
                }
            },
            _ => {
                debug!("No lookup required for '{}'", item.title);
                MetadataRecord::from_preparsed(&preparsed)
            }
        };

        let verdict = self.engine.evaluate(&record);
        match &verdict {
            Verdict::Rejected { reasons } => {
                let rules: Vec<String> = reasons.iter().map(ToString::to_string).collect();
                self.log_once.info(format!(
                    "Filtering '{}' because of rule(s) {}",
                    item.title,
                    rules.join(", ")
                ));
            }
            _ => debug!("Accepting '{}'", item.title),
        }

        if record.name.is_some() {
            item.display_name = record.name;
        }
        if record.plot_outline.is_some() {
            item.plot_outline = record.plot_outline;
        }
        Ok(verdict)
    }

    fn resolve_reference(
        &self,
        title: &str,
        required: bool,
        cache: &mut ResolutionCache<'_>,
    ) -> Result<ReferenceOutcome, LookupError> {
        let query = match self.normalizer.normalize(title) {
            Ok(query) => query,
            Err(error) if required => return Err(error),
            Err(error) => {
                debug!("Skipping title resolution: {}", error);
                return Ok(ReferenceOutcome::Skipped);
            }
        };

        match cache.title(&query) {
            TitleLookup::Resolved(reference) => {
                debug!("Cached reference for '{}': {}", query.text, reference);
                return Ok(ReferenceOutcome::Resolved(reference));
            }
            TitleLookup::Failed => {
                debug!("Title '{}' failed before, not searching again", query.text);
                return Ok(ReferenceOutcome::KnownFailure);
            }
            TitleLookup::Unknown if !required => return Ok(ReferenceOutcome::Skipped),
            TitleLookup::Unknown => {}
        }

        let candidates = self
            .pacer
            .run(|| self.searcher.search(&self.provider, &query.text))?;
        match self.selector.select(candidates, query.year_hint) {
            Some(candidate) => {
                debug!(
                    "Resolved '{}' to {} ({:.3})",
                    query.text, candidate.reference, candidate.score
                );
                cache.remember_title(&query, &candidate.reference);
                Ok(ReferenceOutcome::Resolved(candidate.reference))
            }
            None => {
                cache.remember_title_failure(&query);
                Ok(ReferenceOutcome::Undeterminable)
            }
        }
    }

    /// Returns `None` when the reference is poisoned.
    fn lookup_record(
        &self,
        reference: &str,
        cache: &mut ResolutionCache<'_>,
    ) -> Result<Option<MetadataRecord>, LookupError> {
        match cache.record(reference) {
            RecordLookup::Cached(record) => return Ok(Some(record)),
            RecordLookup::Poisoned => return Ok(None),
            RecordLookup::Unknown => {}
        }

        match self
            .pacer
            .run(|| self.parser.fetch_record(&self.provider, reference))
        {
            Ok(record) => {
                cache.remember_record(reference, &record);
                Ok(Some(record))
            }
            Err(error @ LookupError::Encoding { .. }) => {
                cache.poison_reference(reference);
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    fn undeterminable(&mut self, item: &Item) -> Verdict {
        if !self.engine.config().filter_invalid {
            debug!("Passing '{}' through unverified", item.title);
            return Verdict::Unverified;
        }
        let reason = RejectReason::UndeterminableReference;
        self.log_once
            .info(format!("Filtering '{}' because of {}", item.title, reason));
        Verdict::rejected(reason)
    }
}

//! Turns a provider title document into a [`MetadataRecord`].

use log::{debug, warn};
use regex::Regex;

use crate::error::LookupError;
use crate::model::MetadataRecord;
use crate::providers::{LinkCategory, MetadataProvider, TitleDocument};

pub struct MetadataParser {
    votes_pattern: Regex,
    score_pattern: Regex,
    plot_label_pattern: Regex,
}

impl MetadataParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            votes_pattern: Regex::new(r"(?i)(\d[\d,.\s]*)\s+votes\b")?,
            score_pattern: Regex::new(r"(\d+\.\d+)\s*/\s*10\b")?,
            plot_label_pattern: Regex::new(r"(?i)^plot.*:$")?,
        })
    }

    /// Fetches and parses the document behind `reference`.
    pub fn fetch_record(
        &self,
        provider: &dyn MetadataProvider,
        reference: &str,
    ) -> Result<MetadataRecord, LookupError> {
        debug!("Fetching metadata for {}", reference);
        let document = provider.fetch(reference)?;
        self.parse(reference, &document)
    }

    pub fn parse(
        &self,
        reference: &str,
        document: &TitleDocument,
    ) -> Result<MetadataRecord, LookupError> {
        if document.is_empty() {
            return Err(LookupError::UnexpectedParse {
                reference: reference.to_string(),
                message: "document has no recognizable structure".to_string(),
            });
        }

        let mut record = MetadataRecord {
            name: document.heading.clone(),
            ..MetadataRecord::default()
        };
        if record.name.is_none() {
            warn!("Unable to get name for {}", reference);
        }

        match self.parse_votes(reference, document)? {
            Some(votes) => record.votes = votes,
            None => warn!("Unable to get votes for {}", reference),
        }
        match self.parse_score(reference, document)? {
            Some(score) => record.score = score,
            None => warn!("Unable to get score for {}", reference),
        }

        record.genres = document
            .links_of(LinkCategory::Genre)
            .map(|genre| genre.trim().to_lowercase())
            .filter(|genre| !genre.is_empty())
            .collect();
        if record.genres.is_empty() {
            warn!("Unable to get genres for {}", reference);
        }

        for language in document.links_of(LinkCategory::Language) {
            record.push_language(language);
        }
        if record.languages.is_empty() {
            warn!("Unable to get languages for {}", reference);
        }

        match document.links_of(LinkCategory::Year).next() {
            Some(text) => {
                record.year = text.trim().parse::<i32>().map_err(|_| {
                    LookupError::UnexpectedParse {
                        reference: reference.to_string(),
                        message: format!("year link '{text}' is not a number"),
                    }
                })?;
            }
            None => warn!("Unable to get year for {}", reference),
        }

        record.plot_outline = document
            .sections
            .iter()
            .find(|section| self.plot_label_pattern.is_match(section.label.trim()))
            .map(|section| section.text.trim().to_string())
            .filter(|text| !text.is_empty());

        debug!(
            "Parsed {}: score={} votes={} year={} genres={:?} languages={:?}",
            reference, record.score, record.votes, record.year, record.genres, record.languages
        );
        Ok(record)
    }

    fn parse_votes(
        &self,
        reference: &str,
        document: &TitleDocument,
    ) -> Result<Option<u64>, LookupError> {
        let Some(raw) = document.highlights.iter().find_map(|text| {
            self.votes_pattern
                .captures(text)
                .and_then(|captures| captures.get(1))
                .map(|found| found.as_str().to_string())
        }) else {
            return Ok(None);
        };
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        digits
            .parse::<u64>()
            .map(Some)
            .map_err(|error| LookupError::UnexpectedParse {
                reference: reference.to_string(),
                message: format!("vote count '{raw}' is invalid: {error}"),
            })
    }

    fn parse_score(
        &self,
        reference: &str,
        document: &TitleDocument,
    ) -> Result<Option<f64>, LookupError> {
        let Some(raw) = document.highlights.iter().find_map(|text| {
            self.score_pattern
                .captures(text)
                .and_then(|captures| captures.get(1))
                .map(|found| found.as_str().to_string())
        }) else {
            return Ok(None);
        };
        raw.parse::<f64>()
            .map(Some)
            .map_err(|error| LookupError::UnexpectedParse {
                reference: reference.to_string(),
                message: format!("score '{raw}' is invalid: {error}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::MetadataParser;
    use crate::error::ErrorKind;
    use crate::providers::{DocumentLink, LabeledSection, LinkCategory, TitleDocument};

    fn link(category: LinkCategory, text: &str) -> DocumentLink {
        DocumentLink {
            category,
            text: text.to_string(),
        }
    }

    fn full_document() -> TitleDocument {
        TitleDocument {
            heading: Some("Heat".to_string()),
            highlights: vec!["8.2/10".to_string(), "312,456 votes".to_string()],
            links: vec![
                link(LinkCategory::Year, "1995"),
                link(LinkCategory::Genre, "Crime"),
                link(LinkCategory::Genre, "Drama"),
                link(LinkCategory::Language, "English"),
                link(LinkCategory::Language, "Spanish"),
                link(LinkCategory::Language, "english"),
            ],
            sections: vec![
                LabeledSection {
                    label: "Director:".to_string(),
                    text: "Michael Mann".to_string(),
                },
                LabeledSection {
                    label: "Plot Outline:".to_string(),
                    text: "Bank robbers feel the heat.".to_string(),
                },
            ],
        }
    }

    fn parser() -> MetadataParser {
        MetadataParser::new().expect("patterns should compile")
    }

    #[test]
    fn test_parse_reads_every_field() {
        let record = parser()
            .parse("ref", &full_document())
            .expect("document should parse");
        assert_eq!(record.name.as_deref(), Some("Heat"));
        assert_eq!(record.votes, 312_456);
        assert_eq!(record.score, 8.2);
        assert_eq!(record.year, 1995);
        assert!(record.genres.contains("crime") && record.genres.contains("drama"));
        assert_eq!(record.languages, vec!["english", "spanish"]);
        assert_eq!(
            record.plot_outline.as_deref(),
            Some("Bank robbers feel the heat.")
        );
    }

    #[test]
    fn test_parse_missing_fields_keep_defaults() {
        let document = TitleDocument {
            heading: Some("Obscure".to_string()),
            ..TitleDocument::default()
        };
        let record = parser()
            .parse("ref", &document)
            .expect("missing fields are not fatal");
        assert_eq!(record.votes, 0);
        assert_eq!(record.score, 0.0);
        assert_eq!(record.year, 0);
        assert!(record.genres.is_empty());
        assert_eq!(record.plot_outline, None);
    }

    #[test]
    fn test_parse_non_numeric_year_is_unexpected() {
        let mut document = full_document();
        document.links[0] = link(LinkCategory::Year, "unknown");
        let error = parser()
            .parse("ref", &document)
            .expect_err("bad year should fail");
        assert_eq!(error.kind(), ErrorKind::UnexpectedParse);
    }

    #[test]
    fn test_parse_overflowing_votes_is_unexpected() {
        let mut document = full_document();
        document.highlights[1] = "99999999999999999999999 votes".to_string();
        let error = parser()
            .parse("ref", &document)
            .expect_err("overflowing votes should fail");
        assert_eq!(error.kind(), ErrorKind::UnexpectedParse);
    }

    #[test]
    fn test_parse_empty_document_is_unexpected() {
        let error = parser()
            .parse("ref", &TitleDocument::default())
            .expect_err("empty document should fail");
        assert_eq!(error.kind(), ErrorKind::UnexpectedParse);
    }
}

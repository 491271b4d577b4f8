//! Metadata provider abstractions and concrete implementations.
//!
//! The resolution core only sees the structured payloads defined here. Markup
//! knowledge stays inside the adapters.

pub mod imdb;

use crate::error::LookupError;

/// Result group in a search response, in descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionKind {
    Popular,
    Exact,
    Partial,
    Approximate,
}

/// One titled link inside a search section.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchLink {
    pub name: String,
    pub reference: String,
    pub year: Option<i32>,
    pub kind: Option<String>,
    /// Alternate names listed next to the link.
    pub akas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSection {
    pub kind: SectionKind,
    pub links: Vec<SearchLink>,
}

/// Search payload returned by provider adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResponse {
    /// The provider sent the query straight to a single resource.
    Redirect { reference: String },
    /// Ranked result sections, highest priority first.
    Sections(Vec<SearchSection>),
}

/// Category of a link found on a title document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCategory {
    Genre,
    Language,
    Year,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLink {
    pub category: LinkCategory,
    pub text: String,
}

/// Free text that follows a label such as `Plot Outline:`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSection {
    pub label: String,
    pub text: String,
}

/// Structured view of a title page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleDocument {
    pub heading: Option<String>,
    /// Emphasized text fragments, where ratings and vote counts live.
    pub highlights: Vec<String>,
    pub links: Vec<DocumentLink>,
    pub sections: Vec<LabeledSection>,
}

impl TitleDocument {
    pub fn is_empty(&self) -> bool {
        self.heading.is_none()
            && self.highlights.is_empty()
            && self.links.is_empty()
            && self.sections.is_empty()
    }

    pub fn links_of(&self, category: LinkCategory) -> impl Iterator<Item = &str> {
        self.links
            .iter()
            .filter(move |link| link.category == category)
            .map(|link| link.text.as_str())
    }
}

/// Interface implemented by concrete metadata sources.
pub trait MetadataProvider {
    fn search(&self, query: &str) -> Result<SearchResponse, LookupError>;
    fn fetch(&self, reference: &str) -> Result<TitleDocument, LookupError>;
    /// Returns the canonical form of a user-supplied reference, or `None` when
    /// it does not point at a title this provider can fetch.
    fn canonical_reference(&self, raw: &str) -> Option<String>;
}

//! IMDb-style HTML adapter backed by `ureq`.
//!
//! Page structure knowledge lives here. When the site layout changes, only
//! the patterns in this file need updating.

use std::io::Read;
use std::time::Duration;

use log::debug;
use regex::Regex;

use crate::config::ResolverConfig;
use crate::error::LookupError;
use crate::providers::{
    DocumentLink, LabeledSection, LinkCategory, MetadataProvider, SearchLink, SearchResponse,
    SearchSection, SectionKind, TitleDocument,
};

const SEARCH_SECTIONS: [(&str, SectionKind); 4] = [
    ("Popular Titles", SectionKind::Popular),
    ("Titles (Exact Matches)", SectionKind::Exact),
    ("Titles (Partial Matches)", SectionKind::Partial),
    ("Titles (Approx Matches)", SectionKind::Approximate),
];
const LATIN1_CHARSETS: [&str; 4] = ["iso-8859-1", "latin1", "latin-1", "windows-1252"];

struct PagePatterns {
    canonical_reference: Regex,
    title_path: Regex,
    section_header: Regex,
    title_link: Regex,
    annotation: Regex,
    aka: Regex,
    heading: Regex,
    highlight: Regex,
    anchor: Regex,
    category_href: Regex,
    labeled_section: Regex,
}

impl PagePatterns {
    /// Host part of `base_url`, e.g. `mirror.test:8080`.
    fn base_host(base_url: &str) -> &str {
        let without_scheme = base_url
            .split_once("://")
            .map_or(base_url, |(_, rest)| rest);
        without_scheme.split('/').next().unwrap_or_default()
    }

    fn compile(base_url: &str) -> Result<Self, regex::Error> {
        let host = Self::base_host(base_url);
        let hosts = if host.is_empty() {
            r"[a-z0-9.-]*imdb\.com".to_string()
        } else {
            format!(r"[a-z0-9.-]*imdb\.com|{}", regex::escape(host))
        };
        Ok(Self {
            canonical_reference: Regex::new(&format!(r"(?i)https?://(?:{hosts})/title/tt\d+"))?,
            title_path: Regex::new(r"/title/tt\d+")?,
            section_header: Regex::new(r"<b(?:\s[^>]*)?>([^<]+)</b>")?,
            title_link: Regex::new(r#"<a\s[^>]*href="(/title/tt\d+/)[^"]*"[^>]*>([^<]*)</a>"#)?,
            annotation: Regex::new(r"\(([^)]*)\)")?,
            aka: Regex::new(r#"<em>\s*(?:"|&quot;|&#34;)([^"<&]+)(?:"|&quot;|&#34;)\s*</em>"#)?,
            heading: Regex::new(r"<h1(?:\s[^>]*)?>\s*([^<]+)")?,
            highlight: Regex::new(r"<b(?:\s[^>]*)?>([^<]+)</b>")?,
            anchor: Regex::new(r"<a\s([^>]*)>([^<]*)</a>")?,
            category_href: Regex::new(r#"href="/Sections/(Genres|Languages|Years)/"#)?,
            labeled_section: Regex::new(r"<h5(?:\s[^>]*)?>([^<]*)</h5>\s*(?:<[^>]*>\s*)*([^<]+)")?,
        })
    }
}

/// Provider adapter for IMDb-style title search and title pages.
pub struct ImdbProvider {
    http_client: ureq::Agent,
    base_url: String,
    user_agent: String,
    patterns: PagePatterns,
}

impl ImdbProvider {
    pub fn new(config: &ResolverConfig) -> Result<Self, regex::Error> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let patterns = PagePatterns::compile(&base_url)?;
        Ok(Self {
            http_client,
            base_url,
            user_agent: config.user_agent.clone(),
            patterns,
        })
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}/find?q={}&s=all",
            self.base_url,
            urlencoding::encode(query)
        )
    }

    fn describe_ureq_failure(error: &ureq::Error) -> String {
        match error {
            ureq::Error::Status(code, _) => format!("server responded with status {code}"),
            ureq::Error::Transport(transport) => format!("failed to reach server: {transport}"),
        }
    }

    fn decode_body(bytes: Vec<u8>, charset: &str, url: &str) -> Result<String, LookupError> {
        if LATIN1_CHARSETS
            .iter()
            .any(|latin1| charset.eq_ignore_ascii_case(latin1))
        {
            return Ok(bytes.into_iter().map(char::from).collect());
        }
        String::from_utf8(bytes).map_err(|error| LookupError::Encoding {
            reference: url.to_string(),
            message: format!("body is not valid {charset}: {error}"),
        })
    }

    /// Fetches `url`, returning the final URL after redirects and the decoded body.
    fn get_page(&self, url: &str) -> Result<(String, String), LookupError> {
        let response = self
            .http_client
            .get(url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|error| LookupError::Network {
                target: url.to_string(),
                message: Self::describe_ureq_failure(&error),
            })?;
        let final_url = response.get_url().to_string();
        let charset = response.charset().to_string();
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|error| LookupError::Network {
                target: url.to_string(),
                message: format!("Failed to read response: {error}"),
            })?;
        let body = Self::decode_body(bytes, &charset, url)?;
        Ok((final_url, body))
    }

    fn redirected_reference(&self, final_url: &str) -> Option<String> {
        let found = self.patterns.title_path.find(final_url)?;
        Some(format!("{}/", &final_url[..found.end()]))
    }

    fn parse_year(annotation: &str) -> Option<i32> {
        let digits: String = annotation.chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    fn parse_section_links(&self, chunk: &str) -> Vec<SearchLink> {
        let matches: Vec<regex::Captures> = self.patterns.title_link.captures_iter(chunk).collect();
        let mut links = Vec::new();
        for (index, captures) in matches.iter().enumerate() {
            let (Some(whole), Some(href), Some(text)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                continue;
            };
            let name = clean_text(text.as_str());
            if name.is_empty() {
                continue;
            }

            let tail_end = matches
                .get(index + 1)
                .and_then(|next| next.get(0))
                .map(|next| next.start())
                .unwrap_or(chunk.len());
            let tail = &chunk[whole.end()..tail_end];
            let annotation_text = tail.split('<').next().unwrap_or_default();
            let annotations: Vec<&str> = self
                .patterns
                .annotation
                .captures_iter(annotation_text)
                .filter_map(|found| found.get(1).map(|value| value.as_str()))
                .collect();
            let akas = self
                .patterns
                .aka
                .captures_iter(tail)
                .filter_map(|found| found.get(1).map(|value| clean_text(value.as_str())))
                .filter(|aka| !aka.is_empty())
                .collect();

            links.push(SearchLink {
                name,
                reference: format!("{}{}", self.base_url, href.as_str()),
                year: annotations.first().and_then(|value| Self::parse_year(value)),
                kind: annotations
                    .get(1)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty()),
                akas,
            });
        }
        links
    }

    /// Splits a search results page into its known sections, highest priority first.
    fn parse_search_page(&self, html: &str) -> Vec<SearchSection> {
        let headers: Vec<(usize, usize, SectionKind)> = self
            .patterns
            .section_header
            .captures_iter(html)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let label = clean_text(captures.get(1)?.as_str());
                SEARCH_SECTIONS
                    .iter()
                    .find(|(known, _)| *known == label)
                    .map(|(_, kind)| (whole.start(), whole.end(), *kind))
            })
            .collect();

        let mut sections: Vec<SearchSection> = Vec::new();
        for (index, (_, body_start, kind)) in headers.iter().enumerate() {
            if sections.iter().any(|section| section.kind == *kind) {
                continue;
            }
            let body_end = headers
                .get(index + 1)
                .map(|(next_start, _, _)| *next_start)
                .unwrap_or(html.len());
            let links = self.parse_section_links(&html[*body_start..body_end]);
            if links.is_empty() {
                debug!("Search section {:?} does not have links", kind);
            }
            sections.push(SearchSection { kind: *kind, links });
        }
        sections.sort_by_key(|section| section.kind);
        sections
    }

    fn parse_title_page(&self, html: &str) -> TitleDocument {
        let heading = self
            .patterns
            .heading
            .captures(html)
            .and_then(|captures| captures.get(1))
            .map(|value| clean_text(value.as_str()))
            .filter(|value| !value.is_empty());

        let highlights = self
            .patterns
            .highlight
            .captures_iter(html)
            .filter_map(|captures| captures.get(1).map(|value| clean_text(value.as_str())))
            .filter(|value| !value.is_empty())
            .collect();

        let mut links = Vec::new();
        for captures in self.patterns.anchor.captures_iter(html) {
            let (Some(attributes), Some(text)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            let Some(category) = self
                .patterns
                .category_href
                .captures(attributes.as_str())
                .and_then(|found| found.get(1))
                .and_then(|found| match found.as_str() {
                    "Genres" => Some(LinkCategory::Genre),
                    "Languages" => Some(LinkCategory::Language),
                    "Years" => Some(LinkCategory::Year),
                    _ => None,
                })
            else {
                continue;
            };
            // Genre links with script handlers are navigation, not the genre list.
            if category == LinkCategory::Genre && attributes.as_str().contains("onclick") {
                continue;
            }
            links.push(DocumentLink {
                category,
                text: clean_text(text.as_str()),
            });
        }

        let sections = self
            .patterns
            .labeled_section
            .captures_iter(html)
            .filter_map(|captures| {
                Some(LabeledSection {
                    label: clean_text(captures.get(1)?.as_str()),
                    text: clean_text(captures.get(2)?.as_str()),
                })
            })
            .collect();

        TitleDocument {
            heading,
            highlights,
            links,
            sections,
        }
    }
}

impl MetadataProvider for ImdbProvider {
    fn search(&self, query: &str) -> Result<SearchResponse, LookupError> {
        let url = self.search_url(query);
        debug!("Search query: {}", url);
        let (final_url, body) = self.get_page(&url)?;
        if let Some(reference) = self.redirected_reference(&final_url) {
            debug!("Perfect hit. Search got redirected to {}", reference);
            return Ok(SearchResponse::Redirect { reference });
        }
        Ok(SearchResponse::Sections(self.parse_search_page(&body)))
    }

    fn fetch(&self, reference: &str) -> Result<TitleDocument, LookupError> {
        let (_, body) = self.get_page(reference)?;
        Ok(self.parse_title_page(&body))
    }

    fn canonical_reference(&self, raw: &str) -> Option<String> {
        let found = self.patterns.canonical_reference.find(raw)?;
        Some(format!("{}/", found.as_str()))
    }
}

fn clean_text(value: &str) -> String {
    decode_entities(value)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(value: &str) -> String {
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(position) = rest.find('&') {
        decoded.push_str(&rest[..position]);
        let after = &rest[position + 1..];
        let entity = after.find(';').filter(|end| *end <= 8).and_then(|end| {
            let name = &after[..end];
            let ch = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => name
                    .strip_prefix("#x")
                    .or_else(|| name.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });
        match entity {
            Some((ch, end)) => {
                decoded.push(ch);
                rest = &after[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = after;
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

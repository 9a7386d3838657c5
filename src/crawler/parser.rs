//! Response body parsing
//!
//! This module turns raw response bodies into typed pages:
//! - Search result pages (`{"results": [...], "num_pages": N}`)
//! - Dockerfile detail pages (`{"contents": "..."}`)
//!
//! and cleans Dockerfile text into the plain form stored in the index.

use crate::storage::ImageRecord;
use serde::Deserialize;

/// Longest named or numeric entity (including `&` and `;`) considered for decoding
const MAX_ENTITY_LEN: usize = 40;

/// One page of search results
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResultsPage {
    pub results: Vec<SearchResult>,

    /// Total number of result pages for the query
    #[serde(default, rename = "num_pages", alias = "total_pages", alias = "totalPages")]
    pub num_pages: u32,

    #[serde(default)]
    pub num_results: Option<u64>,

    #[serde(default)]
    pub query: Option<String>,
}

/// One search hit
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(default, alias = "Description")]
    pub description: Option<String>,

    #[serde(default, alias = "IsOfficial")]
    pub is_official: bool,

    #[serde(default, alias = "IsTrusted", alias = "is_automated")]
    pub is_trusted: bool,

    #[serde(default, alias = "StarCount")]
    pub star_count: i64,
}

impl From<SearchResult> for ImageRecord {
    fn from(result: SearchResult) -> Self {
        ImageRecord {
            name: result.name,
            description: result.description.unwrap_or_default(),
            is_official: result.is_official,
            is_trusted: result.is_trusted,
            star_count: result.star_count,
        }
    }
}

/// Dockerfile detail page
#[derive(Debug, Clone, Deserialize)]
pub struct DockerfilePage {
    #[serde(default)]
    pub contents: Option<String>,
}

/// Parses a search results body
pub fn parse_search_page(body: &[u8]) -> Result<SearchResultsPage, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Parses a Dockerfile detail body
pub fn parse_dockerfile_page(body: &[u8]) -> Result<DockerfilePage, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Converts decorated Dockerfile text into the plain text stored in the index
///
/// HTML entities are decoded and surrounding whitespace is trimmed.
///
/// # Example
///
/// ```
/// use hub_indexer::crawler::clean_dockerfile;
///
/// assert_eq!(clean_dockerfile("  RUN a &amp;&amp; b\n"), "RUN a && b");
/// ```
pub fn clean_dockerfile(raw: &str) -> String {
    decode_entities(raw).trim().to_string()
}

/// Decodes HTML entities, leaving anything that is not a valid entity verbatim
///
/// Dockerfiles routinely contain bare `&&`, which a strict decoder rejects; in
/// that case entities are decoded one at a time.
pub fn decode_entities(text: &str) -> String {
    if let Ok(decoded) = htmlescape::decode_html(text) {
        return decoded;
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let semicolon = tail[1..]
            .char_indices()
            .take_while(|(i, c)| *i < MAX_ENTITY_LEN && !c.is_whitespace() && *c != '&')
            .find(|(_, c)| *c == ';')
            .map(|(i, _)| i + 1);

        match semicolon.and_then(|end| {
            htmlescape::decode_html(&tail[..=end])
                .ok()
                .map(|decoded| (decoded, end))
        }) {
            Some((decoded, end)) => {
                out.push_str(&decoded);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_page() {
        let body = br#"{
            "query": "ffmpeg",
            "num_pages": 3,
            "num_results": 25,
            "page_size": 10,
            "results": [
                {"name": "bfirsh/ffmpeg", "description": "ffmpeg in a box",
                 "is_official": false, "is_trusted": true, "star_count": 12},
                {"name": "jrottenberg/ffmpeg", "description": null}
            ]
        }"#;

        let page = parse_search_page(body).unwrap();
        assert_eq!(page.num_pages, 3);
        assert_eq!(page.num_results, Some(25));
        assert_eq!(page.results.len(), 2);

        let first: ImageRecord = page.results[0].clone().into();
        assert_eq!(first.name, "bfirsh/ffmpeg");
        assert_eq!(first.description, "ffmpeg in a box");
        assert!(first.is_trusted);
        assert_eq!(first.star_count, 12);

        let second: ImageRecord = page.results[1].clone().into();
        assert_eq!(second.description, "");
        assert!(!second.is_official);
    }

    #[test]
    fn test_parse_search_page_accepts_capitalised_fields() {
        let body = br#"{"results": [{"Name": "bfirsh/ffmpeg", "Description": "x"}], "totalPages": 2}"#;
        let page = parse_search_page(body).unwrap();
        assert_eq!(page.num_pages, 2);
        assert_eq!(page.results[0].name, "bfirsh/ffmpeg");
        assert_eq!(page.results[0].description.as_deref(), Some("x"));
    }

    #[test]
    fn test_parse_search_page_rejects_mismatched_schema() {
        assert!(parse_search_page(b"not json").is_err());
        assert!(parse_search_page(br#"{"detail": "Not found"}"#).is_err());
        assert!(parse_search_page(br#"{"results": [{"description": "no name"}]}"#).is_err());
    }

    #[test]
    fn test_parse_dockerfile_page() {
        let page = parse_dockerfile_page(br#"{"contents": "FROM ubuntu"}"#).unwrap();
        assert_eq!(page.contents.as_deref(), Some("FROM ubuntu"));

        let page = parse_dockerfile_page(br#"{"contents": null}"#).unwrap();
        assert_eq!(page.contents, None);

        assert!(parse_dockerfile_page(b"<html>").is_err());
    }

    #[test]
    fn test_clean_dockerfile_decodes_and_trims() {
        assert_eq!(clean_dockerfile("  FROM&nbsp;ubuntu\n"), "FROM\u{a0}ubuntu");
        assert_eq!(
            clean_dockerfile("RUN echo &quot;hi&quot; &gt; /tmp/x\n"),
            "RUN echo \"hi\" > /tmp/x"
        );
        assert_eq!(clean_dockerfile("\n\t  \n"), "");
    }

    #[test]
    fn test_decode_entities_keeps_bare_ampersands() {
        assert_eq!(
            decode_entities("RUN a && b &amp;&amp; c"),
            "RUN a && b && c"
        );
        assert_eq!(decode_entities("x &bogus; y &lt;"), "x &bogus; y <");
        assert_eq!(decode_entities("trailing &"), "trailing &");
        assert_eq!(decode_entities("&#65;&#x42; & C"), "AB & C");
    }
}

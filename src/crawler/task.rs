//! Crawl tasks and the endpoints they resolve against
//!
//! A task's identity is its fully-resolved URL: two tasks that would fetch the
//! same URL are the same task, whatever produced them.

use crate::config::EndpointsConfig;
use crate::ConfigError;
use std::fmt;
use url::Url;

/// What a task fetches and how its response is interpreted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// One page of search results for a keyword (pages start at 1)
    SearchPage { keyword: String, page: u32 },

    /// The Dockerfile of one image
    ImageDetail { image: String },
}

impl TaskKind {
    /// Short label used in logs and error messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::SearchPage { .. } => "search page",
            Self::ImageDetail { .. } => "image detail",
        }
    }
}

/// A unit of crawl work: one URL plus how to interpret its response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTask {
    kind: TaskKind,
    url: Url,
}

impl SearchTask {
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Dedup identity of this task
    pub fn identity(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for SearchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TaskKind::SearchPage { keyword, page } => {
                write!(f, "search '{}' page {}", keyword, page)
            }
            TaskKind::ImageDetail { image } => write!(f, "dockerfile of {}", image),
        }
    }
}

/// Page cap used unless configured otherwise
pub const DEFAULT_MAX_PAGES: u32 = 100;

/// Resolves tasks into request URLs
///
/// - search: `<search-url>?q=<keyword>&n=<page-size>` for page 1, with
///   `&page=<n>` appended for later pages
/// - detail: `<detail-url>/<image>/dockerfile/`
#[derive(Debug, Clone)]
pub struct Endpoints {
    search: Url,
    detail: Url,
    page_size: u32,
    max_pages: u32,
}

impl Endpoints {
    /// Creates endpoints from base URLs
    ///
    /// # Returns
    ///
    /// * `Ok(Endpoints)` - Both URLs parsed and can carry path segments
    /// * `Err(ConfigError)` - A URL is invalid
    pub fn new(search_url: &str, detail_url: &str, page_size: u32) -> Result<Self, ConfigError> {
        let search = Url::parse(search_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("search-url '{}': {}", search_url, e)))?;
        let detail = Url::parse(detail_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("detail-url '{}': {}", detail_url, e)))?;

        if detail.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(format!(
                "detail-url '{}' cannot carry a path",
                detail_url
            )));
        }

        Ok(Self {
            search,
            detail,
            page_size: page_size.max(1),
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    pub fn from_config(config: &EndpointsConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(&config.search_url, &config.detail_url, config.page_size)?
            .with_max_pages(config.max_pages))
    }

    /// Caps the number of search pages crawled per keyword
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Highest search page crawled per keyword
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Task for one page of search results; page numbers below 1 are clamped
    pub fn search_page(&self, keyword: &str, page: u32) -> SearchTask {
        let page = page.max(1);
        let mut url = self.search.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("q", keyword)
                .append_pair("n", &self.page_size.to_string());
            if page > 1 {
                query.append_pair("page", &page.to_string());
            }
        }

        SearchTask {
            kind: TaskKind::SearchPage {
                keyword: keyword.to_string(),
                page,
            },
            url,
        }
    }

    /// Task for the Dockerfile of `image`
    pub fn image_detail(&self, image: &str) -> SearchTask {
        let mut url = self.detail.clone();
        // `new` rejected bases that cannot carry path segments
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(image.split('/'))
                .push("dockerfile")
                .push("");
        }

        SearchTask {
            kind: TaskKind::ImageDetail {
                image: image.to_string(),
            },
            url,
        }
    }
}

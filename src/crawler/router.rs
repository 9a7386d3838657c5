//! Response router: from (task, body) to index writes and follow-up tasks
//!
//! Search pages produce image records, one detail task per image, and the
//! remaining pages of the same keyword. Detail pages produce Dockerfile
//! records. The router never touches the frontier; follow-ups are returned.

use crate::crawler::parser::{clean_dockerfile, parse_dockerfile_page, parse_search_page};
use crate::crawler::task::{Endpoints, SearchTask, TaskKind};
use crate::output::CrawlStats;
use crate::storage::{DockerfileRecord, ImageRecord, IndexStore, StorageError, DOCKERFILE_SUFFIX};
use crate::{FetchError, RouteError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// What routing one response produced
#[derive(Debug, Default)]
pub struct Routed {
    /// Tasks to feed back into the frontier
    pub follow_ups: Vec<SearchTask>,

    /// Image records committed to the index
    pub images_written: usize,

    /// Whether a Dockerfile record was committed
    pub dockerfile_written: bool,

    /// Set when the index rejected this response's writes
    pub persistence_failure: Option<StorageError>,
}

/// Search pages `first..=last` for `keyword`; page 1 is never included
pub fn expand_pages(endpoints: &Endpoints, keyword: &str, first: u32, last: u32) -> Vec<SearchTask> {
    (first.max(2)..=last)
        .map(|page| endpoints.search_page(keyword, page))
        .collect()
}

/// Classifies fetched responses and persists what they contain
pub struct Router {
    index: Arc<dyn IndexStore>,
    endpoints: Endpoints,
    stats: Arc<CrawlStats>,
    /// Highest search page already handed out, per keyword
    announced: Mutex<HashMap<String, u32>>,
}

impl Router {
    pub fn new(index: Arc<dyn IndexStore>, endpoints: Endpoints, stats: Arc<CrawlStats>) -> Self {
        Self {
            index,
            endpoints,
            stats,
            announced: Mutex::new(HashMap::new()),
        }
    }

    /// Frontier callback: routes a fetch outcome and returns follow-ups
    ///
    /// Every failure is logged, counted, and contained to this task.
    pub fn handle(&self, task: &SearchTask, response: Result<Vec<u8>, FetchError>) -> Vec<SearchTask> {
        let body = match response {
            Ok(body) => body,
            Err(e) => {
                if e.is_transient() {
                    self.stats.record_transient_failure();
                } else {
                    self.stats.record_malformed_response();
                }
                tracing::warn!("Skipping {}: {}", task, e);
                return Vec::new();
            }
        };

        match self.route(task, &body) {
            Ok(routed) => routed.follow_ups,
            Err(e) => {
                self.stats.record_malformed_response();
                tracing::warn!("{}", e);
                Vec::new()
            }
        }
    }

    /// Interprets `body` according to the task kind
    ///
    /// # Returns
    ///
    /// * `Ok(Routed)` - The body parsed; writes may still have failed, see
    ///   [`Routed::persistence_failure`]
    /// * `Err(RouteError)` - The body did not parse; nothing was written and
    ///   no follow-ups are produced
    pub fn route(&self, task: &SearchTask, body: &[u8]) -> Result<Routed, RouteError> {
        match task.kind() {
            TaskKind::SearchPage { keyword, page } => {
                self.route_search_page(task, keyword, *page, body)
            }
            TaskKind::ImageDetail { image } => self.route_image_detail(task, image, body),
        }
    }

    fn route_search_page(
        &self,
        task: &SearchTask,
        keyword: &str,
        page: u32,
        body: &[u8],
    ) -> Result<Routed, RouteError> {
        let results = parse_search_page(body).map_err(|source| RouteError::Malformed {
            kind: task.kind().label(),
            url: task.identity().to_string(),
            source,
        })?;
        self.stats.record_search_page();

        let images: Vec<ImageRecord> = results
            .results
            .into_iter()
            .filter(|result| {
                let usable = !result.name.is_empty() && !result.name.ends_with(DOCKERFILE_SUFFIX);
                if !usable {
                    tracing::warn!("Ignoring result with unusable name '{}' in {}", result.name, task);
                }
                usable
            })
            .map(ImageRecord::from)
            .collect();

        let mut routed = Routed::default();

        if !images.is_empty() {
            match self.index.put_images(&images) {
                Ok(written) => {
                    routed.images_written = written;
                    self.stats.record_images_indexed(written as u64);
                    // Details only for committed images, so a dockerfile
                    // never lands before its image
                    routed.follow_ups.extend(
                        images
                            .iter()
                            .map(|image| self.endpoints.image_detail(&image.name)),
                    );
                }
                Err(e) => {
                    self.stats.record_persistence_failure();
                    tracing::warn!("Failed to index {} images from {}: {}", images.len(), task, e);
                    routed.persistence_failure = Some(e);
                }
            }
        }

        routed
            .follow_ups
            .extend(self.announce_pages(task, keyword, results.num_pages));

        tracing::debug!(
            "Routed '{}' page {}/{}: {} images, {} follow-ups",
            keyword,
            page,
            results.num_pages,
            routed.images_written,
            routed.follow_ups.len()
        );

        Ok(routed)
    }

    /// Pages of `keyword` not yet handed out, capped at the endpoint limit
    ///
    /// Every page of a keyword reports the page count, so only the first
    /// report that raises the known count produces tasks.
    fn announce_pages(&self, task: &SearchTask, keyword: &str, num_pages: u32) -> Vec<SearchTask> {
        let limit = self.endpoints.max_pages();
        let last = num_pages.min(limit);

        let previous = {
            let mut announced = self.announced.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = announced.get(keyword).copied().unwrap_or(1);
            if last <= previous {
                return Vec::new();
            }
            announced.insert(keyword.to_string(), last);
            previous
        };

        if num_pages > limit {
            tracing::warn!(
                "{} reports {} pages, crawling only the first {}",
                task,
                num_pages,
                limit
            );
        }

        expand_pages(&self.endpoints, keyword, previous + 1, last)
    }

    fn route_image_detail(
        &self,
        task: &SearchTask,
        image: &str,
        body: &[u8],
    ) -> Result<Routed, RouteError> {
        let page = parse_dockerfile_page(body).map_err(|source| RouteError::Malformed {
            kind: task.kind().label(),
            url: task.identity().to_string(),
            source,
        })?;
        self.stats.record_detail_page();

        let contents = page
            .contents
            .as_deref()
            .map(clean_dockerfile)
            .unwrap_or_default();

        let mut routed = Routed::default();

        if contents.is_empty() {
            self.stats.record_empty_dockerfile();
            tracing::debug!("No dockerfile available for {}", image);
            return Ok(routed);
        }

        let record = DockerfileRecord {
            image_name: image.to_string(),
            contents,
        };

        match self.index.put_dockerfile(&record) {
            Ok(()) => {
                tracing::info!("indexing dockerfile {}", image);
                self.stats.record_dockerfile_indexed();
                routed.dockerfile_written = true;
            }
            Err(e) => {
                self.stats.record_persistence_failure();
                tracing::warn!("Failed to index dockerfile of {}: {}", image, e);
                routed.persistence_failure = Some(e);
            }
        }

        Ok(routed)
    }
}

use horreum_mirror_types::{DatasetSummary, LabelValueMap};
use std::collections::VecDeque;
use tracing::debug;

mod http;

pub use http::{DEFAULT_BASE_URL, HorreumClient, HorreumConfig, TlsVerification};

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response body from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Remote side of the mirror: paged dataset listings plus per-dataset label values.
pub trait DatasetSource {
    /// Fetches one listing page, newest datasets first.
    fn fetch_page(&self, test_id: i32, page: u32, limit: u32) -> SourceResult<Vec<DatasetSummary>>;

    fn fetch_label_values(&self, dataset_id: i32) -> SourceResult<LabelValueMap>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub test_id: i32,
    pub max_count: usize,
    pub start_page: u32,
    pub page_size: u32,
}

impl ListQuery {
    pub fn new(test_id: i32) -> Self {
        Self {
            test_id,
            max_count: 100,
            start_page: 1,
            page_size: 10,
        }
    }
}

/// Lazily walks the listing pages of one test.
///
/// A page is requested only once the previous one is drained, so stopping
/// early (by `max_count` or by dropping the cursor) never over-fetches. The
/// cursor ends after `max_count` items, after the first empty page, after
/// page `u32::MAX`, or after yielding the first error.
pub struct DatasetCursor<'a, S: DatasetSource + ?Sized> {
    source: &'a S,
    query: ListQuery,
    /// `None` once the last addressable page has been fetched.
    next_page: Option<u32>,
    buffered: VecDeque<DatasetSummary>,
    yielded: usize,
    finished: bool,
}

pub fn list_datasets<S: DatasetSource + ?Sized>(source: &S, query: ListQuery) -> DatasetCursor<'_, S> {
    let next_page = Some(query.start_page);
    DatasetCursor {
        source,
        query,
        next_page,
        buffered: VecDeque::new(),
        yielded: 0,
        finished: false,
    }
}

impl<S: DatasetSource + ?Sized> DatasetCursor<'_, S> {
    pub fn yielded(&self) -> usize {
        self.yielded
    }
}

impl<S: DatasetSource + ?Sized> Iterator for DatasetCursor<'_, S> {
    type Item = SourceResult<DatasetSummary>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if self.yielded >= self.query.max_count {
                debug!(
                    test_id = self.query.test_id,
                    count = self.yielded,
                    "No more datasets needed"
                );
                self.finished = true;
                return None;
            }
            if let Some(summary) = self.buffered.pop_front() {
                self.yielded += 1;
                return Some(Ok(summary));
            }

            let Some(page) = self.next_page else {
                self.finished = true;
                return None;
            };
            let datasets = match self
                .source
                .fetch_page(self.query.test_id, page, self.query.page_size)
            {
                Ok(datasets) => datasets,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            };
            debug!(
                test_id = self.query.test_id,
                page,
                limit = self.query.page_size,
                items = datasets.len(),
                "Loaded page of datasets"
            );
            if datasets.is_empty() {
                debug!(test_id = self.query.test_id, page, "Reached end of datasets");
                self.finished = true;
                return None;
            }
            self.buffered.extend(datasets);
            self.next_page = page.checked_add(1);
        }
    }
}

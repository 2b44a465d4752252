//! Link-following pagination
//!
//! A [`Paginator`] fetches one page at a time; [`paginate`] turns it into a
//! lazy stream that follows `next` links until the server stops sending one.

use crate::domain::{HarvestError, RawRecord, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::sync::Arc;

/// One page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Resource the page belongs to, for logs
    pub resource: String,

    /// Path relative to the server root, or an absolute `next` URL
    pub url: String,

    /// Query parameters; empty when following a `next` URL, which carries its own
    pub params: Vec<(String, String)>,

    pub allow_redirects: bool,

    /// Statuses that end pagination with an empty page instead of failing
    pub ignored_status_codes: Vec<u16>,
}

impl PageRequest {
    pub fn new(resource: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            url: url.into(),
            params: Vec::new(),
            allow_redirects: true,
            ignored_status_codes: Vec::new(),
        }
    }

    pub fn params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    pub fn ignored_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.ignored_status_codes = codes;
        self
    }

    /// Request for the page behind a `next` link
    pub fn follow(&self, next: String) -> Self {
        Self {
            resource: self.resource.clone(),
            url: next,
            params: Vec::new(),
            allow_redirects: self.allow_redirects,
            ignored_status_codes: self.ignored_status_codes.clone(),
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}

/// One page of results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub results: Vec<RawRecord>,
    pub next: Option<String>,
    pub count: Option<u64>,
}

impl Page {
    /// Final page without records, returned for ignored statuses
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Source of paginated records
#[async_trait]
pub trait Paginator: Send + Sync {
    /// Fetch a single page
    ///
    /// # Errors
    ///
    /// Returns `Transport` for network failures and unexpected statuses.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page>;

    /// Fetch the raw body behind `request`, e.g. an attachment file
    ///
    /// An ignored status yields an empty body.
    ///
    /// # Errors
    ///
    /// Returns `Transport` for network failures and unexpected statuses, and
    /// `Validation` for sources that only serve record pages.
    async fn fetch_bytes(&self, request: &PageRequest) -> Result<Vec<u8>> {
        Err(HarvestError::Validation(format!(
            "Resource '{}' needs a file download, which this source does not support",
            request.resource
        )))
    }
}

/// Stream every page starting at `first`, following `next` links
///
/// Stops at the first page without a `next` link, or when a page links to
/// itself.
pub fn paginate(
    paginator: Arc<dyn Paginator>,
    first: PageRequest,
) -> impl Stream<Item = Result<Page>> + Send {
    stream::try_unfold(Some(first), move |state| {
        let paginator = paginator.clone();
        async move {
            let Some(request) = state else {
                return Ok(None);
            };

            let page = paginator.fetch_page(&request).await?;
            let next = match page.next.clone() {
                Some(next) if next == request.url => {
                    tracing::warn!(
                        resource = %request.resource,
                        url = %next,
                        "Page links to itself, stopping pagination"
                    );
                    None
                }
                Some(next) => Some(request.follow(next)),
                None => None,
            };

            Ok(Some((page, next)))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct LinkedPages {
        pages: HashMap<String, Page>,
        requested: Mutex<Vec<PageRequest>>,
    }

    #[async_trait]
    impl Paginator for LinkedPages {
        async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
            self.requested.lock().await.push(request.clone());
            Ok(self.pages.get(&request.url).cloned().unwrap_or_default())
        }
    }

    fn page(uid: &str, next: Option<&str>) -> Page {
        Page {
            results: vec![json!({"uid": uid}).as_object().cloned().unwrap()],
            next: next.map(str::to_string),
            count: Some(3),
        }
    }

    #[tokio::test]
    async fn test_follows_next_links_until_exhausted() {
        let mut pages = HashMap::new();
        pages.insert("/api/v2/assets/".to_string(), page("a", Some("https://kf/p2")));
        pages.insert("https://kf/p2".to_string(), page("b", Some("https://kf/p3")));
        pages.insert("https://kf/p3".to_string(), page("c", None));
        let paginator = Arc::new(LinkedPages {
            pages,
            requested: Mutex::new(Vec::new()),
        });

        let first = PageRequest::new("kobo_asset", "/api/v2/assets/")
            .params(vec![("format".to_string(), "json".to_string())]);
        let collected: Vec<Page> = paginate(paginator.clone(), first)
            .try_collect()
            .await
            .unwrap();

        let uids: Vec<&str> = collected
            .iter()
            .map(|p| p.results[0]["uid"].as_str().unwrap())
            .collect();
        assert_eq!(uids, vec!["a", "b", "c"]);

        let requested = paginator.requested.lock().await;
        assert_eq!(requested.len(), 3);
        assert!(requested[1].params.is_empty());
        assert!(requested[1].is_absolute());
    }

    #[tokio::test]
    async fn test_self_link_stops() {
        let mut pages = HashMap::new();
        pages.insert("https://kf/p1".to_string(), page("a", Some("https://kf/p1")));
        let paginator = Arc::new(LinkedPages {
            pages,
            requested: Mutex::new(Vec::new()),
        });

        let collected: Vec<Page> = paginate(paginator, PageRequest::new("r", "https://kf/p1"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(collected.len(), 1);
    }
}

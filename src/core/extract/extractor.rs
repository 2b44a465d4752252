//! Resource extractor
//!
//! Pulls the records of one resource for one parent (or once for a root
//! resource), applies the cursor and record filters, and reports the largest
//! cursor value among the accepted records as the candidate watermark.
//!
//! Records come from a paginated endpoint, a list embedded in the parent, or
//! a CSV file downloaded from a URL the parent carries.

use super::query::cursor_params;
use crate::adapters::kobo::paginator::{paginate, PageRequest, Paginator};
use crate::core::state::{CursorStore, WatermarkKey};
use crate::core::transform::tabular::parse_csv;
use crate::core::transform::timestamps::{normalize_timestamps, parse_timestamp_value};
use crate::domain::{
    CursorScope, HarvestError, MissingPolicy, RawRecord, ResourceSource, ResourceSpec, Result,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Counters of one extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub pages: usize,
    pub fetched: usize,
    /// Rejected by the record filter
    pub filtered_out: usize,
    /// Cursor value strictly below the watermark
    pub below_watermark: usize,
    /// Accepted without a usable cursor value
    pub missing_cursor: usize,
    /// Downloaded files that could not be parsed and were skipped
    pub unreadable_files: usize,
}

impl ExtractionStats {
    pub fn add(&mut self, other: &ExtractionStats) {
        self.pages += other.pages;
        self.fetched += other.fetched;
        self.filtered_out += other.filtered_out;
        self.below_watermark += other.below_watermark;
        self.missing_cursor += other.missing_cursor;
        self.unreadable_files += other.unreadable_files;
    }
}

/// Accepted records plus the watermark advance they justify
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<RawRecord>,

    /// Records below the watermark that still feed the next level
    pub forwarded: Vec<RawRecord>,

    /// Watermark the records were filtered against
    pub watermark_key: Option<WatermarkKey>,
    pub watermark: Option<DateTime<Utc>>,

    /// Largest cursor value among the accepted records
    pub candidate: Option<DateTime<Utc>>,

    pub stats: ExtractionStats,
}

/// Extracts resources through a [`Paginator`], reading watermarks from a [`CursorStore`]
#[derive(Clone)]
pub struct ResourceExtractor {
    paginator: Arc<dyn Paginator>,
    cursors: Arc<CursorStore>,
}

impl ResourceExtractor {
    pub fn new(paginator: Arc<dyn Paginator>, cursors: Arc<CursorStore>) -> Self {
        Self { paginator, cursors }
    }

    pub fn cursors(&self) -> &Arc<CursorStore> {
        &self.cursors
    }

    /// Key of the watermark `spec` uses under `parent_partition`
    pub fn watermark_key(&self, spec: &ResourceSpec, parent_partition: &str) -> Option<WatermarkKey> {
        spec.cursor.as_ref().map(|cursor| {
            let partition = match cursor.scope {
                CursorScope::PerParent => parent_partition,
                CursorScope::Global => "",
            };
            self.cursors.key(&spec.name, &cursor.field, partition)
        })
    }

    /// Extract the records of `spec` under `parent`
    ///
    /// `parent_partition` identifies the parent for per-parent watermarks and is
    /// empty for a root resource.
    ///
    /// # Errors
    ///
    /// Returns `Transport` when a page cannot be fetched, `CursorFieldMissing`
    /// when an accepted record lacks the cursor under the raise policy, and
    /// `MissingJoinField` or `Transform` when the parent cannot feed the resource.
    pub async fn extract(
        &self,
        spec: &ResourceSpec,
        parent: Option<&RawRecord>,
        parent_partition: &str,
    ) -> Result<Extraction> {
        let watermark_key = self.watermark_key(spec, parent_partition);
        let watermark = match (&spec.cursor, &watermark_key) {
            (Some(cursor), Some(key)) => Some(self.cursors.get(key, cursor.initial_value).await),
            _ => None,
        };

        let mut extraction = Extraction {
            watermark_key,
            watermark,
            ..Default::default()
        };

        if parent.is_some_and(|parent| !spec.parent_filter.accepts(parent)) {
            return Ok(extraction);
        }

        match &spec.source {
            ResourceSource::Endpoint { path, params } => {
                let request = self.first_request(spec, path, params, parent, watermark)?;
                let pages = paginate(self.paginator.clone(), request);
                futures::pin_mut!(pages);
                while let Some(page) = pages.try_next().await? {
                    extraction.stats.pages += 1;
                    for record in page.results {
                        accept(spec, parent, record, &mut extraction)?;
                    }
                }
            }
            ResourceSource::Embedded { field } => {
                let parent = parent.ok_or_else(|| {
                    HarvestError::Validation(format!(
                        "Resource '{}' reads '{field}' from a parent but has none",
                        spec.name
                    ))
                })?;
                for record in embedded_records(spec, parent, field)? {
                    accept(spec, Some(parent), record, &mut extraction)?;
                }
            }
            ResourceSource::Download { url_field } => {
                let parent = parent.ok_or_else(|| {
                    HarvestError::Validation(format!(
                        "Resource '{}' reads '{url_field}' from a parent but has none",
                        spec.name
                    ))
                })?;
                let url = parent
                    .get(url_field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| HarvestError::MissingJoinField {
                        resource: spec.name.clone(),
                        field: url_field.clone(),
                    })?;

                let request = PageRequest::new(&spec.name, download_url(url))
                    .allow_redirects(spec.allow_redirects)
                    .ignored_status_codes(spec.ignored_status_codes.clone());
                let body = self.paginator.fetch_bytes(&request).await?;
                extraction.stats.pages += 1;

                if !body.is_empty() {
                    match parse_csv(&body) {
                        Ok(records) => {
                            tracing::debug!(
                                resource = %spec.name,
                                url = %request.url,
                                lines = records.len(),
                                "Parsed downloaded file"
                            );
                            for record in records {
                                accept(spec, Some(parent), record, &mut extraction)?;
                            }
                        }
                        Err(error) => {
                            tracing::error!(
                                resource = %spec.name,
                                url = %request.url,
                                error = %error,
                                "Skipping unreadable file"
                            );
                            extraction.stats.unreadable_files += 1;
                        }
                    }
                }
            }
        }

        tracing::debug!(
            resource = %spec.name,
            partition = parent_partition,
            watermark = ?extraction.watermark,
            candidate = ?extraction.candidate,
            pages = extraction.stats.pages,
            fetched = extraction.stats.fetched,
            accepted = extraction.records.len(),
            filtered_out = extraction.stats.filtered_out,
            below_watermark = extraction.stats.below_watermark,
            "Extracted resource"
        );

        Ok(extraction)
    }

    fn first_request(
        &self,
        spec: &ResourceSpec,
        path: &str,
        params: &[(String, String)],
        parent: Option<&RawRecord>,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<PageRequest> {
        let url = spec.render_path(path, parent)?;
        let mut params = params.to_vec();

        if let Some(page_size) = spec.page_size {
            if !params.iter().any(|(key, _)| key == "limit") {
                params.push(("limit".to_string(), page_size.to_string()));
            }
        }

        if let (Some(cursor), Some(value)) = (&spec.cursor, watermark) {
            params.extend(cursor_params(
                &cursor.filter,
                &cursor.field,
                &value,
                &cursor.value_format,
            ));
        }

        Ok(PageRequest::new(&spec.name, url)
            .params(params)
            .allow_redirects(spec.allow_redirects)
            .ignored_status_codes(spec.ignored_status_codes.clone()))
    }
}

/// Download location of a file, without the `format=json` the API appends
fn download_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.replace("?format=json", "");
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, value)| !(key == "format" && value == "json"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

fn embedded_records(spec: &ResourceSpec, parent: &RawRecord, field: &str) -> Result<Vec<RawRecord>> {
    match parent.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record.clone()),
                other => Err(HarvestError::Transform(format!(
                    "Resource '{}' expected objects in '{field}', found {other}",
                    spec.name
                ))),
            })
            .collect(),
        Some(other) => Err(HarvestError::Transform(format!(
            "Resource '{}' expected a list in '{field}', found {other}",
            spec.name
        ))),
    }
}

/// Run one record through normalisation, joins, filter and cursor checks
fn accept(
    spec: &ResourceSpec,
    parent: Option<&RawRecord>,
    mut record: RawRecord,
    extraction: &mut Extraction,
) -> Result<()> {
    extraction.stats.fetched += 1;

    normalize_timestamps(&mut record, &spec.timestamp_fields);
    if let Some(parent) = parent {
        spec.apply_join_fields(parent, &mut record)?;
    }

    if !spec.filter.accepts(&record) {
        extraction.stats.filtered_out += 1;
        return Ok(());
    }

    if let Some(cursor) = &spec.cursor {
        match record.get(&cursor.field).and_then(parse_timestamp_value) {
            Some(value) => {
                if extraction.watermark.is_some_and(|watermark| value < watermark) {
                    extraction.stats.below_watermark += 1;
                    if spec.forward_below_watermark {
                        extraction.forwarded.push(record);
                    }
                    return Ok(());
                }
                extraction.candidate = Some(match extraction.candidate {
                    Some(current) => current.max(value),
                    None => value,
                });
            }
            None => match cursor.missing_policy {
                MissingPolicy::Raise => {
                    return Err(HarvestError::CursorFieldMissing {
                        resource: spec.name.clone(),
                        cursor_field: cursor.field.clone(),
                        record_key: spec.record_key(&record),
                    });
                }
                MissingPolicy::Include => extraction.stats.missing_cursor += 1,
            },
        }
    }

    extraction.records.push(record);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::kobo::paginator::Page;
    use crate::adapters::memory::MemoryStore;
    use crate::core::state::StagedAdvances;
    use crate::domain::{CursorFilter, CursorSpec, JoinField, RecordFilter};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use tokio::sync::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 1).unwrap()
    }

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    /// Serves one fixed page and remembers the requests
    struct FixedPage {
        results: Vec<RawRecord>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl FixedPage {
        fn new(results: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                results: results.into_iter().map(record).collect(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Paginator for FixedPage {
        async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
            self.requests.lock().await.push(request.clone());
            Ok(Page {
                results: self.results.clone(),
                next: None,
                count: Some(self.results.len() as u64),
            })
        }
    }

    async fn extractor(paginator: Arc<FixedPage>) -> ResourceExtractor {
        let cursors = CursorStore::open(Arc::new(MemoryStore::new()), "test")
            .await
            .unwrap();
        ResourceExtractor::new(paginator, Arc::new(cursors))
    }

    fn submissions(policy: MissingPolicy) -> ResourceSpec {
        ResourceSpec::builder(
            "kobo_submission",
            ResourceSource::Endpoint {
                path: "/api/v2/assets/{uid}/data/".to_string(),
                params: vec![("format".to_string(), "json".to_string())],
            },
        )
        .primary_key(["_id"])
        .cursor(
            CursorSpec::new("_submission_time", t0())
                .missing_policy(policy)
                .filter(CursorFilter::JsonDocument {
                    param: "query".to_string(),
                }),
        )
        .join_field(JoinField::new("uid", "_asset_uid"))
        .timestamp_fields(["_submission_time"])
        .build()
        .unwrap()
    }

    fn form() -> RawRecord {
        record(json!({"uid": "a1"}))
    }

    #[tokio::test]
    async fn test_request_carries_cursor_filter() {
        let paginator = FixedPage::new(vec![]);
        let extractor = extractor(paginator.clone()).await;

        extractor
            .extract(&submissions(MissingPolicy::Raise), Some(&form()), "a1")
            .await
            .unwrap();

        let requests = paginator.requests.lock().await;
        assert_eq!(requests[0].url, "/api/v2/assets/a1/data/");
        assert!(requests[0].params.contains(&(
            "query".to_string(),
            r#"{"_submission_time":{"$gte":"2025-11-01T00:00:01"}}"#.to_string()
        )));
    }

    #[tokio::test]
    async fn test_candidate_is_max_of_accepted() {
        let paginator = FixedPage::new(vec![
            json!({"_id": 1, "_submission_time": "2025-11-01T00:00:11"}),
            json!({"_id": 2, "_submission_time": "2025-11-01T00:00:21"}),
            json!({"_id": 3, "_submission_time": "2025-11-01T00:00:01"}),
        ]);
        let extractor = extractor(paginator).await;

        let extraction = extractor
            .extract(&submissions(MissingPolicy::Raise), Some(&form()), "a1")
            .await
            .unwrap();

        assert_eq!(extraction.records.len(), 3);
        assert_eq!(extraction.candidate, Some(t0() + Duration::seconds(20)));
        assert_eq!(extraction.records[0]["_asset_uid"], json!("a1"));
        assert_eq!(
            extraction.records[0]["_submission_time"],
            json!("2025-11-01T00:00:11Z")
        );
    }

    #[tokio::test]
    async fn test_boundary_is_inclusive() {
        let paginator = FixedPage::new(vec![
            json!({"_id": 1, "_submission_time": "2025-11-01T00:00:21"}),
            json!({"_id": 2, "_submission_time": "2025-11-01T00:00:16"}),
        ]);
        let extractor = extractor(paginator).await;
        let spec = submissions(MissingPolicy::Raise);
        let key = extractor.watermark_key(&spec, "a1").unwrap();
        let mut staged = StagedAdvances::new();
        staged.stage(key, t0() + Duration::seconds(20), MissingPolicy::Raise);
        extractor.cursors().commit(&staged, "l1").await.unwrap();

        let extraction = extractor.extract(&spec, Some(&form()), "a1").await.unwrap();

        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0]["_id"], json!(1));
        assert_eq!(extraction.stats.below_watermark, 1);
    }

    #[tokio::test]
    async fn test_missing_cursor_raise() {
        let paginator = FixedPage::new(vec![
            json!({"_id": 1, "_submission_time": "2025-11-01T00:00:11"}),
            json!({"_id": 2}),
        ]);
        let extractor = extractor(paginator).await;

        let err = extractor
            .extract(&submissions(MissingPolicy::Raise), Some(&form()), "a1")
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::CursorFieldMissing { .. }));
    }

    #[tokio::test]
    async fn test_missing_cursor_include() {
        let paginator = FixedPage::new(vec![
            json!({"_id": 1, "_submission_time": "2025-11-01T00:00:11"}),
            json!({"_id": 2, "_submission_time": null}),
        ]);
        let extractor = extractor(paginator).await;

        let extraction = extractor
            .extract(&submissions(MissingPolicy::Include), Some(&form()), "a1")
            .await
            .unwrap();

        assert_eq!(extraction.records.len(), 2);
        assert_eq!(extraction.stats.missing_cursor, 1);
        assert_eq!(extraction.candidate, Some(t0() + Duration::seconds(10)));
    }

    #[tokio::test]
    async fn test_global_scope_ignores_partition() {
        let extractor = extractor(FixedPage::new(vec![])).await;
        let mut spec = submissions(MissingPolicy::Raise);
        if let Some(cursor) = spec.cursor.as_mut() {
            cursor.scope = CursorScope::Global;
        }

        assert_eq!(extractor.watermark_key(&spec, "a1").unwrap().partition, "");
    }

    #[tokio::test]
    async fn test_embedded_records() {
        let extractor = extractor(FixedPage::new(vec![])).await;
        let spec = ResourceSpec::builder(
            "kobo_attachment",
            ResourceSource::Embedded {
                field: "_attachments".to_string(),
            },
        )
        .primary_key(["id"])
        .filter(RecordFilter::FieldEquals {
            field: "media_file_basename".to_string(),
            value: "audit.csv".to_string(),
        })
        .join_field(JoinField::new("_id", "_submission_id"))
        .build()
        .unwrap();
        let submission = record(json!({
            "_id": 7,
            "_attachments": [
                {"id": 1, "media_file_basename": "audit.csv"},
                {"id": 2, "media_file_basename": "photo.jpg"}
            ]
        }));

        let extraction = extractor.extract(&spec, Some(&submission), "7").await.unwrap();

        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0]["_submission_id"], json!(7));
        assert_eq!(extraction.stats.filtered_out, 1);
    }

    #[tokio::test]
    async fn test_embedded_non_list_is_transform_error() {
        let extractor = extractor(FixedPage::new(vec![])).await;
        let spec = ResourceSpec::builder(
            "kobo_attachment",
            ResourceSource::Embedded {
                field: "_attachments".to_string(),
            },
        )
        .primary_key(["id"])
        .build()
        .unwrap();
        let submission = record(json!({"_id": 7, "_attachments": "oops"}));

        let err = extractor
            .extract(&spec, Some(&submission), "7")
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Transform(_)));
    }

    #[tokio::test]
    async fn test_below_watermark_records_are_forwarded_when_asked() {
        let paginator = FixedPage::new(vec![
            json!({"uid": "new", "deployment__last_submission_time": "2025-11-01T00:00:21"}),
            json!({"uid": "old", "deployment__last_submission_time": "2025-10-31T00:00:00"}),
        ]);
        let extractor = extractor(paginator).await;
        let forms = |forward: bool| {
            ResourceSpec::builder(
                "kobo_asset",
                ResourceSource::Endpoint {
                    path: "/api/v2/assets/".to_string(),
                    params: vec![],
                },
            )
            .primary_key(["uid"])
            .cursor(CursorSpec::new("deployment__last_submission_time", t0()))
            .forward_below_watermark(forward)
            .build()
            .unwrap()
        };

        let dropped = extractor.extract(&forms(false), None, "").await.unwrap();
        let forwarded = extractor.extract(&forms(true), None, "").await.unwrap();

        assert_eq!(dropped.records.len(), 1);
        assert!(dropped.forwarded.is_empty());
        assert_eq!(forwarded.records.len(), 1);
        assert_eq!(forwarded.forwarded.len(), 1);
        assert_eq!(forwarded.forwarded[0]["uid"], json!("old"));
        assert_eq!(forwarded.candidate, Some(t0() + Duration::seconds(20)));
    }

    /// Serves one file body for every download
    struct FixedFile {
        body: Vec<u8>,
        requests: Mutex<Vec<PageRequest>>,
    }

    #[async_trait]
    impl Paginator for FixedFile {
        async fn fetch_page(&self, _request: &PageRequest) -> Result<Page> {
            Ok(Page::empty())
        }

        async fn fetch_bytes(&self, request: &PageRequest) -> Result<Vec<u8>> {
            self.requests.lock().await.push(request.clone());
            Ok(self.body.clone())
        }
    }

    async fn download(body: &[u8]) -> (Arc<FixedFile>, Result<Extraction>) {
        let paginator = Arc::new(FixedFile {
            body: body.to_vec(),
            requests: Mutex::new(Vec::new()),
        });
        let cursors = CursorStore::open(Arc::new(MemoryStore::new()), "test")
            .await
            .unwrap();
        let extractor = ResourceExtractor::new(paginator.clone(), Arc::new(cursors));
        let spec = ResourceSpec::builder(
            "kobo_audit",
            ResourceSource::Download {
                url_field: "download_url".to_string(),
            },
        )
        .primary_key(["_attachment_id", "_row"])
        .parent_filter(RecordFilter::FieldEquals {
            field: "media_file_basename".to_string(),
            value: "audit.csv".to_string(),
        })
        .join_field(JoinField::new("id", "_attachment_id"))
        .build()
        .unwrap();
        let attachment = record(json!({
            "id": 9,
            "media_file_basename": "audit.csv",
            "download_url": "https://kf.example.org/api/v2/assets/a1/data/7/attachments/9/?format=json"
        }));

        let result = extractor.extract(&spec, Some(&attachment), "9").await;
        (paginator, result)
    }

    #[tokio::test]
    async fn test_download_parses_csv_lines() {
        let (paginator, result) = download(b"event,node\nform.start,\nquestion,/consent\n").await;
        let extraction = result.unwrap();

        assert_eq!(extraction.records.len(), 2);
        assert_eq!(extraction.records[1]["node"], json!("/consent"));
        assert_eq!(extraction.records[1]["_row"], json!(2));
        assert_eq!(extraction.records[1]["_attachment_id"], json!(9));

        let requests = paginator.requests.lock().await;
        assert_eq!(
            requests[0].url,
            "https://kf.example.org/api/v2/assets/a1/data/7/attachments/9/"
        );
    }

    #[tokio::test]
    async fn test_unreadable_download_is_skipped() {
        let (_, result) = download(b"event,node\nform.start\n").await;
        let extraction = result.unwrap();

        assert!(extraction.records.is_empty());
        assert_eq!(extraction.stats.unreadable_files, 1);
    }

    #[tokio::test]
    async fn test_parent_filter_skips_other_attachments() {
        let paginator = Arc::new(FixedFile {
            body: b"event\nform.start\n".to_vec(),
            requests: Mutex::new(Vec::new()),
        });
        let cursors = CursorStore::open(Arc::new(MemoryStore::new()), "test")
            .await
            .unwrap();
        let extractor = ResourceExtractor::new(paginator.clone(), Arc::new(cursors));
        let spec = ResourceSpec::builder(
            "kobo_audit",
            ResourceSource::Download {
                url_field: "download_url".to_string(),
            },
        )
        .primary_key(["_row"])
        .parent_filter(RecordFilter::FieldEquals {
            field: "media_file_basename".to_string(),
            value: "audit.csv".to_string(),
        })
        .build()
        .unwrap();
        let photo = record(json!({"id": 3, "media_file_basename": "photo.jpg", "download_url": "https://kf/x"}));

        let extraction = extractor.extract(&spec, Some(&photo), "3").await.unwrap();

        assert!(extraction.records.is_empty());
        assert!(paginator.requests.lock().await.is_empty());
    }

    #[test]
    fn test_download_url_keeps_other_params() {
        assert_eq!(
            download_url("https://kf.example.org/media/original?media_file=a%2Faudit.csv&format=json"),
            "https://kf.example.org/media/original?media_file=a%2Faudit.csv"
        );
        assert_eq!(download_url("/relative/?format=json"), "/relative/");
    }

    #[tokio::test]
    async fn test_page_only_source_cannot_download() {
        let extractor = extractor(FixedPage::new(vec![])).await;
        let spec = ResourceSpec::builder(
            "kobo_audit",
            ResourceSource::Download {
                url_field: "download_url".to_string(),
            },
        )
        .primary_key(["_row"])
        .build()
        .unwrap();
        let attachment = record(json!({"download_url": "https://kf/x"}));

        let err = extractor
            .extract(&spec, Some(&attachment), "1")
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Validation(_)));
    }
}

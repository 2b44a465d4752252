//! Shared fixtures for integration tests
//!
//! [`KoboStub`] answers page requests the way a KoboToolbox server does: it
//! lists the forms of a project view with their submission counts, and applies
//! the `$gte` bound of the `query` parameter to submissions on its side.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use harvest::adapters::database::{CommitHandle, LoadBatch, StorageSink};
use harvest::adapters::kobo::{kobo_plan, Page, PageRequest, Paginator};
use harvest::adapters::memory::MemoryStore;
use harvest::config::{secret_string, KoboConfig, SyncConfig};
use harvest::core::cascade::{CascadeOptions, CascadeOrchestrator, CascadePlan, RunSummary, RunTrace};
use harvest::core::state::{CursorStore, WatermarkKey};
use harvest::core::transform::timestamps::parse_timestamp;
use harvest::domain::{HarvestError, KoboError, RawRecord, Result, WriteDisposition};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub const PIPELINE: &str = "harvest";
pub const PROJECT_VIEW: &str = "pv1";

/// Initial watermark of every test
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 1).unwrap()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(seconds)
}

fn server_time(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// A submission as the data endpoint returns it
pub fn submission(id: i64, submitted_at: DateTime<Utc>) -> RawRecord {
    json!({
        "_id": id,
        "_uuid": format!("uuid-{id}"),
        "_submission_time": server_time(&submitted_at),
        "_status": "submitted_via_web",
        "consent": "yes",
        "household/size": id * 10,
    })
    .as_object()
    .cloned()
    .unwrap()
}

/// A submission carrying attachments
pub fn submission_with_attachments(
    id: i64,
    submitted_at: DateTime<Utc>,
    files: &[(i64, &str)],
) -> RawRecord {
    let mut record = submission(id, submitted_at);
    let attachments: Vec<Value> = files
        .iter()
        .map(|(attachment_id, basename)| {
            json!({
                "id": attachment_id,
                "media_file_basename": basename,
                "mimetype": "text/csv",
            })
        })
        .collect();
    record.insert("_attachments".to_string(), Value::Array(attachments));
    record
}

struct StubForm {
    uid: String,
    hide_last_submission: bool,
}

/// In-process stand-in for a KoboToolbox server
#[derive(Default)]
pub struct KoboStub {
    forms: Mutex<Vec<StubForm>>,
    submissions: Mutex<HashMap<String, Vec<RawRecord>>>,
    requests: Mutex<Vec<PageRequest>>,
    failing_form: Mutex<Option<String>>,
    /// Flip the sender once this many submission pages were served
    trip: Mutex<Option<(usize, watch::Sender<bool>)>>,
    submission_requests: Mutex<usize>,
    served: Mutex<Vec<i64>>,
    ignore_query: Mutex<bool>,
}

impl KoboStub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add_form(&self, uid: &str) {
        self.forms.lock().await.push(StubForm {
            uid: uid.to_string(),
            hide_last_submission: false,
        });
    }

    /// Form listed without `deployment__last_submission_time`
    pub async fn add_form_without_last_submission(&self, uid: &str) {
        self.forms.lock().await.push(StubForm {
            uid: uid.to_string(),
            hide_last_submission: true,
        });
    }

    pub async fn add_submissions(&self, uid: &str, records: Vec<RawRecord>) {
        self.submissions
            .lock()
            .await
            .entry(uid.to_string())
            .or_default()
            .extend(records);
    }

    /// Answer every data request of `uid` with a server error
    pub async fn fail_form(&self, uid: Option<&str>) {
        *self.failing_form.lock().await = uid.map(str::to_string);
    }

    /// Serve every submission regardless of the `query` bound
    pub async fn ignore_query(&self) {
        *self.ignore_query.lock().await = true;
    }

    pub async fn trip_after(&self, submission_pages: usize, sender: watch::Sender<bool>) {
        *self.trip.lock().await = Some((submission_pages, sender));
    }

    pub async fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().await.clone()
    }

    /// `_id`s of every submission the stub handed out
    pub async fn served_ids(&self) -> Vec<i64> {
        self.served.lock().await.clone()
    }

    async fn list_forms(&self) -> Vec<RawRecord> {
        let submissions = self.submissions.lock().await;
        self.forms
            .lock()
            .await
            .iter()
            .map(|form| {
                let records = submissions.get(&form.uid).map(Vec::as_slice).unwrap_or(&[]);
                let last = records
                    .iter()
                    .filter_map(|r| r.get("_submission_time").and_then(Value::as_str))
                    .filter_map(parse_timestamp)
                    .max();

                let mut record = json!({
                    "uid": form.uid,
                    "name": format!("Survey {}", form.uid),
                    "asset_type": "survey",
                    "date_modified": "2025-10-30T08:00:00Z",
                    "deployment__submission_count": records.len(),
                })
                .as_object()
                .cloned()
                .unwrap();
                if let (false, Some(last)) = (form.hide_last_submission, last) {
                    record.insert(
                        "deployment__last_submission_time".to_string(),
                        Value::String(last.to_rfc3339()),
                    );
                }
                record
            })
            .collect()
    }

    async fn list_submissions(&self, uid: &str, request: &PageRequest) -> Result<Vec<RawRecord>> {
        if self.failing_form.lock().await.as_deref() == Some(uid) {
            return Err(HarvestError::Transport(KoboError::UnexpectedStatus {
                status: 500,
                url: request.url.clone(),
                body: "Internal Server Error".to_string(),
            }));
        }

        let lower = if *self.ignore_query.lock().await {
            None
        } else {
            lower_bound(request)
        };
        let records: Vec<RawRecord> = self
            .submissions
            .lock()
            .await
            .get(uid)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|record| {
                let submitted = record
                    .get("_submission_time")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp);
                match (submitted, lower) {
                    (Some(submitted), Some(lower)) => submitted >= lower,
                    _ => true,
                }
            })
            .collect();

        self.served
            .lock()
            .await
            .extend(records.iter().filter_map(|r| r.get("_id").and_then(Value::as_i64)));
        Ok(records)
    }

    async fn count_submission_page(&self) {
        let mut pages = self.submission_requests.lock().await;
        *pages += 1;
        let trip = self.trip.lock().await;
        if let Some((limit, sender)) = trip.as_ref() {
            if *pages >= *limit {
                let _ = sender.send(true);
            }
        }
    }
}

/// `$gte` bound of the `query` parameter, if any
fn lower_bound(request: &PageRequest) -> Option<DateTime<Utc>> {
    let (_, query) = request.params.iter().find(|(key, _)| key == "query")?;
    let document: Value = serde_json::from_str(query).ok()?;
    document
        .get("_submission_time")?
        .get("$gte")?
        .as_str()
        .and_then(parse_timestamp)
}

#[async_trait]
impl Paginator for KoboStub {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        self.requests.lock().await.push(request.clone());

        let forms_path = format!("/api/v2/project-views/{PROJECT_VIEW}/assets/");
        let results = if request.url == forms_path {
            self.list_forms().await
        } else if let Some(uid) = request
            .url
            .strip_prefix("/api/v2/assets/")
            .and_then(|rest| rest.strip_suffix("/data/"))
        {
            let records = self.list_submissions(uid, request).await;
            self.count_submission_page().await;
            records?
        } else {
            return Err(HarvestError::Transport(KoboError::UnexpectedStatus {
                status: 404,
                url: request.url.clone(),
                body: "Not Found".to_string(),
            }));
        };

        Ok(Page {
            count: Some(results.len() as u64),
            results,
            next: None,
        })
    }
}

/// Memory destination that rejects every write to one table
pub struct FailingSink {
    pub inner: Arc<MemoryStore>,
    pub table: String,
}

#[async_trait]
impl StorageSink for FailingSink {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn write(&self, batch: LoadBatch) -> Result<CommitHandle> {
        if batch.table == self.table {
            return Err(HarvestError::Sink(format!(
                "relation \"{}\" is locked",
                batch.table
            )));
        }
        self.inner.write(batch).await
    }

    async fn record_run(&self, trace: &RunTrace) -> Result<()> {
        self.inner.record_run(trace).await
    }

    fn destination_name(&self) -> &str {
        "failing"
    }
}

pub fn kobo_config() -> KoboConfig {
    KoboConfig {
        base_url: "https://kf.example.org".to_string(),
        token: secret_string("test-token".to_string()),
        project_view: PROJECT_VIEW.to_string(),
        timeout_seconds: 5,
        page_size: 100,
        ignored_status_codes: vec![404, 502],
        enable_http_logging: false,
    }
}

pub fn sync_config(disposition: WriteDisposition) -> SyncConfig {
    SyncConfig {
        submission_time_start: server_time(&t0()),
        form_last_submission_start: server_time(&t0()),
        write_disposition: disposition,
        ..Default::default()
    }
}

pub fn plan(sync: &SyncConfig) -> CascadePlan {
    kobo_plan(&kobo_config(), sync).unwrap()
}

pub fn sequential() -> CascadeOptions {
    CascadeOptions {
        parallel_parents: 1,
        dry_run: false,
    }
}

/// One sync against a fresh cursor store, as the CLI does it
pub async fn sync(
    stub: &Arc<KoboStub>,
    store: &Arc<MemoryStore>,
    plan: &CascadePlan,
    options: CascadeOptions,
) -> RunSummary {
    sync_into(stub, store, store.clone(), plan, options, None).await
}

pub async fn sync_into(
    stub: &Arc<KoboStub>,
    state: &Arc<MemoryStore>,
    sink: Arc<dyn StorageSink>,
    plan: &CascadePlan,
    options: CascadeOptions,
    shutdown: Option<watch::Receiver<bool>>,
) -> RunSummary {
    let cursors = CursorStore::open(state.clone(), PIPELINE).await.unwrap();
    let mut orchestrator = CascadeOrchestrator::new(stub.clone(), Arc::new(cursors), sink, options);
    if let Some(shutdown) = shutdown {
        orchestrator = orchestrator.with_shutdown(shutdown);
    }
    orchestrator.run(plan).await
}

pub fn submission_key(uid: &str) -> WatermarkKey {
    WatermarkKey::new(PIPELINE, "kobo_submission", "_submission_time", uid)
}

pub fn global_submission_key() -> WatermarkKey {
    WatermarkKey::new(PIPELINE, "kobo_submission", "_submission_time", "")
}

pub fn form_key() -> WatermarkKey {
    WatermarkKey::new(PIPELINE, "kobo_asset", "deployment__last_submission_time", "")
}

/// `_id`s stored in a table, sorted
pub async fn stored_ids(store: &MemoryStore, table: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = store
        .rows(table)
        .await
        .iter()
        .filter_map(|row| row.get("_id").and_then(Value::as_i64))
        .collect();
    ids.sort_unstable();
    ids
}

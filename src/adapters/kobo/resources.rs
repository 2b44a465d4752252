//! KoboToolbox resource definitions
//!
//! Forms of a project view feed their submissions, and submissions feed their
//! embedded attachments. Audit attachments are downloaded and parsed line by
//! line.

use crate::config::{FormCursor, KoboConfig, SyncConfig};
use crate::core::cascade::plan::CascadePlan;
use crate::core::transform::timestamps::DEFAULT_TIMESTAMP_FIELDS;
use crate::core::transform::tabular::ROW_FIELD;
use crate::domain::{
    CursorFilter, CursorScope, CursorSpec, HarvestError, JoinField, MissingPolicy, RecordFilter,
    RecordShape, ResourceSource, ResourceSpec, Result,
};

pub const FORMS_RESOURCE: &str = "kobo_asset";
pub const SUBMISSIONS_RESOURCE: &str = "kobo_submission";
pub const ATTACHMENTS_RESOURCE: &str = "kobo_attachment";
pub const AUDIT_RESOURCE: &str = "kobo_audit";

fn format_json() -> (String, String) {
    ("format".to_string(), "json".to_string())
}

/// Forms of the configured project view that have at least one submission
///
/// With per-form submission watermarks, every form is listed and passed on
/// to the submissions level. Forms at or above the forms watermark are still
/// the only ones written, so a form that shows up late with older
/// submissions is not skipped.
///
/// # Errors
///
/// Returns `Configuration` if a configured start value is not a timestamp.
pub fn forms(kobo: &KoboConfig, sync: &SyncConfig) -> Result<ResourceSpec> {
    let per_form = sync.submission_cursor_scope == CursorScope::PerParent;
    let cursor = match sync.form_cursor {
        FormCursor::LastSubmissionTime => CursorSpec::new(
            "deployment__last_submission_time",
            sync.form_last_submission_start()
                .map_err(HarvestError::Configuration)?,
        )
        .missing_policy(MissingPolicy::Include),
        FormCursor::DateModified => CursorSpec::new(
            "date_modified",
            sync.form_modified_start().map_err(HarvestError::Configuration)?,
        )
        .missing_policy(MissingPolicy::Raise)
        .filter(if per_form {
            CursorFilter::None
        } else {
            CursorFilter::QueryRange {
                param: "q".to_string(),
            }
        }),
    };

    ResourceSpec::builder(
        FORMS_RESOURCE,
        ResourceSource::Endpoint {
            path: format!("/api/v2/project-views/{}/assets/", kobo.project_view),
            params: vec![format_json()],
        },
    )
    .primary_key(["uid"])
    .cursor(cursor)
    .filter(RecordFilter::PositiveCount {
        field: "deployment__submission_count".to_string(),
    })
    .page_size(kobo.page_size)
    .selected(sync.load_forms)
    .forward_below_watermark(per_form)
    .write_disposition(sync.write_disposition)
    .ignored_status_codes(kobo.ignored_status_codes.clone())
    .allow_redirects(false)
    .timestamp_fields(DEFAULT_TIMESTAMP_FIELDS)
    .build()
}

/// Submissions of one form, flattened to metadata plus responses
///
/// # Errors
///
/// Returns `Configuration` if the submission start value is not a timestamp.
pub fn submissions(sync: &SyncConfig) -> Result<ResourceSpec> {
    let cursor = CursorSpec::new(
        "_submission_time",
        sync.submission_start().map_err(HarvestError::Configuration)?,
    )
    .missing_policy(MissingPolicy::Raise)
    .filter(CursorFilter::JsonDocument {
        param: "query".to_string(),
    })
    .scope(sync.submission_cursor_scope);

    ResourceSpec::builder(
        SUBMISSIONS_RESOURCE,
        ResourceSource::Endpoint {
            path: "/api/v2/assets/{uid}/data/".to_string(),
            params: vec![format_json()],
        },
    )
    .primary_key(["_id", "_uuid"])
    .cursor(cursor)
    .join_field(JoinField::new("uid", "_asset_uid"))
    .shape(RecordShape::Eav)
    .write_disposition(sync.write_disposition)
    .timestamp_fields(DEFAULT_TIMESTAMP_FIELDS)
    .build()
}

fn basename_is(basename: &str) -> RecordFilter {
    RecordFilter::FieldEquals {
        field: "media_file_basename".to_string(),
        value: basename.to_string(),
    }
}

/// Attachments embedded in each submission, optionally limited to one file name
///
/// The basename limit only applies when attachment rows are loaded. When the
/// level only feeds audit files, every attachment is passed on.
pub fn attachments(sync: &SyncConfig) -> Result<ResourceSpec> {
    let filter = match sync.attachment_basename {
        Some(ref basename) if sync.load_attachments => basename_is(basename),
        _ => RecordFilter::All,
    };

    ResourceSpec::builder(
        ATTACHMENTS_RESOURCE,
        ResourceSource::Embedded {
            field: "_attachments".to_string(),
        },
    )
    .primary_key(["_submission_id", "id"])
    .filter(filter)
    .join_field(JoinField::new("_id", "_submission_id"))
    .join_field(JoinField::new("_asset_uid", "_asset_uid"))
    .selected(sync.load_attachments)
    .write_disposition(sync.write_disposition)
    .build()
}

/// Lines of each submission's audit file, one row per line
pub fn audit(sync: &SyncConfig) -> Result<ResourceSpec> {
    ResourceSpec::builder(
        AUDIT_RESOURCE,
        ResourceSource::Download {
            url_field: "download_url".to_string(),
        },
    )
    .primary_key(["_attachment_id", ROW_FIELD])
    .parent_filter(basename_is(&sync.audit_basename))
    .join_field(JoinField::new("id", "_attachment_id"))
    .join_field(JoinField::new("_submission_id", "_submission_id"))
    .join_field(JoinField::new("_asset_uid", "_asset_uid"))
    .write_disposition(sync.write_disposition)
    .build()
}

/// Forms, then submissions, then attachments and audit lines when enabled
///
/// # Errors
///
/// Returns `Configuration` for invalid start values, `Validation` for an
/// inconsistent plan.
pub fn kobo_plan(kobo: &KoboConfig, sync: &SyncConfig) -> Result<CascadePlan> {
    let mut levels = vec![forms(kobo, sync)?, submissions(sync)?];
    if sync.load_attachments || sync.load_audit {
        levels.push(attachments(sync)?);
    }
    if sync.load_audit {
        levels.push(audit(sync)?);
    }
    CascadePlan::new(levels)
}

//! Resource definitions
//!
//! A [`ResourceSpec`] describes one level of a cascade: where its records come
//! from, how they are identified, which field drives incremental loading and how
//! they are written. Specs are immutable once built.

use super::errors::HarvestError;
use super::record::RawRecord;
use super::result::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What to do with an accepted record that lacks the cursor field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Load the record; it never moves the watermark
    Include,
    /// Fail the batch
    Raise,
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingPolicy::Include => write!(f, "include"),
            MissingPolicy::Raise => write!(f, "raise"),
        }
    }
}

impl std::str::FromStr for MissingPolicy {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "include" => Ok(MissingPolicy::Include),
            "raise" => Ok(MissingPolicy::Raise),
            other => Err(HarvestError::Validation(format!(
                "Unknown missing policy '{other}'"
            ))),
        }
    }
}

/// Granularity of a child resource's watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorScope {
    /// One watermark per resource, shared by every parent
    Global,
    /// One watermark per parent primary key
    #[default]
    PerParent,
}

/// How the watermark is pushed to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CursorFilter {
    /// Filter client-side only
    None,
    /// Range operator inside a query string, e.g. `q=date_modified__gte:2025-01-01T00:00:00`
    QueryRange { param: String },
    /// JSON filter document, e.g. `query={"_submission_time":{"$gte":"2025-01-01T00:00:00"}}`
    JsonDocument { param: String },
}

/// Incremental loading settings of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorSpec {
    /// Monotonically increasing timestamp field
    pub field: String,

    /// Watermark used when nothing has been committed yet
    pub initial_value: DateTime<Utc>,

    pub missing_policy: MissingPolicy,

    pub filter: CursorFilter,

    pub scope: CursorScope,

    /// strftime pattern used when sending the watermark to the server
    pub value_format: String,
}

impl CursorSpec {
    /// Cursor on `field` with a client-side filter, include policy and default format
    pub fn new(field: impl Into<String>, initial_value: DateTime<Utc>) -> Self {
        Self {
            field: field.into(),
            initial_value,
            missing_policy: MissingPolicy::Include,
            filter: CursorFilter::None,
            scope: CursorScope::default(),
            value_format: DEFAULT_CURSOR_FORMAT.to_string(),
        }
    }

    pub fn missing_policy(mut self, policy: MissingPolicy) -> Self {
        self.missing_policy = policy;
        self
    }

    pub fn filter(mut self, filter: CursorFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn scope(mut self, scope: CursorScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn value_format(mut self, format: impl Into<String>) -> Self {
        self.value_format = format.into();
        self
    }
}

/// Second precision; truncation can only widen a `>=` filter
pub const DEFAULT_CURSOR_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Output shape of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordShape {
    Raw,
    Eav,
}

/// How rows reach the destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    Append,
    #[default]
    Merge,
    Replace,
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteDisposition::Append => write!(f, "append"),
            WriteDisposition::Merge => write!(f, "merge"),
            WriteDisposition::Replace => write!(f, "replace"),
        }
    }
}

impl std::str::FromStr for WriteDisposition {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "append" => Ok(WriteDisposition::Append),
            "merge" => Ok(WriteDisposition::Merge),
            "replace" => Ok(WriteDisposition::Replace),
            other => Err(HarvestError::Validation(format!(
                "Unknown write disposition '{other}'. Must be one of: append, merge, replace"
            ))),
        }
    }
}

/// Record-level filter applied after fetching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RecordFilter {
    /// Keep everything
    All,
    /// Keep records whose numeric field is > 0; null and absent count as 0
    PositiveCount { field: String },
    /// Keep records whose string field equals a value
    FieldEquals { field: String, value: String },
}

impl RecordFilter {
    pub fn accepts(&self, record: &RawRecord) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::PositiveCount { field } => record
                .get(field)
                .and_then(Value::as_f64)
                .map(|count| count > 0.0)
                .unwrap_or(false),
            RecordFilter::FieldEquals { field, value } => {
                record.get(field).and_then(Value::as_str) == Some(value.as_str())
            }
        }
    }
}

/// Where a resource's records come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResourceSource {
    /// Paginated list endpoint; `{field}` placeholders are filled from the parent record
    Endpoint {
        path: String,
        params: Vec<(String, String)>,
    },
    /// A list of objects embedded in a field of the parent record
    Embedded { field: String },
    /// A CSV file downloaded from the URL held in a field of the parent record;
    /// every line becomes one record
    Download { url_field: String },
}

impl ResourceSource {
    /// Whether records come from a parent rather than a listing of their own
    pub fn needs_parent(&self) -> bool {
        !matches!(self, ResourceSource::Endpoint { .. })
    }
}

/// Parent field copied onto every child record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinField {
    pub parent_field: String,
    pub child_field: String,
}

impl JoinField {
    pub fn new(parent_field: impl Into<String>, child_field: impl Into<String>) -> Self {
        Self {
            parent_field: parent_field.into(),
            child_field: child_field.into(),
        }
    }
}

/// One extractable resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub source: ResourceSource,
    pub primary_key: Vec<String>,
    pub cursor: Option<CursorSpec>,
    pub filter: RecordFilter,
    pub page_size: Option<u32>,
    /// Whether this level's records are written, as opposed to only feeding children
    pub selected: bool,
    pub shape: RecordShape,
    pub join_fields: Vec<JoinField>,
    pub table_name: String,
    pub write_disposition: WriteDisposition,
    pub ignored_status_codes: Vec<u16>,
    pub allow_redirects: bool,
    /// Fields normalised to RFC 3339 UTC before filtering
    pub timestamp_fields: Vec<String>,
    /// Parents this level skips entirely
    pub parent_filter: RecordFilter,
    /// Records below the watermark are not written but still feed the next level
    pub forward_below_watermark: bool,
}

impl ResourceSpec {
    /// Start building a resource
    pub fn builder(name: impl Into<String>, source: ResourceSource) -> ResourceSpecBuilder {
        ResourceSpecBuilder::new(name, source)
    }

    /// Render the endpoint path, substituting `{field}` placeholders from the parent record
    ///
    /// # Errors
    ///
    /// Returns `MissingJoinField` if a placeholder has no value in the parent,
    /// or `Validation` for an unterminated placeholder.
    pub fn render_path(&self, template: &str, parent: Option<&RawRecord>) -> Result<String> {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                HarvestError::Validation(format!(
                    "Unterminated placeholder in endpoint '{template}' of resource '{}'",
                    self.name
                ))
            })?;
            let field = &after[..end];
            let value = parent
                .and_then(|p| p.get(field))
                .and_then(scalar_text)
                .ok_or_else(|| HarvestError::MissingJoinField {
                    resource: self.name.clone(),
                    field: field.to_string(),
                })?;
            rendered.push_str(&value);
            rest = &after[end + 1..];
        }
        rendered.push_str(rest);

        Ok(rendered)
    }

    /// Stable identity of a record: JSON array of its primary key values
    pub fn record_key(&self, record: &RawRecord) -> String {
        let values: Vec<Value> = self
            .primary_key
            .iter()
            .map(|field| record.get(field).cloned().unwrap_or(Value::Null))
            .collect();
        Value::Array(values).to_string()
    }

    /// Plain-text identity of a record, used to partition child watermarks
    ///
    /// Primary key values joined by `/`; missing or non-scalar values render empty.
    pub fn partition_key(&self, record: &RawRecord) -> String {
        self.primary_key
            .iter()
            .map(|field| record.get(field).and_then(scalar_text).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Copy the join fields of `parent` onto `child`
    ///
    /// # Errors
    ///
    /// Returns `MissingJoinField` if the parent lacks one of them.
    pub fn apply_join_fields(&self, parent: &RawRecord, child: &mut RawRecord) -> Result<()> {
        for join in &self.join_fields {
            let value = parent
                .get(&join.parent_field)
                .ok_or_else(|| HarvestError::MissingJoinField {
                    resource: self.name.clone(),
                    field: join.parent_field.clone(),
                })?;
            child.insert(join.child_field.clone(), value.clone());
        }
        Ok(())
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Builder for [`ResourceSpec`]
pub struct ResourceSpecBuilder {
    name: String,
    source: ResourceSource,
    primary_key: Vec<String>,
    cursor: Option<CursorSpec>,
    filter: RecordFilter,
    page_size: Option<u32>,
    selected: bool,
    shape: RecordShape,
    join_fields: Vec<JoinField>,
    table_name: Option<String>,
    write_disposition: WriteDisposition,
    ignored_status_codes: Vec<u16>,
    allow_redirects: bool,
    timestamp_fields: Vec<String>,
    parent_filter: RecordFilter,
    forward_below_watermark: bool,
}

impl ResourceSpecBuilder {
    fn new(name: impl Into<String>, source: ResourceSource) -> Self {
        Self {
            name: name.into(),
            source,
            primary_key: Vec::new(),
            cursor: None,
            filter: RecordFilter::All,
            page_size: None,
            selected: true,
            shape: RecordShape::Raw,
            join_fields: Vec::new(),
            table_name: None,
            write_disposition: WriteDisposition::default(),
            ignored_status_codes: Vec::new(),
            allow_redirects: true,
            timestamp_fields: Vec::new(),
            parent_filter: RecordFilter::All,
            forward_below_watermark: false,
        }
    }

    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn cursor(mut self, cursor: CursorSpec) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn shape(mut self, shape: RecordShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn join_field(mut self, join: JoinField) -> Self {
        self.join_fields.push(join);
        self
    }

    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn write_disposition(mut self, disposition: WriteDisposition) -> Self {
        self.write_disposition = disposition;
        self
    }

    pub fn ignored_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.ignored_status_codes = codes;
        self
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    pub fn timestamp_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timestamp_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn parent_filter(mut self, filter: RecordFilter) -> Self {
        self.parent_filter = filter;
        self
    }

    pub fn forward_below_watermark(mut self, forward: bool) -> Self {
        self.forward_below_watermark = forward;
        self
    }

    /// Build the resource
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the name or primary key is empty, or a
    /// page size of zero was requested.
    pub fn build(self) -> Result<ResourceSpec> {
        if self.name.trim().is_empty() {
            return Err(HarvestError::Validation(
                "Resource name cannot be empty".to_string(),
            ));
        }
        if self.primary_key.is_empty() {
            return Err(HarvestError::Validation(format!(
                "Resource '{}' needs a primary key",
                self.name
            )));
        }
        if self.page_size == Some(0) {
            return Err(HarvestError::Validation(format!(
                "Resource '{}' page size must be > 0",
                self.name
            )));
        }

        let table_name = self.table_name.unwrap_or_else(|| self.name.clone());

        Ok(ResourceSpec {
            name: self.name,
            source: self.source,
            primary_key: self.primary_key,
            cursor: self.cursor,
            filter: self.filter,
            page_size: self.page_size,
            selected: self.selected,
            shape: self.shape,
            join_fields: self.join_fields,
            table_name,
            write_disposition: self.write_disposition,
            ignored_status_codes: self.ignored_status_codes,
            allow_redirects: self.allow_redirects,
            timestamp_fields: self.timestamp_fields,
            parent_filter: self.parent_filter,
            forward_below_watermark: self.forward_below_watermark,
        })
    }
}

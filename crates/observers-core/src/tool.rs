//! The `observations` tool: one dispatch entry point over the store.
//!
//! Callers send a JSON argument bag with an `operation` field. The bag is
//! parsed into a closed [`Operation`] before anything touches the store, so
//! malformed arguments are rejected with the name of the offending field.
//! Batch elements are the exception: they are decoded one at a time as the
//! batch runs, so a bad element only stops the entries after it.
//! Every outcome, including failures, comes back as a [`ToolResult`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use observers_state::StateStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::domain::{NewObservation, Observation, ObservationError, Result, Severity, Status};
use crate::hooks::{HookRegistry, HookResult, OBSERVATIONS_CHANGE};
use crate::obs;
use crate::query::{ListFilters, ListQuery, ListResult, SortBy};
use crate::store::{BatchCreated, ObservationStore};

/// Operation names accepted by [`ObservationsTool::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    CreateBatch,
    List,
    Get,
    Acknowledge,
    Resolve,
    ClearResolved,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Create,
        OperationKind::CreateBatch,
        OperationKind::List,
        OperationKind::Get,
        OperationKind::Acknowledge,
        OperationKind::Resolve,
        OperationKind::ClearResolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateBatch => "create_batch",
            Self::List => "list",
            Self::Get => "get",
            Self::Acknowledge => "acknowledge",
            Self::Resolve => "resolve",
            Self::ClearResolved => "clear_resolved",
        }
    }

    /// True for operations that may change the store.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::List | Self::Get)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }
}

impl FromStr for OperationKind {
    type Err = ObservationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ObservationError::UnknownOperation {
                operation: s.to_string(),
            })
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully parsed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(NewObservation),
    /// Raw elements of the `observations` array.
    CreateBatch(Vec<Value>),
    List(ListQuery),
    Get {
        observation_id: Option<String>,
    },
    Acknowledge {
        observation_id: Option<String>,
    },
    Resolve {
        observation_id: Option<String>,
        resolution_note: Option<String>,
    },
    ClearResolved,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::CreateBatch(_) => OperationKind::CreateBatch,
            Self::List(_) => OperationKind::List,
            Self::Get { .. } => OperationKind::Get,
            Self::Acknowledge { .. } => OperationKind::Acknowledge,
            Self::Resolve { .. } => OperationKind::Resolve,
            Self::ClearResolved => OperationKind::ClearResolved,
        }
    }

    /// Parse the operation-specific fields of `args` for `kind`.
    pub fn parse(kind: OperationKind, args: &Map<String, Value>) -> Result<Self> {
        let op = match kind {
            OperationKind::Create => {
                let fields = match args.get("observation") {
                    Some(Value::Object(nested)) => nested,
                    Some(Value::Null) | None => args,
                    Some(_) => {
                        return Err(ObservationError::validation(
                            "observation",
                            "observation must be an object",
                        ))
                    }
                };
                Self::Create(parse_new_observation(fields)?)
            }
            OperationKind::CreateBatch => {
                let items = match args.get("observations") {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => {
                        return Err(ObservationError::validation(
                            "observations",
                            "observations is required",
                        ))
                    }
                    Some(_) => {
                        return Err(ObservationError::validation(
                            "observations",
                            "observations must be an array",
                        ))
                    }
                };
                Self::CreateBatch(items.clone())
            }
            OperationKind::List => Self::List(parse_list_query(args)?),
            OperationKind::Get => Self::Get {
                observation_id: optional_string(args, "observation_id")?,
            },
            OperationKind::Acknowledge => Self::Acknowledge {
                observation_id: optional_string(args, "observation_id")?,
            },
            OperationKind::Resolve => Self::Resolve {
                observation_id: optional_string(args, "observation_id")?,
                resolution_note: optional_string(args, "resolution_note")?,
            },
            OperationKind::ClearResolved => Self::ClearResolved,
        };
        Ok(op)
    }
}

/// Outcome of one dispatch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(error: Value) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
        }
    }

    /// `output.status`, when present.
    pub fn status(&self) -> Option<&str> {
        self.output.as_ref()?.get("status")?.as_str()
    }
}

#[derive(Serialize)]
struct ObservationReply<'a> {
    status: &'static str,
    observation: &'a Observation,
}

#[derive(Serialize)]
struct BatchReply<'a> {
    status: &'static str,
    #[serde(flatten)]
    batch: &'a BatchCreated,
}

#[derive(Serialize)]
struct ListReply<'a> {
    status: &'static str,
    #[serde(flatten)]
    result: &'a ListResult,
}

#[derive(Serialize)]
struct ClearedReply {
    status: &'static str,
    count: usize,
}

/// In-band error for lookups by id, reported as a successful call.
#[derive(Serialize)]
struct LookupErrorReply {
    status: &'static str,
    error: String,
}

#[derive(Serialize)]
struct FailureBody<'a> {
    message: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_operations: Option<Vec<&'static str>>,
}

/// Tool facade over an [`ObservationStore`].
pub struct ObservationsTool {
    store: ObservationStore,
    hooks: Option<Arc<HookRegistry>>,
    displays: Vec<String>,
}

impl ObservationsTool {
    pub const NAME: &'static str = "observations";

    pub const DESCRIPTION: &'static str = r#"Manage code and conversation observations from automated reviewers.

Operations:
- create: Record one observation (content required; observer, severity, source_type, source_ref, metadata optional)
- create_batch: Record several observations at once
- list: List observations with optional filters (status, severity, observer)
- get: Get a specific observation by ID
- acknowledge: Mark an observation as acknowledged
- resolve: Mark an observation as resolved with optional note
- clear_resolved: Remove all resolved observations

Examples:
- List open observations: {"operation": "list", "filters": {"status": "open"}}
- List critical/high issues: {"operation": "list", "filters": {"severity": ["critical", "high"]}}
- Acknowledge: {"operation": "acknowledge", "observation_id": "uuid"}
- Resolve: {"operation": "resolve", "observation_id": "uuid", "resolution_note": "Fixed"}
"#;

    pub fn new(store: ObservationStore) -> Self {
        Self {
            store,
            hooks: None,
            displays: Vec::new(),
        }
    }

    /// Load the store from `backend` (or start in memory) and wrap it.
    pub async fn mount(
        backend: Option<Arc<dyn StateStore>>,
        state_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::new(ObservationStore::mount(backend, state_key).await?))
    }

    /// Emit `observations:change` on `hooks` whenever a call changed the store.
    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    /// Display content produced by hooks since the last call.
    pub fn take_displays(&mut self) -> Vec<String> {
        std::mem::take(&mut self.displays)
    }

    /// JSON schema of the argument bag.
    pub fn input_schema() -> Value {
        let one_or_many = json!({
            "oneOf": [
                {"type": "string"},
                {"type": "array", "items": {"type": "string"}}
            ]
        });
        let mut status = one_or_many.clone();
        status["description"] = json!("Filter by status(es)");
        let mut severity = one_or_many;
        severity["description"] = json!("Filter by severity(ies)");

        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": OperationKind::names(),
                    "description": "Operation to perform"
                },
                "observation_id": {
                    "type": "string",
                    "description": "ID of observation (for get/acknowledge/resolve)"
                },
                "filters": {
                    "type": "object",
                    "description": "Filters for list operation",
                    "properties": {
                        "status": status,
                        "severity": severity,
                        "observer": {
                            "type": "string",
                            "description": "Filter by observer name"
                        }
                    }
                },
                "sort_by": {
                    "type": "string",
                    "enum": [SortBy::Severity.as_str(), SortBy::CreatedAt.as_str()],
                    "description": "Sort order for list"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Max results for list"
                },
                "resolution_note": {
                    "type": "string",
                    "description": "Note when resolving observation"
                },
                "content": {
                    "type": "string",
                    "description": "Observation text (for create)"
                },
                "observations": {
                    "type": "array",
                    "items": {"type": "object"},
                    "description": "Observations to record (for create_batch)"
                }
            },
            "required": ["operation"]
        })
    }

    /// Parse and run one request.
    #[instrument(skip_all, fields(operation = tracing::field::Empty))]
    pub async fn execute(&mut self, arguments: &Value) -> ToolResult {
        let operation = match parse_arguments(arguments) {
            Ok(op) => op,
            Err((e, name)) => return self.fail(&e, name.as_deref()),
        };
        let kind = operation.kind();
        tracing::Span::current().record("operation", kind.as_str());

        let revision = self.store.revision();
        let result = match self.dispatch(operation).await {
            Ok(output) => ToolResult::ok(output),
            Err(e) => self.fail(&e, Some(kind.as_str())),
        };
        // A failed batch or flush can still leave the store changed.
        if kind.is_mutating() && self.store.revision() != revision {
            self.notify_change().await;
        }
        result
    }

    async fn dispatch(&mut self, operation: Operation) -> Result<Value> {
        match operation {
            Operation::Create(input) => {
                let observation = self.store.create(input).await?;
                encode(&ObservationReply {
                    status: "created",
                    observation: &observation,
                })
            }
            Operation::CreateBatch(items) => {
                let entries = items.iter().map(parse_batch_entry).collect();
                let created = self.store.create_batch_from(entries).await?;
                encode(&BatchReply {
                    status: "created",
                    batch: &created,
                })
            }
            Operation::List(query) => {
                let result = self.store.list(&query)?;
                encode(&ListReply {
                    status: "ok",
                    result: &result,
                })
            }
            Operation::Get { observation_id } => {
                let id = match require_id(observation_id) {
                    Ok(id) => id,
                    Err(reply) => return reply,
                };
                match self.store.get(&id) {
                    Ok(observation) => encode(&ObservationReply {
                        status: "ok",
                        observation: &observation,
                    }),
                    Err(e) => lookup_error(e),
                }
            }
            Operation::Acknowledge { observation_id } => {
                let id = match require_id(observation_id) {
                    Ok(id) => id,
                    Err(reply) => return reply,
                };
                match self.store.acknowledge(&id).await {
                    Ok(observation) => encode(&ObservationReply {
                        status: "acknowledged",
                        observation: &observation,
                    }),
                    Err(e) => lookup_error(e),
                }
            }
            Operation::Resolve {
                observation_id,
                resolution_note,
            } => {
                let id = match require_id(observation_id) {
                    Ok(id) => id,
                    Err(reply) => return reply,
                };
                match self.store.resolve(&id, resolution_note).await {
                    Ok(observation) => encode(&ObservationReply {
                        status: "resolved",
                        observation: &observation,
                    }),
                    Err(e) => lookup_error(e),
                }
            }
            Operation::ClearResolved => {
                let count = self.store.clear_resolved().await?;
                encode(&ClearedReply {
                    status: "cleared",
                    count,
                })
            }
        }
    }

    async fn notify_change(&mut self) {
        let Some(hooks) = self.hooks.clone() else {
            return;
        };
        let data = match self.store.list(&ListQuery::default()).and_then(|result| {
            encode(&ListReply {
                status: "ok",
                result: &result,
            })
        }) {
            Ok(data) => data,
            Err(e) => {
                obs::emit_operation_failed(OBSERVATIONS_CHANGE, &e);
                return;
            }
        };

        for result in hooks.emit(OBSERVATIONS_CHANGE, &data).await {
            if let HookResult::Display { content } = result {
                self.displays.push(content);
            }
        }
        debug!(pending_displays = self.displays.len(), "change hooks emitted");
    }

    fn fail(&self, error: &ObservationError, operation: Option<&str>) -> ToolResult {
        obs::emit_operation_failed(operation.unwrap_or("unknown"), error);
        let body = match error {
            ObservationError::UnknownOperation { .. } => FailureBody {
                message: error.to_string(),
                kind: error.kind(),
                operation: None,
                field: None,
                valid_operations: Some(OperationKind::names()),
            },
            _ => FailureBody {
                message: error.to_string(),
                kind: error.kind(),
                operation,
                field: error.field(),
                valid_operations: None,
            },
        };
        let value = serde_json::to_value(&body).unwrap_or_else(|_| Value::String(error.to_string()));
        ToolResult::failure(value)
    }
}

fn encode<T: Serialize>(reply: &T) -> Result<Value> {
    Ok(serde_json::to_value(reply)?)
}

/// Missing ids and unknown ids are reported in-band; everything else fails.
fn lookup_error(error: ObservationError) -> Result<Value> {
    match error {
        ObservationError::NotFound { .. } => encode(&LookupErrorReply {
            status: "error",
            error: error.to_string(),
        }),
        other => Err(other),
    }
}

fn require_id(observation_id: Option<String>) -> std::result::Result<String, Result<Value>> {
    match observation_id {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(encode(&LookupErrorReply {
            status: "error",
            error: "observation_id required".to_string(),
        })),
    }
}

/// Read `operation` (default `list`) and parse the rest of the bag.
///
/// On failure the operation name is returned alongside the error when it
/// could be read, so the failure result can name it.
fn parse_arguments(
    arguments: &Value,
) -> std::result::Result<Operation, (ObservationError, Option<String>)> {
    let empty = Map::new();
    let args = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err((
                ObservationError::validation("arguments", "arguments must be a JSON object"),
                None,
            ))
        }
    };

    let name = match args.get("operation") {
        Some(Value::String(name)) => name.as_str(),
        Some(Value::Null) | None => OperationKind::List.as_str(),
        Some(_) => {
            return Err((
                ObservationError::validation("operation", "operation must be a string"),
                None,
            ))
        }
    };

    let kind: OperationKind = name.parse().map_err(|e| (e, None))?;
    Operation::parse(kind, args).map_err(|e| (e, Some(name.to_string())))
}

fn optional_string(args: &Map<String, Value>, field: &str) -> Result<Option<String>> {
    match args.get(field) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(ObservationError::validation(
            field,
            format!("{field} must be a string"),
        )),
    }
}

fn parse_new_observation(fields: &Map<String, Value>) -> Result<NewObservation> {
    Ok(NewObservation {
        observer: optional_string(fields, "observer")?,
        content: optional_string(fields, "content")?,
        severity: optional_string(fields, "severity")?,
        source_type: optional_string(fields, "source_type")?,
        source_ref: optional_string(fields, "source_ref")?,
        metadata: fields.get("metadata").filter(|v| !v.is_null()).cloned(),
    })
}

/// One `create_batch` element. Field errors are relative to the element;
/// the store adds the `observations[i]` prefix.
fn parse_batch_entry(item: &Value) -> Result<NewObservation> {
    match item {
        Value::Object(fields) => parse_new_observation(fields),
        _ => Err(ObservationError::validation(
            "",
            "each observation must be an object",
        )),
    }
}

fn parse_list_query(args: &Map<String, Value>) -> Result<ListQuery> {
    let mut query = ListQuery::default();

    match args.get("filters") {
        Some(Value::Object(filters)) => query.filters = parse_filters(filters)?,
        Some(Value::Null) | None => {}
        Some(_) => {
            return Err(ObservationError::validation(
                "filters",
                "filters must be an object",
            ))
        }
    }

    if let Some(sort_by) = optional_string(args, "sort_by")? {
        query.sort_by = sort_by.parse()?;
    }

    match args.get("limit") {
        Some(Value::Null) | None => {}
        Some(limit) => {
            let limit = limit.as_i64().ok_or_else(|| {
                ObservationError::validation("limit", "limit must be an integer")
            })?;
            if limit <= 0 {
                return Err(ObservationError::validation(
                    "limit",
                    "limit must be a positive integer",
                ));
            }
            query.limit = usize::try_from(limit).unwrap_or(usize::MAX);
        }
    }

    Ok(query)
}

fn parse_filters(filters: &Map<String, Value>) -> Result<ListFilters> {
    let mut parsed = ListFilters::default();
    if let Some(names) = one_or_many(filters, "status")? {
        parsed.status = Some(parse_all::<Status>(&names).map_err(|e| e.within("filters"))?);
    }
    if let Some(names) = one_or_many(filters, "severity")? {
        parsed.severity = Some(parse_all::<Severity>(&names).map_err(|e| e.within("filters"))?);
    }
    parsed.observer = optional_string(filters, "observer").map_err(|e| e.within("filters"))?;
    Ok(parsed)
}

/// A filter value given as one string or an array of strings.
fn one_or_many(filters: &Map<String, Value>, field: &str) -> Result<Option<Vec<String>>> {
    let invalid = || {
        ObservationError::validation(
            format!("filters.{field}"),
            format!("{field} filter must be a string or an array of strings"),
        )
    };
    match filters.get(field) {
        Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| invalid()))
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(invalid()),
    }
}

fn parse_all<T: FromStr<Err = ObservationError>>(names: &[String]) -> Result<Vec<T>> {
    names.iter().map(|n| n.parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_operation_kind_round_trip_names() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!(matches!(
            "delete".parse::<OperationKind>(),
            Err(ObservationError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn test_reads_are_not_mutating() {
        let mutating: Vec<&str> = OperationKind::ALL
            .into_iter()
            .filter(|k| k.is_mutating())
            .map(|k| k.as_str())
            .collect();
        assert_eq!(
            mutating,
            vec!["create", "create_batch", "acknowledge", "resolve", "clear_resolved"]
        );
    }

    #[test]
    fn test_missing_operation_defaults_to_list() {
        let op = parse_arguments(&json!({})).unwrap();
        assert_eq!(op, Operation::List(ListQuery::default()));
        let op = parse_arguments(&Value::Null).unwrap();
        assert_eq!(op.kind(), OperationKind::List);
    }

    #[test]
    fn test_create_accepts_nested_observation() {
        let op = Operation::parse(
            OperationKind::Create,
            &args(json!({"observation": {"content": "x", "severity": "high"}})),
        )
        .unwrap();
        assert_eq!(op, Operation::Create(NewObservation::new("x").severity("high")));
    }

    #[test]
    fn test_create_rejects_non_string_content() {
        let err = Operation::parse(OperationKind::Create, &args(json!({"content": 7}))).unwrap_err();
        assert_eq!(err.field(), Some("content"));
    }

    #[test]
    fn test_batch_elements_are_left_for_the_store() {
        let op = Operation::parse(
            OperationKind::CreateBatch,
            &args(json!({"observations": [{"content": "ok"}, {"content": false}, 3]})),
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::CreateBatch(vec![
                json!({"content": "ok"}),
                json!({"content": false}),
                json!(3),
            ])
        );

        let err = Operation::parse(OperationKind::CreateBatch, &args(json!({}))).unwrap_err();
        assert_eq!(err.field(), Some("observations"));
        let err = Operation::parse(OperationKind::CreateBatch, &args(json!({"observations": {}})))
            .unwrap_err();
        assert_eq!(err.field(), Some("observations"));
    }

    #[test]
    fn test_batch_entry_errors_are_element_relative() {
        assert_eq!(
            parse_batch_entry(&json!({"content": "x", "severity": "low"})).unwrap(),
            NewObservation::new("x").severity("low")
        );
        let err = parse_batch_entry(&json!({"content": 7})).unwrap_err();
        assert_eq!(err.field(), Some("content"));
        let err = parse_batch_entry(&json!("not an object")).unwrap_err();
        assert_eq!(err.field(), Some(""));
    }

    #[test]
    fn test_filters_accept_string_or_array() {
        let op = Operation::parse(
            OperationKind::List,
            &args(json!({
                "filters": {"status": "open", "severity": ["critical", "high"], "observer": "sec"},
                "sort_by": "created_at",
                "limit": 5
            })),
        )
        .unwrap();
        let Operation::List(query) = op else {
            panic!("expected list");
        };
        assert_eq!(query.filters.status, Some(vec![Status::Open]));
        assert_eq!(
            query.filters.severity,
            Some(vec![Severity::Critical, Severity::High])
        );
        assert_eq!(query.filters.observer.as_deref(), Some("sec"));
        assert_eq!(query.sort_by, SortBy::CreatedAt);
        assert_eq!(query.limit, 5);
    }

    #[test]
    fn test_unknown_filter_value_is_invalid_enum() {
        let err = Operation::parse(
            OperationKind::List,
            &args(json!({"filters": {"severity": ["urgent"]}})),
        )
        .unwrap_err();
        assert!(matches!(err, ObservationError::InvalidEnumValue { .. }));
        assert_eq!(err.field(), Some("filters.severity"));
    }

    #[test]
    fn test_limit_must_be_positive_integer() {
        for bad in [json!(0), json!(-3), json!("10"), json!(2.5)] {
            let err = Operation::parse(OperationKind::List, &args(json!({"limit": bad})))
                .unwrap_err();
            assert_eq!(err.field(), Some("limit"));
        }
    }

    #[test]
    fn test_schema_lists_every_operation() {
        let schema = ObservationsTool::input_schema();
        let ops = schema["properties"]["operation"]["enum"].as_array().unwrap();
        assert_eq!(ops.len(), OperationKind::ALL.len());
        assert_eq!(schema["required"], json!(["operation"]));
    }

    #[test]
    fn test_tool_result_status_accessor() {
        assert_eq!(ToolResult::ok(json!({"status": "ok"})).status(), Some("ok"));
        assert_eq!(ToolResult::failure(json!({"message": "x"})).status(), None);
    }
}

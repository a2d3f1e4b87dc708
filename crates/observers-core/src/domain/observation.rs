//! Observation records and their lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{ObservationError, Result};

/// Urgency of an observation, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Sort rank: `critical` is 0, `info` is 4.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Info => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.as_str()).collect()
    }
}

impl FromStr for Severity {
    type Err = ObservationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ObservationError::invalid_enum("severity", s, &Self::names()))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage. Only ever advances `open -> acknowledged -> resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Open,
    Acknowledged,
    Resolved,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Open, Status::Acknowledged, Status::Resolved];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.as_str()).collect()
    }
}

impl FromStr for Status {
    type Err = ObservationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ObservationError::invalid_enum("status", s, &Self::names()))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the observed problem lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Code,
    Conversation,
    #[default]
    Unknown,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [
        SourceType::Code,
        SourceType::Conversation,
        SourceType::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Conversation => "conversation",
            Self::Unknown => "unknown",
        }
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.as_str()).collect()
    }
}

impl FromStr for SourceType {
    type Err = ObservationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ObservationError::invalid_enum("source_type", s, &Self::names()))
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied fields for a new observation.
///
/// Enum fields stay as raw strings here; [`Observation::create`] parses them
/// so an unrecognized value surfaces as `InvalidEnumValue`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewObservation {
    #[serde(default)]
    pub observer: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewObservation {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn observer(mut self, observer: impl Into<String>) -> Self {
        self.observer = Some(observer.into());
        self
    }

    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A reviewer's finding.
///
/// Fields are private so the lifecycle invariants hold: `id` and
/// `created_at` never change, `status` never moves backwards, and the
/// transition timestamps are written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    id: String,
    observer: String,
    content: String,
    severity: Severity,
    source_type: SourceType,
    #[serde(default)]
    source_ref: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
    status: Status,
    created_at: DateTime<Utc>,
    #[serde(default)]
    acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    resolution_note: Option<String>,
}

impl Observation {
    /// Validate `fields` and build an open observation with a fresh id.
    pub fn create(fields: NewObservation) -> Result<Self> {
        let content = match fields.content {
            Some(c) if !c.trim().is_empty() => c,
            Some(_) => {
                return Err(ObservationError::validation(
                    "content",
                    "content must not be empty",
                ))
            }
            None => {
                return Err(ObservationError::validation(
                    "content",
                    "content is required",
                ))
            }
        };

        let severity = match fields.severity.as_deref() {
            Some(s) => s.parse()?,
            None => Severity::default(),
        };
        let source_type = match fields.source_type.as_deref() {
            Some(s) => s.parse()?,
            None => SourceType::default(),
        };

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            observer: fields.observer.unwrap_or_else(|| "unknown".to_string()),
            content,
            severity,
            source_type,
            source_ref: fields.source_ref,
            metadata: fields.metadata,
            status: Status::Open,
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
            resolution_note: None,
        })
    }

    /// Mark as seen. Never regresses a resolved observation.
    pub fn acknowledge(&mut self) {
        if self.status == Status::Open {
            self.status = Status::Acknowledged;
        }
        if self.acknowledged_at.is_none() {
            self.acknowledged_at = Some(Utc::now());
        }
    }

    /// Mark as resolved from any state. A supplied note replaces the previous one.
    pub fn resolve(&mut self, note: Option<String>) {
        self.status = Status::Resolved;
        if self.resolved_at.is_none() {
            self.resolved_at = Some(Utc::now());
        }
        if note.is_some() {
            self.resolution_note = note;
        }
    }

    pub fn to_dict(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_dict(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn observer(&self) -> &str {
        &self.observer
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn source_ref(&self) -> Option<&str> {
        self.source_ref.as_deref()
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn acknowledged_at(&self) -> Option<DateTime<Utc>> {
        self.acknowledged_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn resolution_note(&self) -> Option<&str> {
        self.resolution_note.as_deref()
    }
}

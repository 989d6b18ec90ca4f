//! Audit records for security context lifecycle.
//!
//! Every context creation, deletion, failed initialization and rejected
//! compute is a security-relevant event: it either brings key material into
//! use, retires it, or reveals a caller holding a stale or forged reference.
//!
//! # NIST SP 800-53 Compliance
//!
//! - **AU-2: Audit Events** - Context create/delete, init failures, rejected computes
//! - **AU-3: Content of Audit Records** - Timestamp, source, action, outcome,
//!   context id, context kind, algorithm, failure reason
//! - **AU-8: Time Stamps** - UTC timestamps with microsecond precision
//! - **SC-12: Cryptographic Key Management** - Key bytes never enter a record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// A context was created in a broker table
    ContextCreate,
    /// A context was removed from a broker table
    ContextDelete,
    /// A compute referenced a context that is not live
    ContextAccess,
    /// Broker startup and shutdown
    SystemLifecycle,
    /// Error and failure events
    ErrorCondition,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::ContextCreate => write!(f, "CONTEXT_CREATE"),
            AuditCategory::ContextDelete => write!(f, "CONTEXT_DELETE"),
            AuditCategory::ContextAccess => write!(f, "CONTEXT_ACCESS"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::ErrorCondition => write!(f, "ERROR_CONDITION"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// Structured audit record.
///
/// # NIST AU-3 Compliance
/// - AU-3(a): **Timestamp** - UTC, microsecond precision
/// - AU-3(b): **Component** - Source module generating the event
/// - AU-3(c): **Event Type** - Action performed
/// - AU-3(d): **Object** - Context id and context kind
/// - AU-3(e): **Outcome** - Success/failure/denied
/// - AU-3(f): **Details** - Algorithm, table occupancy, failure reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,

    /// Context id in hex, e.g. `0x0000000000000001`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// `integrity_context` or `ciphering_context`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Create a new record with the current timestamp. The outcome defaults
    /// to InProgress until explicitly set.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Set the error message and mark outcome as Failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    /// Serialize for SIEM ingestion.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emits an [`AuditRecord`] through tracing with target `audit`.
///
/// # Outcome-based Severity Mapping
/// - Success: Info
/// - InProgress: Debug
/// - Failure/Denied: Warn
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Denied => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs the global subscriber with human-readable output.
///
/// `RUST_LOG` takes precedence over `log_level` when set.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Same as [`init_logging`] with one JSON object per line, for SIEM ingestion
/// of the `audit` target.
pub fn init_logging_json(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_create_record() {
        let record = AuditRecord::new(AuditCategory::ContextCreate, "ContextBroker", "integrity_init")
            .with_outcome(AuditOutcome::Success)
            .with_object_id("0x0000000000000001")
            .with_object_type("integrity_context");

        assert_eq!(record.category, AuditCategory::ContextCreate);
        assert_eq!(record.source, "ContextBroker");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id.as_deref(), Some("0x0000000000000001"));
    }

    #[test]
    fn test_with_error_marks_failure() {
        let record = AuditRecord::new(AuditCategory::ContextCreate, "ContextBroker", "ciphering_init")
            .with_error("unsupported algorithm 7");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.error.as_deref(), Some("unsupported algorithm 7"));
    }

    #[test]
    fn test_json_omits_empty_fields() {
        let record = AuditRecord::new(AuditCategory::ContextAccess, "ContextBroker", "compute_encrypt")
            .with_outcome(AuditOutcome::Denied)
            .with_details(serde_json::json!({ "algorithm": 2 }));

        let json = record.to_json();
        assert!(json.contains("CONTEXT_ACCESS"));
        assert!(json.contains("\"outcome\":\"denied\""));
        assert!(json.contains("\"algorithm\":2"));
        assert!(!json.contains("object_id"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_display() {
        assert_eq!(AuditCategory::ContextDelete.to_string(), "CONTEXT_DELETE");
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
    }
}

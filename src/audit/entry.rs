//! Audit entry types.

use serde::Serialize;
use uuid::Uuid;

use crate::error::StackResult;
use crate::executor::{ActionOutput, PrivilegedAction};

/// One privileged action as recorded in the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp of completion.
    pub timestamp: String,
    /// Identifier shared with the tracing events of the action.
    pub action_id: Uuid,
    /// Command line as requested, before any escalation prefix.
    pub command: String,
    /// Size of the stdin payload, when the action wrote a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin_bytes: Option<usize>,
    /// Whether the command went through the escalation helper.
    pub escalated: bool,
    pub result: AuditResult,
    pub duration_ms: u64,
}

impl AuditEntry {
    pub fn from_result(
        timestamp: String,
        action: &PrivilegedAction,
        escalated: bool,
        result: &StackResult<ActionOutput>,
        duration_ms: u64,
    ) -> Self {
        let result = match result {
            Ok(output) => AuditResult::Success {
                exit_code: output.exit_code,
            },
            Err(e) => AuditResult::Failure {
                error_code: e.code().to_string(),
                error_message: e.to_string(),
            },
        };

        Self {
            timestamp,
            action_id: action.id,
            command: action.describe(),
            stdin_bytes: action.stdin.as_ref().map(Vec::len),
            escalated,
            result,
            duration_ms,
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum AuditResult {
    #[serde(rename = "success")]
    Success { exit_code: i32 },
    #[serde(rename = "failure")]
    Failure {
        error_code: String,
        error_message: String,
    },
}

//! The host-facing decision, serialized to stdout as a single JSON object.

use serde_json::{Value, json};

/// What the host should do with the mediated step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed; serialized as an empty object.
    Allow,
    /// Stop the step (prompt, model output, subagent stop).
    Block { reason: String },
    /// Refuse a tool permission (PreToolUse / PermissionRequest).
    Deny { reason: String },
}

impl Decision {
    /// Choose block vs deny based on which hook is being answered.
    pub fn refusal_for(hook_name: &str, reason: String) -> Self {
        match hook_name {
            "PreToolUse" | "PermissionRequest" => Self::Deny { reason },
            _ => Self::Block { reason },
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Allow => json!({}),
            Self::Block { reason } => json!({
                "decision": "block",
                "reason": reason,
            }),
            Self::Deny { reason } => json!({
                "decision": "block",
                "permissionDecision": "deny",
                "reason": reason,
            }),
        }
    }
}

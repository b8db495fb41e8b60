//! Hook event classification.
//!
//! Maps a hook name (plus, for tool hooks, the tool name) onto the closed set
//! of semantic event classes the Policy API understands. Classification is a
//! pure function: identical inputs always yield the same class.

use serde::{Deserialize, Serialize};

/// Semantic class of a mediated event, in Policy API wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventClass {
    #[serde(rename = "user_agt")]
    UserAgent,
    #[serde(rename = "agt_llm")]
    AgentLlm,
    #[serde(rename = "agt_tool")]
    AgentTool,
    #[serde(rename = "agt_mem")]
    AgentMemory,
    #[serde(rename = "agt_agt")]
    AgentAgent,
}

impl EventClass {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::UserAgent => "user_agt",
            Self::AgentLlm => "agt_llm",
            Self::AgentTool => "agt_tool",
            Self::AgentMemory => "agt_mem",
            Self::AgentAgent => "agt_agt",
        }
    }

    pub fn from_wire(wire: &str) -> Option<Self> {
        match wire {
            "user_agt" => Some(Self::UserAgent),
            "agt_llm" => Some(Self::AgentLlm),
            "agt_tool" => Some(Self::AgentTool),
            "agt_mem" => Some(Self::AgentMemory),
            "agt_agt" => Some(Self::AgentAgent),
            _ => None,
        }
    }
}

/// Tool names matching these substrings classify as agent↔memory.
const MEMORY_PATTERNS: [&str; 3] = ["memory", "store", "save"];

/// Tool names matching these substrings classify as agent↔agent.
const SUBAGENT_PATTERNS: [&str; 3] = ["task", "agent", "subagent"];

/// Hooks with dedicated live handlers; these carry real security content.
/// Everything else is lifecycle telemetry.
const SECURITY_CRITICAL_HOOKS: [&str; 7] = [
    "UserPromptSubmit",
    "PreToolUse",
    "PostToolUse",
    "PostToolUseFailure",
    "PermissionRequest",
    "Stop",
    "SubagentStop",
];

/// Hooks for which the host honors a block/deny decision.
const BLOCK_CAPABLE_HOOKS: [&str; 6] = [
    "UserPromptSubmit",
    "PreToolUse",
    "PostToolUse",
    "PermissionRequest",
    "Stop",
    "SubagentStop",
];

/// The reduced hook set processed under tiny debug mode.
const TINY_DEBUG_HOOKS: [&str; 6] = [
    "UserPromptSubmit",
    "PreToolUse",
    "PostToolUse",
    "PostToolUseFailure",
    "Stop",
    "SessionEnd",
];

/// Classify a tool name for PreToolUse / PermissionRequest events.
///
/// Returns `None` for the mediator's own tools so we never observe ourselves.
/// Match order: memory patterns, then subagent patterns, then plain tool.
pub fn classify_tool(tool_name: &str) -> Option<EventClass> {
    let lowered = tool_name.to_lowercase();
    if lowered.contains("hookwarden") {
        return None;
    }
    if MEMORY_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Some(EventClass::AgentMemory);
    }
    if SUBAGENT_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Some(EventClass::AgentAgent);
    }
    Some(EventClass::AgentTool)
}

/// True for every hook outside the security-critical set: the named
/// lifecycle hooks (SessionStart, Notification, PreCompact, ...) and any
/// hook name this build has never seen. A host that grows new lifecycle
/// notifications therefore stays local-only by default.
pub fn is_telemetry_hook(hook_name: &str) -> bool {
    !SECURITY_CRITICAL_HOOKS.contains(&hook_name)
}

pub fn is_block_capable(hook_name: &str) -> bool {
    BLOCK_CAPABLE_HOOKS.contains(&hook_name)
}

pub fn in_tiny_debug_set(hook_name: &str) -> bool {
    TINY_DEBUG_HOOKS.contains(&hook_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for class in [
            EventClass::UserAgent,
            EventClass::AgentLlm,
            EventClass::AgentTool,
            EventClass::AgentMemory,
            EventClass::AgentAgent,
        ] {
            assert_eq!(EventClass::from_wire(class.as_wire()), Some(class));
        }
    }

    #[test]
    fn plain_tools_are_agt_tool() {
        assert_eq!(classify_tool("Bash"), Some(EventClass::AgentTool));
        assert_eq!(classify_tool("Read"), Some(EventClass::AgentTool));
    }

    #[test]
    fn memory_tools_match_case_insensitively() {
        assert_eq!(
            classify_tool("mcp__Memory__recall"),
            Some(EventClass::AgentMemory)
        );
        assert_eq!(classify_tool("VectorStore"), Some(EventClass::AgentMemory));
    }

    #[test]
    fn subagent_tools_are_agt_agt() {
        assert_eq!(classify_tool("Task"), Some(EventClass::AgentAgent));
        assert_eq!(classify_tool("spawn_subagent"), Some(EventClass::AgentAgent));
    }

    #[test]
    fn memory_wins_over_subagent() {
        // "save" (memory) and "task" (subagent) both match; memory is checked first.
        assert_eq!(classify_tool("task_saver"), Some(EventClass::AgentMemory));
    }

    #[test]
    fn own_tools_are_skipped() {
        assert_eq!(classify_tool("hookwarden_status"), None);
        assert_eq!(classify_tool("mcp__HookWarden__ping"), None);
    }

    #[test]
    fn classification_is_stable() {
        for _ in 0..3 {
            assert_eq!(classify_tool("Bash"), Some(EventClass::AgentTool));
        }
    }

    #[test]
    fn hook_sets_are_consistent() {
        assert!(is_telemetry_hook("SessionEnd"));
        assert!(!is_telemetry_hook("Stop"));
        assert!(is_block_capable("Stop"));
        assert!(!is_block_capable("PostToolUseFailure"));
        assert!(in_tiny_debug_set("SessionEnd"));
        assert!(!in_tiny_debug_set("Notification"));
    }

    #[test]
    fn unknown_hooks_land_in_the_telemetry_bucket() {
        assert!(is_telemetry_hook("PreCompact"));
        assert!(is_telemetry_hook("BrandNewHook"));
        assert!(!is_block_capable("BrandNewHook"));
    }

    #[test]
    fn serde_uses_wire_names() {
        let encoded = serde_json::to_string(&EventClass::AgentMemory).unwrap();
        assert_eq!(encoded, "\"agt_mem\"");
    }
}

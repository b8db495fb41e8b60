//! Request bodies for the Policy API's single event endpoint.

use crate::classify::EventClass;
use crate::config::RunConfig;
use serde::Serialize;
use serde_json::{Map, Value, json};

/// CREATE: opens an event with its INPUT half; the response assigns event_id.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePayload {
    pub input: String,
    pub event_type: EventClass,
    pub profile_id: String,
    pub session_id: String,
    pub use_case_id: String,
    pub metadata: Map<String, Value>,
}

/// UPDATE: closes an event with its OUTPUT half.
///
/// `input` is sent empty; the upstream pairs on event_id alone.
#[derive(Debug, Clone, Serialize)]
pub struct UpdatePayload {
    pub event_id: String,
    pub event_type: EventClass,
    pub input: String,
    pub output: String,
    pub profile_id: String,
    pub session_id: String,
    pub use_case_id: String,
    pub metadata: Map<String, Value>,
}

/// Metadata common to every event from this invocation.
pub fn base_metadata(config: &RunConfig, hook_name: &str, session_id: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("user_id".into(), json!(config.user_id));
    metadata.insert("hook_event_name".into(), json!(hook_name));
    if !session_id.is_empty() {
        metadata.insert("caller_session_id".into(), json!(session_id));
    }
    metadata
}

pub fn create_payload(
    config: &RunConfig,
    event_type: EventClass,
    input: String,
    session_id: &str,
    metadata: Map<String, Value>,
) -> CreatePayload {
    CreatePayload {
        input,
        event_type,
        profile_id: config.profile_id.clone(),
        session_id: session_id.to_string(),
        use_case_id: config.use_case_id.clone(),
        metadata,
    }
}

pub fn update_payload(
    config: &RunConfig,
    event_id: String,
    event_type: EventClass,
    output: String,
    session_id: &str,
    metadata: Map<String, Value>,
) -> UpdatePayload {
    UpdatePayload {
        event_id,
        event_type,
        input: String::new(),
        output,
        profile_id: config.profile_id.clone(),
        session_id: session_id.to_string(),
        use_case_id: config.use_case_id.clone(),
        metadata,
    }
}

//! Model-turn reconstruction from the host's transcript file.
//!
//! The host exposes no model-call boundary, so model turns are rebuilt after
//! the fact from the growing JSONL transcript. A turn is a maximal contiguous
//! run of `assistant` records; its INPUT is everything since the previous
//! run. The file may still be mid-write, so a truncated final line is
//! expected, not an error.

use crate::error::TranscriptError;
use serde_json::Value;
use std::path::Path;

/// Tool-result blocks are summarized, not inlined wholesale.
const TOOL_RESULT_CAP: usize = 5000;

/// One reconstructed model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub index: usize,
    pub input: String,
    pub output: String,
}

/// Read transcript records, skipping blank lines, partial JSON (the host may
/// still be appending), and records without a string `type`.
///
/// A transcript that does not exist yet is empty, not an error; a file that
/// exists but cannot be read is.
pub fn read_entries(path: &Path) -> Result<Vec<Value>, TranscriptError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|err| TranscriptError::Unreadable(format!("{}: {err}", path.display())))?;
    Ok(contents
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            serde_json::from_str::<Value>(trimmed).ok()
        })
        .filter(|entry| entry.get("type").is_some_and(Value::is_string))
        .collect())
}

/// Extract all turns in order.
pub fn extract_turns(entries: &[Value]) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut last_assistant_end = 0usize;
    let mut index = 0usize;
    while index < entries.len() {
        if !is_assistant(&entries[index]) {
            index += 1;
            continue;
        }
        let start = index;
        while index < entries.len() && is_assistant(&entries[index]) {
            index += 1;
        }
        turns.push(Turn {
            index: turns.len(),
            input: flatten_block(&entries[last_assistant_end..start]),
            output: flatten_block(&entries[start..index]),
        });
        last_assistant_end = index;
    }
    turns
}

/// Turns with index strictly greater than `cursor`. A cursor past the end of
/// a shrunken transcript resets to the beginning.
pub fn turns_after(path: &Path, cursor: i64) -> Result<Vec<Turn>, TranscriptError> {
    let turns = extract_turns(&read_entries(path)?);
    let effective = if cursor >= turns.len() as i64 {
        -1
    } else {
        cursor
    };
    Ok(turns
        .into_iter()
        .filter(|turn| turn.index as i64 > effective)
        .collect())
}

/// The most recent turn, for closing the prompt pair at Stop.
pub fn last_turn(path: &Path) -> Result<Option<Turn>, TranscriptError> {
    Ok(extract_turns(&read_entries(path)?).pop())
}

fn is_assistant(entry: &Value) -> bool {
    entry.get("type").and_then(Value::as_str) == Some("assistant")
}

/// Flatten a run of records into plain text. Role tags are not prepended;
/// the upstream dashboard encodes role visually.
fn flatten_block(entries: &[Value]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for entry in entries {
        let content = entry
            .get("message")
            .and_then(|message| message.get("content"))
            .unwrap_or(&Value::Null);
        match content {
            Value::String(text) => {
                if !text.is_empty() {
                    parts.push(text.clone());
                }
            }
            Value::Array(blocks) => {
                for block in blocks {
                    flatten_typed_block(block, &mut parts);
                }
            }
            _ => {}
        }
    }
    parts.join("\n")
}

fn flatten_typed_block(block: &Value, parts: &mut Vec<String>) {
    match block.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = block.get("text").and_then(Value::as_str)
                && !text.is_empty()
            {
                parts.push(text.to_string());
            }
        }
        Some("tool_use") => {
            let summary = serde_json::json!({
                "tool_use": block.get("name").cloned().unwrap_or(Value::Null),
                "input": block.get("input").cloned().unwrap_or(Value::Null),
            });
            parts.push(summary.to_string());
        }
        Some("tool_result") => {
            let summary = serde_json::json!({
                "tool_result": block.get("content").cloned().unwrap_or(Value::Null),
            });
            let mut text = summary.to_string();
            if text.chars().count() > TOOL_RESULT_CAP {
                text = text.chars().take(TOOL_RESULT_CAP).collect();
            }
            parts.push(text);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_transcript(lines: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        (dir, path)
    }

    fn user_line(text: &str) -> String {
        serde_json::json!({"type": "user", "message": {"role": "user", "content": text}}).to_string()
    }

    fn assistant_line(text: &str) -> String {
        serde_json::json!({"type": "assistant", "message": {"role": "assistant", "content": text}})
            .to_string()
    }

    #[test]
    fn missing_file_yields_no_entries() {
        let entries = read_entries(Path::new("/nonexistent/transcript.jsonl")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn unreadable_path_is_a_transcript_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        let err = read_entries(dir.path()).unwrap_err();
        assert!(matches!(err, TranscriptError::Unreadable(_)));
        assert!(turns_after(dir.path(), -1).is_err());
        assert!(last_turn(dir.path()).is_err());
    }

    #[test]
    fn single_turn_extracts_input_and_output() {
        let (_dir, path) = write_transcript(&[&user_line("add 3 and 4"), &assistant_line("7")]);
        let turns = extract_turns(&read_entries(&path).unwrap());
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].index, 0);
        assert_eq!(turns[0].input, "add 3 and 4");
        assert_eq!(turns[0].output, "7");
    }

    #[test]
    fn contiguous_assistant_records_form_one_turn() {
        let (_dir, path) = write_transcript(&[
            &user_line("question"),
            &assistant_line("part one"),
            &assistant_line("part two"),
            &user_line("follow-up"),
            &assistant_line("answer"),
        ]);
        let turns = extract_turns(&read_entries(&path).unwrap());
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].output, "part one\npart two");
        assert_eq!(turns[1].input, "follow-up");
    }

    #[test]
    fn typed_blocks_flatten_text_and_tools() {
        let line = serde_json::json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": [
                {"type": "text", "text": "running a command"},
                {"type": "tool_use", "name": "Bash", "input": {"command": "ls"}},
                {"type": "thinking", "thinking": "hidden"},
            ]},
        })
        .to_string();
        let (_dir, path) = write_transcript(&[&user_line("go"), &line]);
        let turns = extract_turns(&read_entries(&path).unwrap());
        assert!(turns[0].output.contains("running a command"));
        assert!(turns[0].output.contains("\"tool_use\":\"Bash\""));
        assert!(!turns[0].output.contains("hidden"));
    }

    #[test]
    fn tool_results_are_capped() {
        let big = "z".repeat(20_000);
        let line = serde_json::json!({
            "type": "user",
            "message": {"role": "user", "content": [
                {"type": "tool_result", "content": big},
            ]},
        })
        .to_string();
        let (_dir, path) = write_transcript(&[&line, &assistant_line("ok")]);
        let turns = extract_turns(&read_entries(&path).unwrap());
        assert!(turns[0].input.chars().count() <= TOOL_RESULT_CAP);
    }

    #[test]
    fn truncated_final_line_is_skipped() {
        let (_dir, path) = write_transcript(&[
            &user_line("hi"),
            &assistant_line("hello"),
            r#"{"type": "assistant", "message": {"role": "assist"#,
        ]);
        let turns = extract_turns(&read_entries(&path).unwrap());
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].output, "hello");
    }

    #[test]
    fn turns_after_respects_cursor() {
        let (_dir, path) = write_transcript(&[
            &user_line("one"),
            &assistant_line("1"),
            &user_line("two"),
            &assistant_line("2"),
            &user_line("three"),
            &assistant_line("3"),
        ]);
        let fresh = turns_after(&path, -1).unwrap();
        assert_eq!(fresh.len(), 3);
        let remaining = turns_after(&path, 0).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].index, 1);
        let none = turns_after(&path, 2).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn cursor_past_end_resets() {
        let (_dir, path) = write_transcript(&[&user_line("one"), &assistant_line("1")]);
        // A rotated/shrunken transcript re-emits from the start.
        let turns = turns_after(&path, 9).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].index, 0);
    }

    #[test]
    fn last_turn_returns_the_newest() {
        let (_dir, path) = write_transcript(&[
            &user_line("one"),
            &assistant_line("1"),
            &user_line("two"),
            &assistant_line("final answer"),
        ]);
        assert_eq!(last_turn(&path).unwrap().unwrap().output, "final answer");
    }
}

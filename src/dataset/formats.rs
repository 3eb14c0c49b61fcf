//! Format-specific parsers that normalize raw JSON records into [`Sample`]s.
//!
//! - ChatML: `{"messages": [{"role": "...", "content": "..."}]}`
//! - Alpaca: `{"instruction": "...", "input": "...", "output": "..."}`
//! - ShareGPT: `{"conversations": [{"from": "...", "value": "..."}]}`

use serde_json::{Map, Value};
use thiserror::Error;

use super::{DatasetFormat, Message, Sample, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER};

/// Separator placed between an Alpaca instruction and its input.
pub const ALPACA_INPUT_SEPARATOR: &str = "\n\n";

/// Why a single record could not be normalized.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("records in '{0}' format cannot be parsed directly")]
    UnsupportedShape(DatasetFormat),
}

/// Returns the format implied by a record's keys, if any.
///
/// The first decisive key wins: `messages`, then `instruction`/`output`,
/// then `conversations`.
pub fn sniff_record(record: &Value) -> Option<DatasetFormat> {
    let object = record.as_object()?;
    if object.contains_key("messages") {
        Some(DatasetFormat::ChatMl)
    } else if object.contains_key("instruction") && object.contains_key("output") {
        Some(DatasetFormat::Alpaca)
    } else if object.contains_key("conversations") {
        Some(DatasetFormat::ShareGpt)
    } else {
        None
    }
}

/// Parses a record with the parser matching `format`.
pub fn parse_record(
    format: DatasetFormat,
    record: &Value,
    raw_content: &str,
    index: usize,
) -> Result<Sample, RecordError> {
    match format {
        DatasetFormat::ChatMl | DatasetFormat::JsonlMessages => {
            let mut sample = parse_chatml(record, raw_content, index)?;
            sample.format = format;
            Ok(sample)
        }
        DatasetFormat::Alpaca => parse_alpaca(record, raw_content, index),
        DatasetFormat::ShareGpt => parse_sharegpt(record, raw_content, index),
        DatasetFormat::Parquet | DatasetFormat::HfDataset => {
            Err(RecordError::UnsupportedShape(format))
        }
    }
}

/// Parses a ChatML record. Messages are copied in order.
pub fn parse_chatml(record: &Value, raw_content: &str, index: usize) -> Result<Sample, RecordError> {
    let object = record.as_object().ok_or(RecordError::NotAnObject)?;
    let entries = object
        .get("messages")
        .ok_or(RecordError::MissingField("messages"))?
        .as_array()
        .ok_or(RecordError::InvalidField {
            field: "messages",
            expected: "an array",
        })?;

    let mut messages = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.as_object().ok_or(RecordError::InvalidField {
            field: "messages",
            expected: "an array of objects",
        })?;
        let role = entry
            .get("role")
            .and_then(Value::as_str)
            .ok_or(RecordError::MissingField("role"))?;
        let content = content_text(entry.get("content"), "content")?;
        messages.push(Message::new(role, content));
    }

    Ok(build_sample(
        messages,
        DatasetFormat::ChatMl,
        object,
        &["messages"],
        raw_content,
        index,
    ))
}

/// Parses an Alpaca record into one user turn and one assistant turn.
///
/// A non-empty `input` is appended to the instruction after
/// [`ALPACA_INPUT_SEPARATOR`]. A non-empty `system` field becomes a leading
/// system message.
pub fn parse_alpaca(record: &Value, raw_content: &str, index: usize) -> Result<Sample, RecordError> {
    let object = record.as_object().ok_or(RecordError::NotAnObject)?;
    let instruction = required_str(object, "instruction")?;
    let output = required_str(object, "output")?;
    let input = optional_str(object, "input")?;
    let system = optional_str(object, "system")?;

    let mut messages = Vec::with_capacity(3);
    if let Some(system) = system.filter(|s| !s.is_empty()) {
        messages.push(Message::system(system));
    }
    let prompt = match input {
        Some(input) if !input.is_empty() => {
            format!("{instruction}{ALPACA_INPUT_SEPARATOR}{input}")
        }
        _ => instruction.to_string(),
    };
    messages.push(Message::user(prompt));
    messages.push(Message::assistant(output));

    Ok(build_sample(
        messages,
        DatasetFormat::Alpaca,
        object,
        &["instruction", "input", "output", "system"],
        raw_content,
        index,
    ))
}

/// Parses a ShareGPT record, mapping `from` labels onto chat roles.
pub fn parse_sharegpt(
    record: &Value,
    raw_content: &str,
    index: usize,
) -> Result<Sample, RecordError> {
    let object = record.as_object().ok_or(RecordError::NotAnObject)?;
    let turns = object
        .get("conversations")
        .ok_or(RecordError::MissingField("conversations"))?
        .as_array()
        .ok_or(RecordError::InvalidField {
            field: "conversations",
            expected: "an array",
        })?;

    let mut messages = Vec::with_capacity(turns.len() + 1);
    if let Some(system) = optional_str(object, "system")?.filter(|s| !s.is_empty()) {
        messages.push(Message::system(system));
    }
    for turn in turns {
        let turn = turn.as_object().ok_or(RecordError::InvalidField {
            field: "conversations",
            expected: "an array of objects",
        })?;
        let from = turn
            .get("from")
            .and_then(Value::as_str)
            .ok_or(RecordError::MissingField("from"))?;
        let value = content_text(turn.get("value"), "value")?;
        messages.push(Message::new(sharegpt_role(from), value));
    }

    Ok(build_sample(
        messages,
        DatasetFormat::ShareGpt,
        object,
        &["conversations", "system"],
        raw_content,
        index,
    ))
}

/// Maps a ShareGPT speaker label to a chat role. Unknown labels pass through.
pub fn sharegpt_role(from: &str) -> String {
    match from {
        "human" | "user" => ROLE_USER.to_string(),
        "gpt" | "assistant" | "chatgpt" | "bing" | "bard" => ROLE_ASSISTANT.to_string(),
        "system" => ROLE_SYSTEM.to_string(),
        other => other.to_string(),
    }
}

fn build_sample(
    messages: Vec<Message>,
    format: DatasetFormat,
    object: &Map<String, Value>,
    consumed: &[&str],
    raw_content: &str,
    index: usize,
) -> Sample {
    let metadata = object
        .iter()
        .filter(|(key, _)| !consumed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Sample {
        messages,
        format,
        raw_content: raw_content.to_string(),
        metadata,
        index,
    }
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, RecordError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(RecordError::InvalidField {
            field,
            expected: "a string",
        }),
        None => Err(RecordError::MissingField(field)),
    }
}

fn optional_str<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, RecordError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(RecordError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

/// Extracts message text. Accepts a string, `null`, or an array of
/// OpenAI-style content parts (`{"type": "text", "text": "..."}`).
fn content_text(value: Option<&Value>, field: &'static str) -> Result<String, RecordError> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Ok(String::new()),
        Some(Value::Array(parts)) => {
            let mut text = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    Value::String(s) => text.push(s.as_str()),
                    Value::Object(obj) => {
                        if let Some(s) = obj.get("text").and_then(Value::as_str) {
                            text.push(s);
                        }
                    }
                    _ => {
                        return Err(RecordError::InvalidField {
                            field,
                            expected: "a string or an array of text parts",
                        })
                    }
                }
            }
            Ok(text.join("\n"))
        }
        Some(_) => Err(RecordError::InvalidField {
            field,
            expected: "a string or an array of text parts",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chatml_basic() {
        let raw = json!({
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"}
            ]
        });
        let sample = parse_chatml(&raw, &raw.to_string(), 0).expect("valid chatml");
        assert_eq!(sample.turn_count(), 2);
        assert!(!sample.has_system());
        assert_eq!(sample.raw_content, raw.to_string());
    }

    #[test]
    fn test_parse_chatml_with_system_and_metadata() {
        let raw = json!({
            "id": "abc",
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"}
            ]
        });
        let sample = parse_chatml(&raw, "{}", 4).expect("valid chatml");
        assert!(sample.has_system());
        assert_eq!(sample.index, 4);
        assert_eq!(sample.metadata.get("id"), Some(&json!("abc")));
        assert!(!sample.metadata.contains_key("messages"));
    }

    #[test]
    fn test_parse_chatml_content_parts() {
        let raw = json!({
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "part one"}, {"type": "text", "text": "part two"}]},
                {"role": "assistant", "content": null}
            ]
        });
        let sample = parse_chatml(&raw, "", 0).expect("valid chatml");
        assert_eq!(sample.messages[0].content, "part one\npart two");
        assert_eq!(sample.messages[1].content, "");
    }

    #[test]
    fn test_parse_chatml_missing_role() {
        let raw = json!({"messages": [{"content": "Hi"}]});
        assert_eq!(
            parse_chatml(&raw, "", 0).unwrap_err(),
            RecordError::MissingField("role")
        );
    }

    #[test]
    fn test_parse_alpaca_with_input() {
        let raw = json!({"instruction": "Summarize", "input": "Some text.", "output": "Summary."});
        let sample = parse_alpaca(&raw, "", 0).expect("valid alpaca");
        assert_eq!(sample.turn_count(), 2);
        assert_eq!(sample.messages[0].role, "user");
        assert_eq!(sample.messages[0].content, "Summarize\n\nSome text.");
        assert_eq!(sample.messages[1].role, "assistant");
        assert_eq!(sample.messages[1].content, "Summary.");
    }

    #[test]
    fn test_parse_alpaca_without_input() {
        let raw = json!({"instruction": "Write a haiku.", "input": "", "output": "A haiku here."});
        let sample = parse_alpaca(&raw, "", 0).expect("valid alpaca");
        assert_eq!(sample.messages[0].content, "Write a haiku.");
    }

    #[test]
    fn test_parse_alpaca_missing_output() {
        let raw = json!({"instruction": "Write a haiku."});
        assert_eq!(
            parse_alpaca(&raw, "", 0).unwrap_err(),
            RecordError::MissingField("output")
        );
    }

    #[test]
    fn test_parse_sharegpt_maps_roles() {
        let raw = json!({
            "conversations": [
                {"from": "human", "value": "Hi"},
                {"from": "gpt", "value": "Hello!"},
                {"from": "function_response", "value": "{}"}
            ]
        });
        let sample = parse_sharegpt(&raw, "", 0).expect("valid sharegpt");
        let roles: Vec<&str> = sample.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "function_response"]);
    }

    #[test]
    fn test_sniff_record_first_signal_wins() {
        assert_eq!(
            sniff_record(&json!({"messages": [], "conversations": []})),
            Some(DatasetFormat::ChatMl)
        );
        assert_eq!(
            sniff_record(&json!({"instruction": "a", "output": "b"})),
            Some(DatasetFormat::Alpaca)
        );
        assert_eq!(
            sniff_record(&json!({"conversations": []})),
            Some(DatasetFormat::ShareGpt)
        );
        assert_eq!(sniff_record(&json!({"text": "plain"})), None);
        assert_eq!(sniff_record(&json!("string")), None);
    }

    #[test]
    fn test_parse_record_rejects_container_formats() {
        let raw = json!({"messages": []});
        assert_eq!(
            parse_record(DatasetFormat::Parquet, &raw, "", 0).unwrap_err(),
            RecordError::UnsupportedShape(DatasetFormat::Parquet)
        );
    }

    #[test]
    fn test_parse_record_keeps_jsonl_messages_tag() {
        let raw = json!({"messages": [{"role": "user", "content": "x"}]});
        let sample = parse_record(DatasetFormat::JsonlMessages, &raw, "", 0).expect("valid");
        assert_eq!(sample.format, DatasetFormat::JsonlMessages);
    }
}

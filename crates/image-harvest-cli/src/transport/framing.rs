//! Message framing for newline-delimited JSON.

use image_harvest::Message;

use crate::error::CliResult;

/// Serialize a message to a JSON line (with trailing newline).
pub fn frame_message(message: &Message) -> CliResult<String> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    Ok(json)
}

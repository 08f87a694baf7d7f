//! File id extraction from a successful `send*` response.

use serde_json::Value;

/// Pull the canonical file id out of a successful media upload response.
///
/// Checks, in order: `photo` (the largest rendition by `file_size`; the first of equally large
/// renditions wins), `document`, `video`, `audio`. Each field is read on its own, so a malformed
/// sibling doesn't hide a usable id. Returns `None` when the response carries none of them.
pub fn extract_file_id(payload: &Value) -> Option<String> {
    let message = payload.get("result")?;

    let mut largest: Option<(u64, &str)> = None;
    for size in message.get("photo").and_then(Value::as_array).into_iter().flatten() {
        let Some(file_id) = size.get("file_id").and_then(Value::as_str) else {
            continue;
        };
        let bytes = size.get("file_size").and_then(Value::as_u64).unwrap_or(0);
        match largest {
            Some((best, _)) if bytes <= best => {}
            _ => largest = Some((bytes, file_id)),
        }
    }

    let file_ref = |field: &str| message.get(field)?.get("file_id")?.as_str();

    largest
        .map(|(_, id)| id)
        .or_else(|| file_ref("document"))
        .or_else(|| file_ref("video"))
        .or_else(|| file_ref("audio"))
        .map(str::to_string)
}

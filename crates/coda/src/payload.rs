//! Decoding of reply payloads.
//!
//! Memory contents and register values travel as hex strings; register values
//! are 32 bit big-endian words.

use serde_json::Value;

use crate::error::CodaError;

/// The first result of a reply as a hex encoded byte string.
pub fn bytes(results: &[Value]) -> Result<Vec<u8>, CodaError> {
    let text = results
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| CodaError::unexpected("expected a hex string result"))?;
    hex::decode(text).map_err(|e| CodaError::unexpected(format!("invalid hex payload: {e}")))
}

/// The first result of a reply as consecutive big-endian register values.
pub fn registers(results: &[Value]) -> Result<Vec<u32>, CodaError> {
    let bytes = bytes(results)?;
    if bytes.len() % 4 != 0 {
        return Err(CodaError::unexpected(format!(
            "register payload of {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

/// The first result of a reply as a list of strings.
pub fn strings(results: &[Value]) -> Result<Vec<String>, CodaError> {
    results
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| CodaError::unexpected("expected a list result"))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| CodaError::unexpected(format!("expected a string, got {v}")))
        })
        .collect()
}

use crate::infrastructure::error::Result;
use konnekt_call_core::WireEnvelope;

/// JSON Schema of the signaling envelope as it travels on the channel
pub fn envelope_schema() -> Result<String> {
    let schema = schemars::schema_for!(WireEnvelope);
    Ok(serde_json::to_string_pretty(&schema)?)
}

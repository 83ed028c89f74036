use crate::domain::{IceCandidate, PeerId, SdpType, SessionDescription};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Value of the `type` field on every signaling message
pub const SIGNALING_TYPE: &str = "WebRTC";

/// Operation carried by an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SignalingOp {
    Offer,
    Answer,
    Ice,
}

impl SignalingOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalingOp::Offer => "offer",
            SignalingOp::Answer => "answer",
            SignalingOp::Ice => "ice",
        }
    }

    fn parse(op: &str) -> Option<Self> {
        match op {
            "offer" => Some(SignalingOp::Offer),
            "answer" => Some(SignalingOp::Answer),
            "ice" => Some(SignalingOp::Ice),
            _ => None,
        }
    }
}

impl fmt::Display for SignalingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an envelope, tagged by its op
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Ice(IceCandidate),
}

impl SignalingPayload {
    pub fn op(&self) -> SignalingOp {
        match self {
            SignalingPayload::Offer(_) => SignalingOp::Offer,
            SignalingPayload::Answer(_) => SignalingOp::Answer,
            SignalingPayload::Ice(_) => SignalingOp::Ice,
        }
    }
}

/// One signaling message on the shared channel
///
/// Wire form: `{"type":"WebRTC","op":"offer","id":"<sender>","offer":{..}}`.
/// The payload sits under a key named after the op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingEnvelope {
    pub sender: PeerId,
    pub payload: SignalingPayload,
}

/// Errors raised while decoding an envelope
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("Malformed signaling envelope: {0}")]
    MalformedEnvelope(String),

    /// Valid JSON on the shared channel that is not signaling traffic
    #[error("Not a signaling message (type {0:?})")]
    ForeignMessage(Option<String>),
}

impl CodecError {
    fn malformed(reason: impl Into<String>) -> Self {
        CodecError::MalformedEnvelope(reason.into())
    }
}

impl SignalingEnvelope {
    pub fn new(sender: PeerId, payload: SignalingPayload) -> Self {
        Self { sender, payload }
    }

    pub fn offer(sender: PeerId, offer: SessionDescription) -> Self {
        Self::new(sender, SignalingPayload::Offer(offer))
    }

    pub fn answer(sender: PeerId, answer: SessionDescription) -> Self {
        Self::new(sender, SignalingPayload::Answer(answer))
    }

    pub fn ice(sender: PeerId, candidate: IceCandidate) -> Self {
        Self::new(sender, SignalingPayload::Ice(candidate))
    }

    pub fn op(&self) -> SignalingOp {
        self.payload.op()
    }

    pub fn is_from(&self, peer: &PeerId) -> bool {
        &self.sender == peer
    }

    /// Serialize to the JSON wire form
    pub fn encode(&self) -> Vec<u8> {
        self.to_value().to_string().into_bytes()
    }

    pub fn to_value(&self) -> Value {
        let payload = match &self.payload {
            SignalingPayload::Offer(desc) | SignalingPayload::Answer(desc) => json!({
                "type": desc.sdp_type.as_str(),
                "sdp": desc.sdp,
            }),
            SignalingPayload::Ice(candidate) => {
                let mut ice = Map::new();
                ice.insert("candidate".into(), json!(candidate.candidate));
                if let Some(mid) = &candidate.sdp_mid {
                    ice.insert("sdpMid".into(), json!(mid));
                }
                if let Some(index) = candidate.sdp_m_line_index {
                    ice.insert("sdpMLineIndex".into(), json!(index));
                }
                if let Some(ufrag) = &candidate.username_fragment {
                    ice.insert("usernameFragment".into(), json!(ufrag));
                }
                Value::Object(ice)
            }
        };

        let op = self.op().as_str();
        let mut map = Map::new();
        map.insert("type".into(), json!(SIGNALING_TYPE));
        map.insert("op".into(), json!(op));
        map.insert("id".into(), json!(self.sender.as_str()));
        map.insert(op.into(), payload);
        Value::Object(map)
    }

    /// Parse the JSON wire form
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::malformed(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        let Value::Object(mut map) = value else {
            return Err(CodecError::ForeignMessage(None));
        };

        match map.get("type").and_then(Value::as_str) {
            Some(SIGNALING_TYPE) => {}
            other => return Err(CodecError::ForeignMessage(other.map(str::to_string))),
        }

        let op_name = map
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::malformed("missing op"))?
            .to_string();
        let op = SignalingOp::parse(&op_name)
            .ok_or_else(|| CodecError::malformed(format!("unknown op {:?}", op_name)))?;

        let sender = match map.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => PeerId::new(id),
            _ => return Err(CodecError::malformed("missing sender id")),
        };

        let body = map
            .remove(op.as_str())
            .ok_or_else(|| CodecError::malformed(format!("missing {} payload", op)))?;

        let payload = match op {
            SignalingOp::Offer => SignalingPayload::Offer(description(body, SdpType::Offer)?),
            SignalingOp::Answer => SignalingPayload::Answer(description(body, SdpType::Answer)?),
            SignalingOp::Ice => {
                let candidate: IceCandidate = serde_json::from_value(body)
                    .map_err(|e| CodecError::malformed(format!("invalid ice payload: {}", e)))?;
                SignalingPayload::Ice(candidate)
            }
        };

        Ok(Self { sender, payload })
    }
}

fn description(body: Value, expected: SdpType) -> Result<SessionDescription, CodecError> {
    let desc: SessionDescription = serde_json::from_value(body)
        .map_err(|e| CodecError::malformed(format!("invalid {} payload: {}", expected, e)))?;
    if desc.sdp_type != expected {
        return Err(CodecError::malformed(format!(
            "{} payload carries a {} description",
            expected, desc.sdp_type
        )));
    }
    Ok(desc)
}

/// Schema-only view of the wire form
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireEnvelope {
    /// Always `"WebRTC"`
    #[serde(rename = "type")]
    pub message_type: String,
    pub op: SignalingOp,
    /// Sender id
    pub id: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice: Option<IceCandidate>,
}

use crate::infrastructure::error::Result;
use konnekt_call_core::{CodecError, SignalingEnvelope, SignalingPayload};
use serde::Serialize;
use std::fmt;
use std::io::BufRead;

/// What one captured line turned out to be
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inspection {
    Envelope {
        line: usize,
        op: String,
        sender: String,
        detail: String,
    },
    Foreign {
        line: usize,
        message_type: Option<String>,
    },
    Malformed {
        line: usize,
        reason: String,
    },
}

impl Inspection {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Inspection::Malformed { .. })
    }
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inspection::Envelope {
                line,
                op,
                sender,
                detail,
            } => write!(f, "{:>4}  {:<6} from {:<12} {}", line, op, sender, detail),
            Inspection::Foreign { line, message_type } => write!(
                f,
                "{:>4}  (foreign message, type {})",
                line,
                message_type.as_deref().unwrap_or("none")
            ),
            Inspection::Malformed { line, reason } => {
                write!(f, "{:>4}  ❌ {}", line, reason)
            }
        }
    }
}

/// Decode one line of captured signaling traffic
pub fn inspect_line(line: usize, raw: &str) -> Inspection {
    match SignalingEnvelope::decode(raw.trim().as_bytes()) {
        Ok(envelope) => Inspection::Envelope {
            line,
            op: envelope.op().to_string(),
            sender: envelope.sender.to_string(),
            detail: describe(&envelope.payload),
        },
        Err(CodecError::ForeignMessage(message_type)) => Inspection::Foreign { line, message_type },
        Err(e) => Inspection::Malformed {
            line,
            reason: e.to_string(),
        },
    }
}

/// Decode every non-blank line, one envelope per line
pub fn inspect<R: BufRead>(reader: R) -> Result<Vec<Inspection>> {
    let mut inspections = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        inspections.push(inspect_line(index + 1, &line));
    }
    Ok(inspections)
}

fn describe(payload: &SignalingPayload) -> String {
    match payload {
        SignalingPayload::Offer(description) | SignalingPayload::Answer(description) => {
            let media = description
                .sdp
                .lines()
                .filter(|line| line.starts_with("m="))
                .count();
            format!(
                "{} sdp, {} bytes, {} media sections",
                description.sdp_type,
                description.sdp.len(),
                media
            )
        }
        SignalingPayload::Ice(candidate) => match candidate.info() {
            Ok(info) => format!(
                "candidate {} (foundation {}, priority {})",
                info, info.foundation, info.priority
            ),
            Err(e) => format!("unparsable candidate: {}", e),
        },
    }
}

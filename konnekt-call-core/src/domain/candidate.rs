use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ICE candidate as exchanged on the wire
///
/// Mirrors the browser's `RTCIceCandidateInit`. The raw `candidate` line is
/// what gets transmitted and applied; [`IceCandidateInfo`] is only a parsed
/// view of it for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }

    pub fn with_media_line(mut self, sdp_mid: impl Into<String>, index: u16) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self.sdp_m_line_index = Some(index);
        self
    }

    /// Parse the raw candidate line
    pub fn info(&self) -> Result<IceCandidateInfo, CandidateParseError> {
        IceCandidateInfo::parse(&self.candidate)
    }
}

/// Parsed fields of a candidate line (RFC 8839 `candidate-attribute`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateInfo {
    pub foundation: String,
    pub component: u16,
    pub protocol: String,
    pub priority: u32,
    pub address: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub candidate_type: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CandidateParseError {
    #[error("Candidate line is empty")]
    Empty,

    #[error("Candidate line is missing the {0} field")]
    MissingField(&'static str),

    #[error("Invalid {field} in candidate line: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

impl IceCandidateInfo {
    /// Parse `candidate:<foundation> <component> <protocol> <priority> <address> <port> typ <type> ...`
    ///
    /// The `candidate:` prefix is optional; trailing extension attributes are ignored.
    pub fn parse(raw: &str) -> Result<Self, CandidateParseError> {
        let mut fields = raw.split_whitespace();

        let first = fields.next().ok_or(CandidateParseError::Empty)?;
        let foundation = first.strip_prefix("candidate:").unwrap_or(first);
        if foundation.is_empty() {
            return Err(CandidateParseError::MissingField("foundation"));
        }

        let component = parse_number(fields.next(), "component")?;
        let protocol = fields
            .next()
            .ok_or(CandidateParseError::MissingField("protocol"))?;
        let priority = parse_number(fields.next(), "priority")?;
        let address = fields
            .next()
            .ok_or(CandidateParseError::MissingField("address"))?;
        let port = parse_number(fields.next(), "port")?;

        match fields.next() {
            Some("typ") => {}
            _ => return Err(CandidateParseError::MissingField("typ")),
        }
        let candidate_type = fields
            .next()
            .ok_or(CandidateParseError::MissingField("type"))?;

        Ok(Self {
            foundation: foundation.to_string(),
            component,
            protocol: protocol.to_lowercase(),
            priority,
            address: address.to_string(),
            port,
            candidate_type: candidate_type.to_string(),
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    field: Option<&str>,
    name: &'static str,
) -> Result<T, CandidateParseError> {
    let value = field.ok_or(CandidateParseError::MissingField(name))?;
    value
        .parse()
        .map_err(|_| CandidateParseError::InvalidNumber {
            field: name,
            value: value.to_string(),
        })
}

impl fmt::Display for IceCandidateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} {}",
            self.address, self.port, self.protocol, self.candidate_type
        )
    }
}

use crate::domain::{AnswerOptions, IceServer, OfferOptions, RtcConfiguration};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do with an offer from a party that already has a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfferPolicy {
    /// Drop the offer and keep the existing session
    #[default]
    SingleSessionPerPeer,
    /// Open a new session for every offer
    SessionPerOffer,
}

impl fmt::Display for OfferPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferPolicy::SingleSessionPerPeer => f.write_str("single-session-per-peer"),
            OfferPolicy::SessionPerOffer => f.write_str("session-per-offer"),
        }
    }
}

/// Configuration for a session registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// ICE servers handed to every new peer connection
    pub ice_servers: Vec<IceServer>,

    pub offer_options: OfferOptions,

    pub answer_options: AnswerOptions,

    pub offer_policy: OfferPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::default()],
            offer_options: OfferOptions::default(),
            answer_options: AnswerOptions::default(),
            offer_policy: OfferPolicy::default(),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ice_servers(mut self, ice_servers: Vec<IceServer>) -> Self {
        self.ice_servers = ice_servers;
        self
    }

    pub fn with_offer_options(mut self, options: OfferOptions) -> Self {
        self.offer_options = options;
        self
    }

    pub fn with_answer_options(mut self, options: AnswerOptions) -> Self {
        self.answer_options = options;
        self
    }

    pub fn with_offer_policy(mut self, policy: OfferPolicy) -> Self {
        self.offer_policy = policy;
        self
    }

    pub fn rtc_configuration(&self) -> RtcConfiguration {
        RtcConfiguration::new(self.ice_servers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_STUN_URL;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();

        assert_eq!(config.ice_servers, vec![IceServer::stun(DEFAULT_STUN_URL)]);
        assert_eq!(config.offer_policy, OfferPolicy::SingleSessionPerPeer);
        assert!(config.offer_options.offer_to_receive_video);
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::new()
            .with_ice_servers(vec![])
            .with_offer_policy(OfferPolicy::SessionPerOffer);

        assert!(config.rtc_configuration().ice_servers.is_empty());
        assert_eq!(config.offer_policy, OfferPolicy::SessionPerOffer);
    }

    #[test]
    fn test_policy_serializes_kebab_case() {
        let json = serde_json::to_string(&OfferPolicy::SessionPerOffer).unwrap();
        assert_eq!(json, "\"session-per-offer\"");
    }
}

mod support;

use konnekt_call_core::{
    IceCandidate, NegotiationState, PeerId, SessionDescription, SignalingEnvelope,
};
use konnekt_call_p2p::{CallError, Dispatch, LocalSignalingHub, OfferPolicy, RegistryConfig};
use support::{wait_for_state, wait_until, CallFixture, Participant};

const OFFER_SDP: &str = "v=0\r\no=- 7 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

fn offer_from(peer: &str) -> SignalingEnvelope {
    SignalingEnvelope::offer(PeerId::from(peer), SessionDescription::offer(OFFER_SDP))
}

#[tokio::test]
async fn test_foreign_messages_are_ignored() {
    let fixture = CallFixture::new(1).await;
    let registry = &fixture.caller().registry;

    let chat = br#"{"type":"chat","text":"hello"}"#;
    assert_eq!(registry.handle_inbound_bytes(chat), Ok(Dispatch::Foreign));
    assert_eq!(registry.handle_inbound_bytes(b"[1,2,3]"), Ok(Dispatch::Foreign));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_malformed_envelopes_are_rejected() {
    let fixture = CallFixture::new(1).await;
    let registry = &fixture.caller().registry;

    let cases: [&[u8]; 4] = [
        b"not json",
        br#"{"type":"WebRTC","op":"bogus","id":"X"}"#,
        br#"{"type":"WebRTC","op":"offer","offer":{"type":"offer","sdp":""}}"#,
        br#"{"type":"WebRTC","op":"answer","id":"X"}"#,
    ];

    for bytes in cases {
        let result = registry.handle_inbound_bytes(bytes);
        assert!(
            matches!(result, Err(CallError::MalformedEnvelope(_))),
            "expected malformed for {:?}, got {:?}",
            String::from_utf8_lossy(bytes),
            result
        );
    }
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_own_envelopes_loop_back() {
    let fixture = CallFixture::new(1).await;
    let a = fixture.caller();

    let dispatch = a.registry.handle_inbound(offer_from("A")).unwrap();

    assert_eq!(dispatch, Dispatch::LoopBack);
    assert!(a.registry.is_empty());
}

#[tokio::test]
async fn test_offer_without_local_media_is_refused() {
    let hub = LocalSignalingHub::new();
    let b = Participant::join(&hub, "B", RegistryConfig::default());

    let dispatch = b.registry.handle_inbound(offer_from("X")).unwrap();

    assert_eq!(dispatch, Dispatch::Refused);
    assert!(b.registry.is_empty());
}

#[tokio::test]
async fn test_duplicate_offer_keeps_existing_session() {
    let fixture = CallFixture::new(1).await;
    let registry = &fixture.caller().registry;

    let Dispatch::Created(first) = registry.handle_inbound(offer_from("X")).unwrap() else {
        panic!("first offer should open a session");
    };
    let second = registry.handle_inbound(offer_from("X")).unwrap();

    assert_eq!(second, Dispatch::Duplicate(first));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_session_per_offer_policy_opens_another_session() {
    let config = RegistryConfig::default().with_offer_policy(OfferPolicy::SessionPerOffer);
    let fixture = CallFixture::with_config(1, config).await;
    let registry = &fixture.caller().registry;

    let first = registry.handle_inbound(offer_from("X")).unwrap();
    let second = registry.handle_inbound(offer_from("X")).unwrap();

    assert!(matches!(first, Dispatch::Created(_)));
    assert!(matches!(second, Dispatch::Created(_)));
    assert_ne!(first, second);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_answer_binds_the_waiting_caller() {
    let fixture = CallFixture::new(1).await;
    let registry = &fixture.caller().registry;

    let id = registry.create_outbound().unwrap();
    wait_for_state(registry, id, NegotiationState::WaitAnswer).await;

    let answer = SignalingEnvelope::answer(
        PeerId::from("Z"),
        SessionDescription::answer(OFFER_SDP),
    );
    assert_eq!(
        registry.handle_inbound(answer).unwrap(),
        Dispatch::Routed(vec![id])
    );

    let status = wait_for_state(registry, id, NegotiationState::Completed).await;
    assert_eq!(status.remote_peer, Some(PeerId::from("Z")));

    // A second answerer finds nobody waiting
    let late = SignalingEnvelope::answer(PeerId::from("Y"), SessionDescription::answer(OFFER_SDP));
    assert_eq!(registry.handle_inbound(late).unwrap(), Dispatch::Unroutable);
}

#[tokio::test]
async fn test_answer_from_party_with_live_session_is_not_bound() {
    let fixture = CallFixture::new(1).await;
    let registry = &fixture.caller().registry;

    let outbound = registry.create_outbound().unwrap();
    wait_for_state(registry, outbound, NegotiationState::WaitAnswer).await;

    // Both sides called each other at once
    let Dispatch::Created(inbound) = registry.handle_inbound(offer_from("B")).unwrap() else {
        panic!("offer from B should open a session");
    };
    let answer = SignalingEnvelope::answer(PeerId::from("B"), SessionDescription::answer(OFFER_SDP));
    assert_eq!(registry.handle_inbound(answer).unwrap(), Dispatch::Unroutable);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let bound_to_b: Vec<_> = registry
        .statuses()
        .into_iter()
        .filter(|status| status.remote_peer == Some(PeerId::from("B")))
        .map(|status| status.id)
        .collect();
    assert_eq!(bound_to_b, vec![inbound]);
    assert_eq!(
        registry.state_of(outbound),
        Some(NegotiationState::WaitAnswer)
    );
}

#[tokio::test]
async fn test_unmatched_answer_and_ice_are_unroutable() {
    let fixture = CallFixture::new(1).await;
    let registry = &fixture.caller().registry;

    let answer = SignalingEnvelope::answer(PeerId::from("Z"), SessionDescription::answer(OFFER_SDP));
    let ice = SignalingEnvelope::ice(
        PeerId::from("Z"),
        IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.9 50000 typ host"),
    );

    assert_eq!(registry.handle_inbound(answer).unwrap(), Dispatch::Unroutable);
    assert_eq!(registry.handle_inbound(ice).unwrap(), Dispatch::Unroutable);
}

#[tokio::test]
async fn test_inbound_loop_dispatches_channel_traffic() {
    let fixture = CallFixture::new(1).await;
    let a = fixture.caller();

    fixture.hub.inject(br#"{"type":"presence","online":true}"#.to_vec());
    fixture.hub.inject(b"garbage".to_vec());
    fixture.hub.inject(offer_from("X").encode());

    wait_until(|| a.registry.len() == 1).await;
    let status = &a.registry.statuses()[0];
    assert_eq!(status.remote_peer, Some(PeerId::from("X")));
}

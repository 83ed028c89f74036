use cucumber::{then, when};
use konnekt_call_core::{PeerId, SessionDescription, SignalingEnvelope};
use konnekt_call_p2p::{CallError, Dispatch};
use konnekt_call_tests::CallWorld;

const REMOTE_SDP: &str = "v=0\r\no=- 42 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

// ===== When Steps =====

#[when(expr = "an offer from {string} arrives at {string}")]
async fn offer_arrives(world: &mut CallWorld, from: String, to: String) {
    let offer = SignalingEnvelope::offer(
        PeerId::from(from.as_str()),
        SessionDescription::offer(REMOTE_SDP),
    );
    world.deliver(&to, offer);
}

#[when(expr = "an answer from {string} arrives at {string}")]
async fn answer_arrives(world: &mut CallWorld, from: String, to: String) {
    let answer = SignalingEnvelope::answer(
        PeerId::from(from.as_str()),
        SessionDescription::answer(REMOTE_SDP),
    );
    world.deliver(&to, answer);
}

#[when(expr = "{string} receives the raw message {string}")]
async fn raw_message(world: &mut CallWorld, to: String, raw: String) {
    world.deliver_bytes(&to, raw.as_bytes());
}

// ===== Then Steps =====

fn last_dispatch(world: &CallWorld) -> &Result<Dispatch, CallError> {
    world
        .last_dispatch
        .as_ref()
        .expect("No envelope delivered yet")
}

#[then("the dispatch opened a new session")]
async fn dispatch_created(world: &mut CallWorld) {
    assert!(
        matches!(last_dispatch(world), Ok(Dispatch::Created(_))),
        "got {:?}",
        world.last_dispatch
    );
}

#[then("the dispatch was a duplicate")]
async fn dispatch_duplicate(world: &mut CallWorld) {
    assert!(
        matches!(last_dispatch(world), Ok(Dispatch::Duplicate(_))),
        "got {:?}",
        world.last_dispatch
    );
}

#[then("the dispatch was refused")]
async fn dispatch_refused(world: &mut CallWorld) {
    assert_eq!(last_dispatch(world), &Ok(Dispatch::Refused));
}

#[then("the dispatch was a loop-back")]
async fn dispatch_loop_back(world: &mut CallWorld) {
    assert_eq!(last_dispatch(world), &Ok(Dispatch::LoopBack));
}

#[then("the dispatch was unroutable")]
async fn dispatch_unroutable(world: &mut CallWorld) {
    assert_eq!(last_dispatch(world), &Ok(Dispatch::Unroutable));
}

#[then("the message is rejected as malformed")]
async fn rejected_as_malformed(world: &mut CallWorld) {
    assert!(
        matches!(last_dispatch(world), Err(CallError::MalformedEnvelope(_))),
        "got {:?}",
        world.last_dispatch
    );
}

#[then("the message is ignored as foreign")]
async fn ignored_as_foreign(world: &mut CallWorld) {
    assert_eq!(last_dispatch(world), &Ok(Dispatch::Foreign));
}

use cucumber::{given, then, when};
use konnekt_call_core::{IceConnectionState, PeerId, Role, SignalingOp, SignalingPayload};
use konnekt_call_tests::{eventually, parse_state, CallWorld, WAIT};

// ===== Given Steps =====

#[given(expr = "participants {string} and {string} with local media on a signaling hub")]
async fn two_participants(world: &mut CallWorld, first: String, second: String) {
    world.join(&first, true).await;
    world.join(&second, true).await;
}

#[given(expr = "participant {string} with local media on a signaling hub")]
async fn participant_with_media(world: &mut CallWorld, name: String) {
    world.join(&name, true).await;
}

#[given(expr = "participant {string} without local media on a signaling hub")]
async fn participant_without_media(world: &mut CallWorld, name: String) {
    world.join(&name, false).await;
}

#[given(expr = "{string} places a call")]
async fn given_places_call(world: &mut CallWorld, name: String) {
    place_call(world, &name);
}

#[given(expr = "the call of {string} reaches {string}")]
async fn given_call_reaches(world: &mut CallWorld, name: String, state: String) {
    wait_for_call(world, &name, &state).await;
}

// ===== When Steps =====

#[when(expr = "{string} places a call")]
async fn when_places_call(world: &mut CallWorld, name: String) {
    place_call(world, &name);
}

#[when(expr = "{string} has applied {int} candidates from {string}")]
async fn candidates_applied(world: &mut CallWorld, name: String, count: usize, _from: String) {
    let participant = world.participant(&name);
    let applied = eventually(|| {
        participant
            .factory
            .last()
            .is_some_and(|connection| connection.remote_candidate_count() == count)
    })
    .await;
    assert!(applied, "'{}' never applied {} candidates", name, count);
}

fn place_call(world: &mut CallWorld, name: &str) {
    let id = world
        .participant(name)
        .registry
        .create_outbound()
        .unwrap_or_else(|e| panic!("'{}' could not place a call: {}", name, e));
    world.calls.insert(name.to_string(), id);
}

// ===== Then Steps =====

#[then(expr = "the call of {string} reaches {string}")]
async fn call_reaches(world: &mut CallWorld, name: String, state: String) {
    wait_for_call(world, &name, &state).await;
}

async fn wait_for_call(world: &CallWorld, name: &str, state: &str) {
    let id = world.call_of(name);
    let status = world.wait_for_state(name, id, parse_state(state)).await;
    assert_eq!(status.role, Role::Caller);
}

#[then(expr = "the call of {string} is bound to {string}")]
async fn call_bound_to(world: &mut CallWorld, name: String, remote: String) {
    let id = world.call_of(&name);
    let status = world
        .participant(&name)
        .registry
        .status_of(id)
        .expect("call should be live");
    assert_eq!(status.remote_peer, Some(PeerId::from(remote.as_str())));
}

#[then(expr = "the call of {string} is still in state {string}")]
async fn call_still_in_state(world: &mut CallWorld, name: String, state: String) {
    let id = world.call_of(&name);
    assert_eq!(
        world.participant(&name).registry.state_of(id),
        Some(parse_state(&state))
    );
}

#[then(expr = "{string} has {int} callee session in state {string} bound to {string}")]
async fn callee_sessions(
    world: &mut CallWorld,
    name: String,
    count: usize,
    state: String,
    remote: String,
) {
    let registry = &world.participant(&name).registry;
    assert!(
        eventually(|| registry.len() == count).await,
        "'{}' should have {} sessions",
        name,
        count
    );

    let state = parse_state(&state);
    for id in registry.live_sessions() {
        let status = world.wait_for_state(&name, id, state).await;
        assert_eq!(status.role, Role::Callee);
        assert_eq!(status.remote_peer, Some(PeerId::from(remote.as_str())));
    }
}

#[then(expr = "{string} sent exactly {int} {string} envelope")]
async fn sent_exactly(world: &mut CallWorld, name: String, count: usize, op: String) {
    let op = match op.as_str() {
        "offer" => SignalingOp::Offer,
        "answer" => SignalingOp::Answer,
        "ice" => SignalingOp::Ice,
        other => panic!("Unknown op '{}'", other),
    };

    // Sends run after the state is published, so give them a moment to land
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        world.collect_traffic();
        if world.sent_by(&name, op).len() >= count || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    world.collect_traffic();
    assert_eq!(world.sent_by(&name, op).len(), count);
}

#[then(expr = "the offer sent by {string} carries the local description of its connection")]
async fn offer_matches_local_description(world: &mut CallWorld, name: String) {
    world.collect_traffic();
    let connection = world
        .participant(&name)
        .factory
        .last()
        .expect("a connection was built");
    let applied = connection
        .local_description()
        .expect("local description applied");

    let offers = world.sent_by(&name, SignalingOp::Offer);
    let [(_, offer)] = offers.as_slice() else {
        panic!("expected one offer from '{}', got {}", name, offers.len());
    };
    assert_eq!(offer.payload, SignalingPayload::Offer(applied));
}

#[then(expr = "every candidate from {string} was sent after the answer from {string}")]
async fn candidates_after_answer(world: &mut CallWorld, caller: String, callee: String) {
    world.collect_traffic();

    let answers = world.sent_by(&callee, SignalingOp::Answer);
    let (answer_at, _) = answers.first().expect("an answer was sent");
    let candidates = world.sent_by(&caller, SignalingOp::Ice);

    assert!(!candidates.is_empty());
    assert!(candidates.iter().all(|(at, _)| at > answer_at));
}

#[then(expr = "the candidates from {string} were sent in discovery order")]
async fn candidates_in_order(world: &mut CallWorld, caller: String) {
    world.collect_traffic();

    let foundations: Vec<String> = world
        .sent_by(&caller, SignalingOp::Ice)
        .into_iter()
        .filter_map(|(_, envelope)| match &envelope.payload {
            SignalingPayload::Ice(candidate) => candidate.info().ok(),
            _ => None,
        })
        .map(|info| info.foundation)
        .collect();

    assert_eq!(foundations, vec!["1", "2"]);
}

#[then(expr = "the connection of {string} is connected after {int} remote candidates")]
async fn connection_connected(world: &mut CallWorld, name: String, count: usize) {
    let connection = world
        .participant(&name)
        .factory
        .last()
        .expect("a connection was built");

    let applied = eventually(|| connection.remote_candidate_count() == count).await;
    assert!(
        applied,
        "'{}' applied {} remote candidates, expected {}",
        name,
        connection.remote_candidate_count(),
        count
    );
    assert_eq!(
        connection.ice_connection_state(),
        IceConnectionState::Connected
    );
}

#[then(expr = "{string} has {int} live session(s)")]
async fn live_sessions(world: &mut CallWorld, name: String, count: usize) {
    let registry = &world.participant(&name).registry;
    assert!(
        eventually(|| registry.len() == count).await,
        "'{}' has {} sessions, expected {}",
        name,
        registry.len(),
        count
    );
}

use cucumber::{then, when};
use konnekt_call_core::{IceConnectionState, NegotiationState};
use konnekt_call_tests::{eventually, CallWorld, WAIT};

fn parse_ice_state(name: &str) -> IceConnectionState {
    match name {
        "new" => IceConnectionState::New,
        "checking" => IceConnectionState::Checking,
        "connected" => IceConnectionState::Connected,
        "completed" => IceConnectionState::Completed,
        "failed" => IceConnectionState::Failed,
        "disconnected" => IceConnectionState::Disconnected,
        "closed" => IceConnectionState::Closed,
        other => panic!("Unknown ICE connection state '{}'", other),
    }
}

// ===== When Steps =====

#[when(expr = "the ICE connection of the call of {string} becomes {string}")]
async fn ice_state_changes(world: &mut CallWorld, name: String, state: String) {
    let id = world.call_of(&name);
    let participant = world.participant(&name);
    let ice = parse_ice_state(&state);

    // Subscribe first so the final state is still observable after removal
    let mut status = participant
        .registry
        .watch(id)
        .expect("call should be live");
    participant
        .factory
        .last()
        .expect("a connection was built")
        .set_ice_connection_state(ice);

    if ice.ends_session() {
        let ended = tokio::time::timeout(WAIT, status.wait_for(|s| s.state.is_terminal()))
            .await
            .is_ok();
        assert!(ended, "call of '{}' did not end", name);
        assert_eq!(status.borrow().state, NegotiationState::Closed);
    }
}

#[when(expr = "{string} destroys the call twice")]
async fn destroy_twice(world: &mut CallWorld, name: String) {
    let id = world.call_of(&name);
    let registry = world.participant(&name).registry.clone();

    let first = registry.destroy(id).await;
    let second = registry.destroy(id).await;
    world.destroyed.extend([first, second]);
}

// ===== Then Steps =====

#[then(expr = "the call of {string} is destroyed")]
async fn call_destroyed(world: &mut CallWorld, name: String) {
    let id = world.call_of(&name);
    let registry = &world.participant(&name).registry;

    assert!(
        eventually(|| registry.state_of(id).is_none()).await,
        "call of '{}' is still live",
        name
    );
    let connection = world
        .participant(&name)
        .factory
        .last()
        .expect("a connection was built");
    assert!(eventually(|| connection.is_closed()).await);
}

#[then(expr = "{string} was told exactly once that the call disconnected")]
async fn disconnected_once(world: &mut CallWorld, name: String) {
    let id = world.call_of(&name);
    let observer = &world.participant(&name).observer;

    assert!(eventually(|| observer.disconnects(id) >= 1).await);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(observer.disconnects(id), 1);
}

#[then("the first destroy succeeded and the second was a no-op")]
async fn destroy_results(world: &mut CallWorld) {
    assert_eq!(world.destroyed, vec![true, false]);
}

#![allow(dead_code)]

use nucleon::{Controller, State};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

/// Waits until the controller's state matches `pattern` (see `State::matches`).
pub async fn wait_for_state(controller: &Controller, pattern: &str) -> State {
    let mut receiver = controller.watch_state();
    let pattern = pattern.to_string();
    let state = *tokio::time::timeout(TIMEOUT, receiver.wait_for(|s| s.matches(&pattern)))
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {pattern}, still {}", controller.state()))
        .expect("Controller dropped");
    state
}

/// Waits until nothing is in flight.
pub async fn wait_settled(controller: &Controller) -> State {
    let mut receiver = controller.watch_state();
    let state = *tokio::time::timeout(TIMEOUT, receiver.wait_for(|s| !s.is_busy()))
        .await
        .expect("Timed out waiting for the request to settle")
        .expect("Controller dropped");
    state
}

/// Polls `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "Condition never held");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Gives spawned tasks a chance to run.
pub async fn drain() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

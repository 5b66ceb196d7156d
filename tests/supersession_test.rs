mod common;

use common::{drain, wait_for_state, wait_settled};
use nucleon::transport::mock::{create_mock_transport, expect_request, PendingRequest};
use nucleon::transport::{Gateway, Method, Response};
use nucleon::{Controller, ControllerConfig, Rumour, TransportError, Validator};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;

/// Pattern 2: Hand-answered requests
/// - Every request waits until the test responds, so response order is under test control
fn setup() -> (Controller, mpsc::Receiver<PendingRequest>) {
    let (transport, requests) = create_mock_transport(8);
    let controller = Controller::new(
        ControllerConfig::default(),
        Validator::new(),
        Gateway::new(transport),
        Rumour::new(),
    );
    (controller, requests)
}

async fn next(requests: &mut mpsc::Receiver<PendingRequest>) -> PendingRequest {
    expect_request(requests).await.expect("Expected a request")
}

#[tokio::test]
async fn test_late_response_for_old_href_is_discarded() {
    let (controller, mut requests) = setup();

    controller.set_href("/items/a");
    let a = next(&mut requests).await;
    controller.set_href("/items/b");
    let b = next(&mut requests).await;
    assert_eq!(a.request.url, "/items/a");
    assert_eq!(b.request.url, "/items/b");

    b.respond(Ok(Response::json(200, json!({ "name": "b" }))));
    wait_settled(&controller).await;

    a.respond(Ok(Response::json(200, json!({ "name": "a" }))));
    drain().await;

    assert_eq!(controller.href(), "/items/b");
    assert_eq!(controller.data(), Some(json!({ "name": "b" })));
    assert_eq!(controller.state().to_string(), "idle.snapshot.clean.valid");
}

#[tokio::test]
async fn test_early_response_for_old_href_is_discarded() {
    let (controller, mut requests) = setup();

    controller.set_href("/items/a");
    let a = next(&mut requests).await;
    controller.set_href("/items/b");
    let b = next(&mut requests).await;

    // A answers first and fails; neither the failure nor the data may land.
    a.respond(Err(TransportError::Network("connection reset".to_string())));
    drain().await;
    assert!(controller.in_state("busy.fetching"));
    assert_eq!(controller.last_error(), None);

    b.respond(Ok(Response::json(200, json!({ "name": "b" }))));
    wait_for_state(&controller, "idle.snapshot").await;
    assert_eq!(controller.data(), Some(json!({ "name": "b" })));
}

#[tokio::test]
async fn test_clearing_href_cancels_fetch() {
    let (controller, mut requests) = setup();

    controller.set_href("/items/a");
    let a = next(&mut requests).await;
    controller.set_href("");
    assert_eq!(controller.state().to_string(), "idle.template.clean.invalid");

    a.respond(Ok(Response::json(200, json!({ "name": "a" }))));
    drain().await;
    assert_eq!(controller.data(), None);
    assert!(controller.in_state("idle.template"));
}

#[tokio::test]
async fn test_set_data_supersedes_pending_write() {
    let (controller, mut requests) = setup();
    controller.set_parent("/items");
    controller.edit(json!({ "name": "draft" }));
    controller.submit();

    let post = next(&mut requests).await;
    assert_eq!(post.request.method, Method::Post);

    controller.set_data(Some(json!({ "name": "pushed" })));
    post.respond(Ok(Response::json(201, json!({ "name": "draft", "self": "/items/1" }))));
    drain().await;

    assert_eq!(controller.data(), Some(json!({ "name": "pushed" })));
    assert_eq!(controller.href(), "");
}

#[tokio::test]
async fn test_busy_drops_local_intent() {
    let (controller, mut requests) = setup();
    controller.set_href("/items/a");
    let a = next(&mut requests).await;

    controller.edit(json!({ "name": "x" }));
    controller.undo();
    controller.submit();
    controller.delete();
    controller.refresh();
    assert!(controller.in_state("busy.fetching"));
    assert_eq!(controller.form(), json!({}));

    a.respond(Ok(Response::json(200, json!({ "name": "a" }))));
    wait_settled(&controller).await;

    // No second request was ever issued.
    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn test_dropped_controller_ignores_response() {
    let (controller, mut requests) = setup();
    controller.set_href("/items/a");
    let a = next(&mut requests).await;

    let watcher = controller.watch_state();
    drop(controller);

    a.respond(Ok(Response::json(200, json!({ "name": "a" }))));
    drain().await;
    assert!(watcher.borrow().is_busy());
}

#[tokio::test]
async fn test_refresh_refetches_current_href() {
    let (controller, mut requests) = setup();
    controller.set_href("/items/a");
    next(&mut requests)
        .await
        .respond(Ok(Response::json(200, json!({ "v": 1 }))));
    wait_settled(&controller).await;

    controller.refresh();
    let again = next(&mut requests).await;
    assert_eq!(again.request.url, "/items/a");
    again.respond(Ok(Response::json(200, json!({ "v": 2 }))));
    wait_settled(&controller).await;
    assert_eq!(controller.data(), Some(json!({ "v": 2 })));
}

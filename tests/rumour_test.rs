mod common;

use common::{eventually, wait_settled};
use nucleon::runtime::Nucleus;
use nucleon::transport::memory::BackendActor;
use nucleon::transport::{Method, RequestLog};
use nucleon::{Controller, ControllerConfig, Validator};
use pretty_assertions::assert_eq;
use serde_json::json;

/// Pattern 3: Full System
/// - Real in-memory backend shared by several controllers
/// - A request log counts what actually reached the gateway
fn system() -> (Nucleus, RequestLog) {
    let (mut backend, transport) = BackendActor::new(32);
    backend.seed("/items/1", json!({ "name": "a" }), Some("/items"));
    backend.seed("/items/2", json!({ "name": "b" }), Some("/items"));
    let log = RequestLog::new();
    let nucleus = Nucleus::from_backend(backend, transport).with_interceptor(log.clone());
    (nucleus, log)
}

async fn bound(nucleus: &Nucleus, href: &str, group: &str) -> Controller {
    let controller = nucleus.controller(
        ControllerConfig::default().with_href(href).with_group(group),
        Validator::new(),
    );
    wait_settled(&controller).await;
    assert!(controller.in_state("idle.snapshot.clean"));
    controller
}

#[tokio::test]
async fn test_sibling_adopts_update_without_fetching() {
    let (nucleus, log) = system();
    let p = bound(&nucleus, "/items/1", "g").await;
    let q = bound(&nucleus, "/items/1", "g").await;
    assert_eq!(log.count(Method::Get), 2);

    p.edit(json!({ "name": "changed" }));
    p.submit();
    wait_settled(&p).await;

    eventually(|| q.data().map(|d| d["name"] == "changed").unwrap_or(false)).await;
    assert_eq!(q.state().to_string(), "idle.snapshot.clean.valid");
    assert_eq!(q.form(), p.data().unwrap());
    assert_eq!(log.count(Method::Get), 2);
    assert_eq!(log.count(Method::Patch), 1);

    drop((p, q));
    nucleus.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dirty_sibling_keeps_local_edits() {
    let (nucleus, _log) = system();
    let p = bound(&nucleus, "/items/1", "g").await;
    let q = bound(&nucleus, "/items/1", "g").await;

    q.edit(json!({ "note": "local" }));
    p.edit(json!({ "name": "remote" }));
    p.submit();
    wait_settled(&p).await;

    eventually(|| q.data().map(|d| d["name"] == "remote").unwrap_or(false)).await;
    assert!(q.in_state("idle.snapshot.dirty"));
    assert_eq!(q.form()["note"], "local");
    assert_eq!(q.form()["name"], "a");

    q.undo();
    assert_eq!(q.form()["name"], "remote");
    assert!(q.in_state("idle.snapshot.clean"));
}

#[tokio::test]
async fn test_groups_are_isolated() {
    let (nucleus, _log) = system();
    let p = bound(&nucleus, "/items/1", "g").await;
    let other = bound(&nucleus, "/items/1", "h").await;

    p.edit(json!({ "name": "changed" }));
    p.submit();
    wait_settled(&p).await;
    common::drain().await;

    assert_eq!(other.data().unwrap()["name"], "a");
}

#[tokio::test]
async fn test_delete_clears_siblings() {
    let (nucleus, log) = system();
    let p = bound(&nucleus, "/items/2", "g").await;
    let q = bound(&nucleus, "/items/2", "g").await;

    p.delete();
    wait_settled(&p).await;
    assert!(p.in_state("idle.template.clean"));

    eventually(|| q.data().is_none()).await;
    assert!(q.in_state("idle.template.clean"));
    assert_eq!(q.href(), "");
    assert_eq!(log.count(Method::Delete), 1);
}

#[tokio::test]
async fn test_create_marks_collection_stale() {
    let (nucleus, log) = system();
    let list = bound(&nucleus, "/items", "g").await;
    assert_eq!(list.data().unwrap()["count"], 2);

    let form = nucleus.controller(
        ControllerConfig::default()
            .with_parent("/items")
            .with_group("g"),
        Validator::new(),
    );
    form.edit(json!({ "name": "new" }));
    form.submit();
    wait_settled(&form).await;
    assert_eq!(form.href(), "/items/3");

    eventually(|| list.is_stale()).await;
    // Stale means "re-fetch on next read", not an automatic GET.
    assert_eq!(log.count(Method::Get), 1);

    assert_eq!(list.data().unwrap()["count"], 2);
    assert!(list.in_state("busy.fetching"));
    wait_settled(&list).await;
    assert!(!list.is_stale());
    assert_eq!(list.data().unwrap()["count"], 3);
    assert_eq!(log.count(Method::Get), 2);
}

#[tokio::test]
async fn test_stale_read_keeps_dirty_draft() {
    let (nucleus, log) = system();
    let list = bound(&nucleus, "/items", "g").await;
    list.edit(json!({ "filter": "a" }));

    let form = nucleus.controller(
        ControllerConfig::default()
            .with_parent("/items")
            .with_group("g"),
        Validator::new(),
    );
    form.edit(json!({ "name": "new" }));
    form.submit();
    wait_settled(&form).await;
    eventually(|| list.is_stale()).await;

    // Local edits win over a re-fetch; the flag waits for a clean draft.
    assert_eq!(list.form()["filter"], "a");
    assert!(list.in_state("idle.snapshot.dirty"));
    assert_eq!(log.count(Method::Get), 1);

    list.undo();
    assert_eq!(list.data().unwrap()["count"], 2);
    wait_settled(&list).await;
    assert_eq!(list.data().unwrap()["count"], 3);
    assert_eq!(log.count(Method::Get), 2);
}

#[tokio::test]
async fn test_update_patches_embedded_item() {
    let (nucleus, log) = system();
    let list = bound(&nucleus, "/items", "g").await;
    let card = bound(&nucleus, "/items/2", "g").await;

    card.edit(json!({ "name": "B" }));
    card.submit();
    wait_settled(&card).await;

    eventually(|| list.data().unwrap()["_embedded"]["items"][1]["name"] == "B").await;
    assert!(list.in_state("idle.snapshot.clean"));
    assert_eq!(log.count(Method::Get), 2);
}

#[tokio::test]
async fn test_dropped_controller_unsubscribes() {
    let (nucleus, _log) = system();
    let p = bound(&nucleus, "/items/1", "g").await;
    let q = bound(&nucleus, "/items/1", "g").await;
    assert_eq!(nucleus.rumour().listener_count("g"), 2);

    drop(q);
    assert_eq!(nucleus.rumour().listener_count("g"), 1);

    p.set_group("h");
    assert_eq!(nucleus.rumour().listener_count("g"), 0);
    assert_eq!(nucleus.rumour().listener_count("h"), 1);
}

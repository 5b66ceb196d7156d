//! Demo: a customer form and a customer list sharing one in-memory backend.
//!
//! 1. The form creates a customer; the list, subscribed to the same group, is told its
//!    collection is stale and re-fetches on the next read.
//! 2. A card bound to the new customer edits it; the form, bound to the same URL,
//!    picks up the change without a GET of its own.
//! 3. The card deletes the customer and everything winds down.

use nucleon::runtime::{setup_tracing, Nucleus};
use nucleon::transport::memory::BackendActor;
use nucleon::transport::RequestLog;
use nucleon::validation::rules;
use nucleon::{Controller, ControllerConfig, State, Validator};
use serde_json::json;
use tracing::{info, Instrument};

async fn settle(controller: &Controller) -> Result<State, String> {
    let mut receiver = controller.watch_state();
    let state = receiver
        .wait_for(|s| !s.is_busy())
        .await
        .map_err(|e| e.to_string())?;
    Ok(*state)
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    info!("Starting demo with an in-memory backend");

    let (mut backend, transport) = BackendActor::new(32);
    backend.seed_collection("/customers");
    let log = RequestLog::new();
    let nucleus = Nucleus::from_backend(backend, transport).with_interceptor(log.clone());

    let validator = Validator::new()
        .with_rule(rules::required("name"))
        .with_rule(rules::email("email"));

    let list = nucleus.controller(
        ControllerConfig::default()
            .with_href("/customers")
            .with_group("customers"),
        Validator::new(),
    );
    settle(&list).await?;

    let form = nucleus.controller(
        ControllerConfig::default()
            .with_parent("/customers")
            .with_group("customers"),
        validator.clone(),
    );

    // Create
    let span = tracing::info_span!("create");
    async {
        form.edit(json!({ "email": "alice@" }));
        info!(errors = ?form.errors(), "Draft rejected");
        form.edit(json!({ "name": "Alice", "email": "alice@example.com" }));
        form.submit();
        settle(&form).await
    }
    .instrument(span)
    .await?;
    info!(state = %form.state(), href = %form.href(), "Customer created");

    if list.is_stale() {
        // Reading a stale controller starts the re-fetch.
        let _ = list.data();
        settle(&list).await?;
    }
    info!(count = %list.data().map(|d| d["count"].clone()).unwrap_or_default(), "List refreshed");

    // Update from a second controller
    let card = nucleus.controller(
        ControllerConfig::default()
            .with_href(form.href())
            .with_group("customers"),
        validator,
    );
    settle(&card).await?;

    let span = tracing::info_span!("update");
    async {
        card.edit(json!({ "name": "Alice Liddell" }));
        card.submit();
        settle(&card).await
    }
    .instrument(span)
    .await?;
    info!(form = %form.form(), "Form picked up the change");

    // Delete
    card.delete();
    settle(&card).await?;
    info!(form = %form.state(), card = %card.state(), "Customer deleted");

    info!(requests = log.entries().len(), "Done");

    drop((list, form, card));
    nucleus.shutdown().await?;

    Ok(())
}

//! # In-Memory Hypermedia Backend
//!
//! A [`BackendActor`] owns a map of resources keyed by URL and answers the requests a
//! [`ChannelTransport`] forwards to it, one at a time. Several controllers pointed at the
//! same backend see each other's writes, which makes it the natural fixture for
//! notification tests and demos.
//!
//! ## Semantics
//!
//! * **GET** on a stored resource returns it (200). GET on a known collection returns
//!   `{ _links, _embedded: { items }, count }` (200). Anything else is 404.
//! * **POST** to a collection stores the body at `{collection}/{n}`, stamps its
//!   `_links.self.href`, and returns it (201).
//! * **PATCH** merges the body with [`merge`](crate::buffer::merge) and returns the
//!   result (200).
//! * **DELETE** removes the resource (204).
//! * A non-object body is rejected with 400.
//!
//! ```rust
//! use nucleon::transport::memory::BackendActor;
//! use nucleon::transport::{Gateway, Method, Request};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, transport) = BackendActor::new(16);
//!     tokio::spawn(actor.run());
//!     let gateway = Gateway::new(transport);
//!
//!     let created = gateway
//!         .fetch(Request::new(Method::Post, "/items").with_json(json!({ "name": "a" })))
//!         .await
//!         .unwrap();
//!     assert_eq!(created.status, 201);
//!     assert_eq!(created.body.unwrap()["_links"]["self"]["href"], "/items/1");
//! }
//! ```

use super::mock::{ChannelTransport, PendingRequest};
use super::{Method, Request, Response};
use crate::buffer::merge;
use crate::resource::self_link;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The server half: owns the store and the receiving end of the channel.
///
/// Requests are processed sequentially, so the store needs no locking.
pub struct BackendActor {
    receiver: mpsc::Receiver<PendingRequest>,
    store: HashMap<String, Value>,
    collections: HashMap<String, Vec<String>>,
    next_id: u32,
}

impl BackendActor {
    /// Creates the actor and the transport that talks to it.
    ///
    /// # Arguments
    ///
    /// * `buffer_size` - Capacity of the request channel. When full, senders wait.
    pub fn new(buffer_size: usize) -> (Self, ChannelTransport) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
            collections: HashMap::new(),
            next_id: 1,
        };
        (actor, ChannelTransport::new(sender))
    }

    /// Declares an (initially empty) collection.
    pub fn seed_collection(&mut self, url: impl Into<String>) -> &mut Self {
        self.collections.entry(url.into()).or_default();
        self
    }

    /// Stores a resource before the actor starts. When `collection` is given, the
    /// resource is also listed as one of its members.
    pub fn seed(&mut self, url: impl Into<String>, resource: Value, collection: Option<&str>) -> &mut Self {
        let url = url.into();
        let resource = with_self_link(resource, &url);
        self.store.insert(url.clone(), resource);
        if let Some(collection) = collection {
            self.collections
                .entry(collection.to_string())
                .or_default()
                .push(url);
        }
        self
    }

    /// Processes requests until every transport clone is dropped.
    pub async fn run(mut self) {
        info!(size = self.store.len(), "Backend started");

        while let Some(PendingRequest {
            request,
            respond_to,
        }) = self.receiver.recv().await
        {
            debug!(method = %request.method, url = %request.url, "Request");
            let response = self.handle(request);
            let _ = respond_to.send(Ok(response));
        }

        info!(size = self.store.len(), "Backend shutdown");
    }

    fn handle(&mut self, request: Request) -> Response {
        let Request {
            method, url, body, ..
        } = request;

        match method {
            Method::Get => {
                if let Some(resource) = self.store.get(&url) {
                    return Response::json(200, resource.clone());
                }
                match self.collections.get(&url) {
                    Some(members) => {
                        let items: Vec<Value> = members
                            .iter()
                            .filter_map(|member| self.store.get(member).cloned())
                            .collect();
                        Response::json(
                            200,
                            json!({
                                "_links": { "self": { "href": url } },
                                "_embedded": { "items": items },
                                "count": items.len(),
                            }),
                        )
                    }
                    None => {
                        warn!(%url, "Not found");
                        Response::empty(404)
                    }
                }
            }
            Method::Post => {
                let Some(body) = body.filter(Value::is_object) else {
                    return Response::empty(400);
                };
                // Seeded resources may already occupy low ids.
                let id = loop {
                    let candidate = format!("{}/{}", url.trim_end_matches('/'), self.next_id);
                    self.next_id += 1;
                    if !self.store.contains_key(&candidate) {
                        break candidate;
                    }
                };

                let resource = with_self_link(body, &id);
                self.store.insert(id.clone(), resource.clone());
                self.collections.entry(url).or_default().push(id.clone());
                info!(%id, size = self.store.len(), "Created");
                Response::json(201, resource)
            }
            Method::Patch => {
                let Some(patch) = body.filter(Value::is_object) else {
                    return Response::empty(400);
                };
                let Some(current) = self.store.get_mut(&url) else {
                    warn!(%url, "Not found");
                    return Response::empty(404);
                };
                let merged = with_self_link(merge(current, &patch), &url);
                *current = merged.clone();
                info!(%url, "Updated");
                Response::json(200, merged)
            }
            Method::Delete => {
                if self.store.remove(&url).is_none() {
                    warn!(%url, "Not found");
                    return Response::empty(404);
                }
                for members in self.collections.values_mut() {
                    members.retain(|member| member != &url);
                }
                info!(%url, size = self.store.len(), "Deleted");
                Response::empty(204)
            }
        }
    }
}

/// Stamps `_links.self.href` unless the resource already names itself.
fn with_self_link(mut resource: Value, url: &str) -> Value {
    if self_link(&resource) == Some(url) {
        return resource;
    }
    if let Value::Object(map) = &mut resource {
        let links = map.entry("_links").or_insert_with(|| json!({}));
        if let Value::Object(links) = links {
            links.insert("self".to_string(), json!({ "href": url }));
        }
    }
    resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Gateway;
    use pretty_assertions::assert_eq;

    async fn start(seed: impl FnOnce(&mut BackendActor)) -> Gateway {
        let (mut actor, transport) = BackendActor::new(16);
        seed(&mut actor);
        tokio::spawn(actor.run());
        Gateway::new(transport)
    }

    #[tokio::test]
    async fn test_backend_full_lifecycle() {
        let gateway = start(|actor| {
            actor.seed_collection("/items");
        })
        .await;

        // 1. Create
        let created = gateway
            .fetch(Request::new(Method::Post, "/items").with_json(json!({ "name": "a", "size": 1 })))
            .await
            .unwrap();
        assert_eq!(created.status, 201);
        let url = self_link(created.body.as_ref().unwrap()).unwrap().to_string();
        assert_eq!(url, "/items/1");

        // 2. Update
        let updated = gateway
            .fetch(Request::new(Method::Patch, &url).with_json(json!({ "size": null, "name": "b" })))
            .await
            .unwrap();
        assert_eq!(
            updated.body,
            Some(json!({ "name": "b", "_links": { "self": { "href": "/items/1" } } }))
        );

        // 3. Collection
        let listed = gateway
            .fetch(Request::new(Method::Get, "/items"))
            .await
            .unwrap();
        let listed = listed.body.unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["_embedded"]["items"][0]["name"], "b");

        // 4. Delete
        let deleted = gateway
            .fetch(Request::new(Method::Delete, &url))
            .await
            .unwrap();
        assert_eq!(deleted.status, 204);
        let gone = gateway.fetch(Request::new(Method::Get, &url)).await.unwrap();
        assert_eq!(gone.status, 404);
        let listed = gateway
            .fetch(Request::new(Method::Get, "/items"))
            .await
            .unwrap();
        assert_eq!(listed.body.unwrap()["count"], 0);
    }

    #[tokio::test]
    async fn test_backend_rejects_bad_bodies() {
        let gateway = start(|actor| {
            actor.seed("/items/7", json!({ "name": "seeded" }), Some("/items"));
        })
        .await;

        let rejected = gateway
            .fetch(Request::new(Method::Patch, "/items/7").with_json(json!([1])))
            .await
            .unwrap();
        assert_eq!(rejected.status, 400);

        let seeded = gateway
            .fetch(Request::new(Method::Get, "/items/7"))
            .await
            .unwrap();
        assert_eq!(seeded.body.unwrap()["_links"]["self"]["href"], "/items/7");
    }

    #[tokio::test]
    async fn test_backend_skips_seeded_ids() {
        let gateway = start(|actor| {
            actor.seed("/items/1", json!({ "name": "seeded" }), Some("/items"));
        })
        .await;

        let created = gateway
            .fetch(Request::new(Method::Post, "/items").with_json(json!({ "name": "new" })))
            .await
            .unwrap();
        assert_eq!(created.body.unwrap()["_links"]["self"]["href"], "/items/2");
    }
}

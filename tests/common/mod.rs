#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use labsync::{
    cache::{InMemorySessionStore, SessionStore},
    client::ApiClient,
    events::{Event, EventSender},
    services::{SessionDeps, SessionSettings},
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper harness around a mock backend reachable at `<server>/api/`.
pub struct TestBackend {
    pub server: MockServer,
    pub client: ApiClient,
    pub store: Arc<InMemorySessionStore>,
    pub events: EventSender,
    pub event_rx: mpsc::Receiver<Event>,
}

impl TestBackend {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let client = ApiClient::new(&format!("{}/api/", server.uri()), Duration::from_secs(5))
            .expect("client");
        let (events, event_rx) = EventSender::channel(256);
        Self {
            server,
            client,
            store: Arc::new(InMemorySessionStore::new()),
            events,
            event_rx,
        }
    }

    pub fn deps(&self) -> SessionDeps {
        let store: Arc<dyn SessionStore> = self.store.clone();
        SessionDeps {
            client: self.client.clone(),
            store,
            events: Some(self.events.clone()),
            settings: SessionSettings::default(),
        }
    }

    /// Serves `body` for every listing of `collection`.
    pub async fn serve_listing(&self, collection: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/{}", collection)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Events received so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn catalog_json(code: &str, name: &str) -> Value {
    json!({ "code": code, "name": name, "description": null, "image": null, "in_use": true })
}

pub fn inventory_json(id: i64, code: &str, acquired: &str, existing: &str) -> Value {
    json!({
        "id": id,
        "code": code,
        "lot": format!("L-{}", id),
        "acquired_quantity": acquired,
        "existing_quantity": existing,
        "acquired_on": "2024-03-01",
        "location": "Cabinet 2",
        "notes": null,
        "name": "Joined name",
        "description": "Joined description",
        "image": null,
        "low_stock": false
    })
}

pub fn request_json(id: i64, code: &str, name: &str, on: &str) -> Value {
    json!({ "id": id, "code": code, "name": name, "requested_on": on })
}

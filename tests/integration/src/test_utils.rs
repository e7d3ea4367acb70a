//! Shared fixtures: a mock control-plane server recording deployment
//! applies, and a fully wired application over a temp SQLite database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Json;
use axum::routing::put;
use axum::{body::Body, Router};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use causeway_core::config::Config;
use causeway_gateway::{build_router, AppState};
use causeway_join::{ControlPlaneClient, DeploymentPool};
use causeway_registry::StalenessSweeper;
use causeway_store::Store;
use causeway_token::TokenSigner;

/// In-process control plane that records every deployment apply it sees.
#[derive(Clone)]
pub struct MockControlPlane {
    pub base_url: String,
    applies: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn record_apply(
    State(applies): State<Arc<Mutex<Vec<(String, Value)>>>>,
    Path((_ns, name)): Path<(String, String)>,
    Json(descriptor): Json<Value>,
) -> StatusCode {
    applies.lock().await.push((name, descriptor));
    StatusCode::OK
}

impl MockControlPlane {
    pub async fn spawn() -> Self {
        let applies: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/namespaces/:ns/deployments/:name", put(record_apply))
            .with_state(Arc::clone(&applies));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            applies,
        }
    }

    /// All applies seen so far, in arrival order.
    pub async fn applies(&self) -> Vec<(String, Value)> {
        self.applies.lock().await.clone()
    }

    pub async fn apply_count(&self, name: &str) -> usize {
        self.applies
            .lock()
            .await
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }

    /// Poll until `name` has been applied `count` times or the deadline
    /// passes. The deployment pool submits asynchronously, so assertions
    /// on submission counts go through here.
    pub async fn wait_for_applies(&self, name: &str, count: usize, deadline: Duration) -> bool {
        let started = tokio::time::Instant::now();
        loop {
            if self.apply_count(name).await >= count {
                return true;
            }
            if started.elapsed() > deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// A wired application: real router, real store, mock control plane.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<Mutex<Store>>,
    pub control_plane: MockControlPlane,
    pub config: Config,
    pub db_path: PathBuf,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(adjust: impl FnOnce(&mut Config)) -> Self {
        let db_path =
            std::env::temp_dir().join(format!("causeway_it_{}.db", Uuid::new_v4()));
        let control_plane = MockControlPlane::spawn().await;

        let mut config = Config::default_config();
        config.store.db_path = db_path.to_string_lossy().into_owned();
        config.deploy.api_base = control_plane.base_url.clone();
        config.deploy.request_timeout_secs = 2;
        adjust(&mut config);

        let store = Arc::new(Mutex::new(Store::open(&db_path).unwrap()));
        let client = ControlPlaneClient::new(&config.deploy).unwrap();
        let pool = DeploymentPool::spawn(
            Arc::clone(&store),
            client,
            config.deploy.workers,
            config.deploy.queue_depth,
        );
        let state = Arc::new(AppState::new(
            &config,
            Arc::clone(&store),
            TokenSigner::generate(),
            pool.handle(),
        ));

        Self {
            router: build_router(Arc::clone(&state)),
            state,
            store,
            control_plane,
            config,
            db_path,
        }
    }

    /// A sweeper over this app's store, ticked manually by tests.
    pub fn sweeper(&self) -> StalenessSweeper {
        StalenessSweeper::new(Arc::clone(&self.store), &self.config.registry)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        Self::dispatch(&self.router, request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        Self::dispatch(&self.router, request).await
    }

    async fn dispatch(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register a device through the HTTP surface.
    pub async fn register(&self, device_id: &str) {
        let (status, body) = self
            .post(
                "/register-device",
                serde_json::json!({
                    "deviceId": device_id,
                    "hostname": format!("{device_id}-host"),
                    "ipAddress": "10.8.0.10",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["accepted"], true);
    }

    /// Issue a token through the HTTP surface; returns the response body.
    pub async fn generate_token(&self, device_id: &str, ttl_hours: u32, force: bool) -> Value {
        let (status, body) = self
            .post(
                "/generate-token",
                serde_json::json!({
                    "deviceId": device_id,
                    "nodeName": format!("{device_id}-node"),
                    "ttlHours": ttl_hours,
                    "force": force,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    /// Report a join outcome through the HTTP surface.
    pub async fn report_join(
        &self,
        device_id: &str,
        token_id: &str,
        outcome: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/execute-join",
            serde_json::json!({
                "deviceId": device_id,
                "tokenId": token_id,
                "status": outcome,
                "output": format!("agent output for {device_id}"),
            }),
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        std::fs::remove_file(&self.db_path).ok();
    }
}

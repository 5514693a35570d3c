//! Server crate provides the HTTP adapter of the bakery backend.
//!
//! Every business endpoint lives under `/api` (see [`routes`]); `/health`
//! and `/metrics` sit at the root. Handlers receive the caller identity from
//! gateway headers ([`identity::Identity`]) and map service errors to status
//! codes ([`error::ApiError`]).

pub mod error;
pub mod identity;
pub mod metrics;
pub mod routes;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::routing::get;
use axum::Router;
use repository::Store;
use rust_decimal::Decimal;
use service::{
    AccountService, AccountServiceImpl, CartService, CartServiceImpl, CatalogService,
    CatalogServiceImpl, DeliveryService, DeliveryServiceImpl, OrderService, OrderServiceImpl,
    PasswordHasher, PaymentService, PaymentServiceImpl,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::metrics::Metrics;

/// The business services the handlers call into.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn CatalogService>,
    pub accounts: Arc<dyn AccountService>,
    pub carts: Arc<dyn CartService>,
    pub orders: Arc<dyn OrderService>,
    pub payments: Arc<dyn PaymentService>,
    pub deliveries: Arc<dyn DeliveryService>,
}

impl Services {
    /// Wires every service over one shared store.
    pub fn over<S: Store + 'static>(
        store: Arc<S>,
        hasher: Arc<dyn PasswordHasher>,
        delivery_fee: Decimal,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogServiceImpl::new(store.clone())),
            accounts: Arc::new(AccountServiceImpl::new(store.clone(), hasher)),
            carts: Arc::new(CartServiceImpl::new(store.clone())),
            orders: Arc::new(OrderServiceImpl::new(store.clone(), delivery_fee)),
            payments: Arc::new(PaymentServiceImpl::new(store.clone())),
            deliveries: Arc::new(DeliveryServiceImpl::new(store)),
        }
    }
}

/// Application state shared between request handlers
#[derive(Clone)]
pub struct AppState {
    services: Services,
    metrics: Arc<Metrics>,
}

impl FromRef<AppState> for Services {
    fn from_ref(state: &AppState) -> Self {
        state.services.clone()
    }
}

impl FromRef<AppState> for Arc<Metrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

/// Builds the full router: `/api`, `/health` and `/metrics`, all measured.
pub fn router(services: Services, metrics: Arc<Metrics>) -> Router {
    Router::new()
        .nest("/api", routes::api())
        .route("/health", get(handle_health))
        .route("/metrics", get(metrics::handle_metrics))
        .layer(axum::middleware::from_fn_with_state(
            metrics.clone(),
            metrics::track,
        ))
        .with_state(AppState { services, metrics })
}

async fn handle_health() -> &'static str {
    "OK"
}

/// Server represents the HTTP server of the shop.
pub struct Server {
    port: u16,
    shutdown_timeout: Duration,
    router: Router,
}

impl Server {
    pub fn new(port: u16, services: Services, shutdown_timeout: Duration) -> Result<Self> {
        let metrics = Metrics::new().context("Failed to register metrics")?;
        info!("Initializing HTTP server on port {}", port);
        Ok(Self {
            port,
            shutdown_timeout,
            router: router(services, Arc::new(metrics)),
        })
    }

    /// Serves until Ctrl+C or SIGTERM, then gives in-flight requests up to
    /// the shutdown timeout to finish.
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .with_context(|| format!("Failed to bind to port {}", self.port))?;
        info!("HTTP server listening on port {}", self.port);

        let timeout = self.shutdown_timeout;
        let stopping = Arc::new(Notify::new());
        let signalled = stopping.clone();
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                signalled.notify_one();
            })
            .into_future();

        tokio::select! {
            res = serve => res.context("Server error")?,
            _ = async {
                stopping.notified().await;
                tokio::time::sleep(timeout).await;
            } => {
                warn!(?timeout, "Graceful shutdown timed out, dropping open connections");
            }
        }

        info!("HTTP server shut down");
        Ok(())
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use memstore::MemoryStore;
    use model::DEFAULT_DELIVERY_FEE;
    use serde_json::{Value, json};
    use service::{Caller, SaltedSha256};
    use tower::ServiceExt;

    use crate::identity::{CREDENTIAL_ID_HEADER, ROLE_HEADER, USER_ID_HEADER};

    fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        let services = Services::over(store, Arc::new(SaltedSha256), DEFAULT_DELIVERY_FEE);
        router(services, Arc::new(Metrics::new().unwrap()))
    }

    fn request(method: &str, uri: &str, caller: Option<&Caller>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(c) = caller {
            builder = builder
                .header(USER_ID_HEADER, c.user_id.to_string())
                .header(CREDENTIAL_ID_HEADER, c.credential_id.to_string())
                .header(ROLE_HEADER, c.role.as_str());
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn sign_up(app: &Router, username: &str) -> Caller {
        let (status, _) = call(
            app,
            request(
                "POST",
                "/api/auth/sign-up",
                None,
                Some(json!({
                    "username": username,
                    "password": "correct-horse",
                    "name": "Ana",
                    "last_name": "Gómez",
                    "email": format!("{username}@example.com"),
                    "phone": "3001234567",
                    "address": "Calle 10 #5-20",
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            app,
            request(
                "POST",
                "/api/auth/sign-in",
                None,
                Some(json!({ "username": username, "password": "correct-horse" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body).unwrap()
    }

    fn as_admin(caller: &Caller) -> Caller {
        Caller {
            role: model::Role::Admin,
            ..*caller
        }
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = app();
        let (status, _) = call(&app, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request("GET", "/metrics", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&text).contains("http_requests_total"));
    }

    #[tokio::test]
    async fn test_identity_headers_required() {
        let app = app();
        let (status, body) = call(&app, request("GET", "/api/cart", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("x-user-id"));

        let req = Request::builder()
            .uri("/api/cart")
            .header(USER_ID_HEADER, "not-a-uuid")
            .header(CREDENTIAL_ID_HEADER, uuid::Uuid::new_v4().to_string())
            .header(ROLE_HEADER, "USER")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let app = app();
        sign_up(&app, "ana").await;
        let (status, body) = call(
            &app,
            request(
                "POST",
                "/api/auth/sign-in",
                None,
                Some(json!({ "username": "ana", "password": "wrong-password" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_shopping_flow_over_http() {
        let app = app();
        let customer = sign_up(&app, "ana").await;
        let admin = as_admin(&sign_up(&app, "root").await);

        let (status, _) = call(
            &app,
            request("POST", "/api/categories", Some(&customer), Some(json!({ "name": "Panes" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, category) = call(
            &app,
            request("POST", "/api/categories", Some(&admin), Some(json!({ "name": "Panes" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, product) = call(
            &app,
            request(
                "POST",
                "/api/products",
                Some(&admin),
                Some(json!({
                    "category_id": category["id"],
                    "name": "Pan de bono",
                    "price": "10",
                    "stock": 1,
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, cart) = call(
            &app,
            request(
                "POST",
                "/api/cart/lines",
                Some(&customer),
                Some(json!({ "product_id": product["id"], "quantity": 2 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{cart}");

        let (status, _) = call(
            &app,
            request(
                "POST",
                "/api/cart/lines",
                Some(&customer),
                Some(json!({ "product_id": product["id"], "quantity": 1 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, order) = call(&app, request("POST", "/api/orders", Some(&customer), None)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["status"], "CREATED");
        let order_id = order["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            request("POST", &format!("/api/orders/{order_id}/delivery"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            request(
                "POST",
                &format!("/api/orders/{order_id}/payment"),
                Some(&customer),
                Some(json!({ "method": "CASH" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, payment) = call(
            &app,
            request("POST", &format!("/api/orders/{order_id}/payment/confirm"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payment["status"], "CONFIRMED");

        let (status, _) = call(
            &app,
            request("POST", &format!("/api/orders/{order_id}/payment/confirm"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, delivery) = call(
            &app,
            request("POST", &format!("/api/orders/{order_id}/delivery"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, details) = call(
            &app,
            request("GET", &format!("/api/orders/{order_id}"), Some(&customer), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(details["status"], "EN_ROUTE");
        assert_eq!(details["delivery"]["id"], delivery["id"]);

        let (status, _) = call(
            &app,
            request("POST", &format!("/api/orders/{order_id}/cancel"), Some(&customer), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let app = app();
        let customer = sign_up(&app, "ana").await;
        let uri = format!("/api/orders/{}", uuid::Uuid::new_v4());
        let (status, body) = call(&app, request("GET", &uri, Some(&customer), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }
}

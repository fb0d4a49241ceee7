//! Yard crane supervisor service.
//!
//! Runs the supervisor against a simulated crane and a demo yard, and serves
//! a small HTTP surface for health checks, status and job submission.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yardcrane_control::{
    AllowAll, ControlError, Crane, CraneConfig, CraneControl, CraneControlService, CraneRuntime,
    EnqueueJobRequest, SimulatedDriver, StoreShipmentService,
};
use yardcrane_core::{Dimensions, ItemId, LocationId, OrderId, Position};
use yardcrane_store::{Item, Location, MemoryStore, Order, Store};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    control: CraneControlService,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError(ControlError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControlError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Resolution(_) | ControlError::InvalidTransition { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ControlError::DriverBusy
            | ControlError::DeviceHeld { .. }
            | ControlError::SessionActive
            | ControlError::InterlockActive => StatusCode::CONFLICT,
            ControlError::DriverUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        Self(err)
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "yardcrane-control",
    })
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.control.crane().driver.is_connected() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "device link down")
    }
}

async fn status_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.control.status().await?))
}

async fn enqueue_handler(
    State(state): State<AppState>,
    Json(request): Json<EnqueueJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.control.enqueue_job(request).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/jobs", post(enqueue_handler))
        .with_state(state)
}

/// Populate the store with a small yard so the simulation has work to do.
fn seed_demo_yard(store: &MemoryStore) -> yardcrane_store::Result<()> {
    for id in 1..=4_u64 {
        let column = i32::try_from(id).unwrap_or_default() * 8_000;
        store.put_location(&Location {
            location_id: LocationId::new(id),
            name: format!("ROW-{id:02}"),
            position: Position::new(column, 4_000, 1_000),
            capacity: 8,
        })?;
    }
    for id in 1..=6_u64 {
        let length = if id % 3 == 0 { 7_500 } else { 4_000 };
        store.put_item(&Item {
            item_id: ItemId::new(id),
            reference: format!("COIL-{id:04}"),
            dimensions: Dimensions::new(length, 1_200, 600, 9_000),
            location: Some(LocationId::new(1 + id % 2)),
        })?;
    }
    store.put_order(&Order {
        order_id: OrderId::new(1),
        reference: "SO-1001".into(),
        destination: "Dock 1".into(),
        quantity_ordered: 3,
        quantity_delivered: 0,
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,yardcrane=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting yard crane supervisor");

    let config = CraneConfig::load()?;
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let store = Arc::new(MemoryStore::new());
    seed_demo_yard(&store)?;
    tracing::info!("Seeded demo yard");

    let hazard_codes: Vec<u16> = config.interlock.hazard_inputs.iter().map(|input| input.code).collect();
    let driver = Arc::new(SimulatedDriver::new(config.driver.clone()).with_hazard_inputs(hazard_codes));

    let crane = Crane::new(
        config,
        store.clone(),
        driver,
        Arc::new(AllowAll),
        Arc::new(StoreShipmentService::new(store)),
    );
    let runtime = CraneRuntime::start(crane.clone());

    let state = AppState {
        control: CraneControlService::new(crane),
    };
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown().await;
    Ok(())
}

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use stripefetcher::{client::DEFAULT_BASE_URL, ClientConfig, StripeClient};
use syncstore::{
    config::SyncConfig,
    errors::{FetchError, SyncError},
    sync::{BackfillReport, SyncEngine},
    EntityKind, SyncStore,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Runs the command line interface for the sync service.
pub async fn run_cli() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Serve(args)) => run_server(args).await?,
        Some(Command::Backfill(args)) => run_backfill(args).await?,
        None => {
            println!("No subcommand provided. Use --help to see available commands.");
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Starts the HTTP service that accepts provider events and backfill requests
    Serve(ServeArgs),
    /// Fetches the given ids of one kind that are missing locally
    Backfill(BackfillArgs),
}

#[derive(Args)]
struct StoreArgs {
    /// SQLite file holding the mirrored tables
    #[arg(long, env = "DATABASE_PATH")]
    database_path: PathBuf,
    /// Schema name the tables live under
    #[arg(long, env = "SCHEMA", default_value = "stripe")]
    schema: String,
    /// Secret API key used to fetch missing entities
    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    stripe_secret_key: String,
    /// Base URL of the provider API
    #[arg(long, env = "STRIPE_API_BASE", default_value = DEFAULT_BASE_URL)]
    stripe_api_base: String,
    /// Per-request timeout for provider calls, in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Socket address to bind the service
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    bind: String,
    /// Key callers must present in the x-api-key header
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,
}

#[derive(Args)]
struct BackfillArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Entity kind, by table name (e.g. `customers`, `invoices`)
    #[arg(long, value_parser = parse_kind)]
    kind: EntityKind,
    /// Ids to backfill
    #[arg(required = true)]
    ids: Vec<String>,
}

fn parse_kind(value: &str) -> Result<EntityKind, String> {
    value.parse::<EntityKind>().map_err(|err| err.to_string())
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>, api_key: impl Into<String>) -> Self {
        Self {
            engine,
            api_key: Arc::from(api_key.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or invalid API key")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn from_sync(err: SyncError) -> Self {
        match err {
            SyncError::InvalidArg(msg) | SyncError::Serialization(msg) => ApiError::BadRequest(msg),
            other @ SyncError::Fetch(FetchError::NotFound { .. }) => {
                ApiError::NotFound(other.to_string())
            }
            other @ (SyncError::Fetch(FetchError::Unavailable(_))
            | SyncError::DependencyUnavailable { .. }) => ApiError::BadGateway(other.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(value: SyncError) -> Self {
        ApiError::from_sync(value)
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Provider event envelope. Only the embedded object is synced.
#[derive(Deserialize)]
struct Event {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: JsonValue,
}

#[derive(Serialize)]
struct EventResponse {
    received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<EntityKind>,
    synced: usize,
}

#[derive(Deserialize)]
struct BackfillRequest {
    ids: Vec<String>,
}

#[derive(Serialize)]
struct ExistsResponse {
    exists: bool,
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn open_store(args: &StoreArgs) -> anyhow::Result<SyncStore> {
    let client_config = ClientConfig::new(args.stripe_secret_key.clone())
        .with_base_url(args.stripe_api_base.clone())
        .with_timeout(Duration::from_secs(args.request_timeout_secs));
    let client = StripeClient::new(client_config).context("failed to build provider client")?;

    let config = SyncConfig::new(args.database_path.clone()).with_schema(args.schema.clone());
    SyncStore::new(config, Arc::new(client)).context("failed to open sync store")
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let addr: SocketAddr = args.bind.parse().context("failed to parse bind address")?;
    let store = open_store(&args.store)?;
    info!(
        "Mirroring into schema '{}' of {}",
        store.config.schema,
        args.store.database_path.display()
    );

    let state = AppState::new(store.engine.clone(), args.api_key);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;

    info!("Listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn run_backfill(args: BackfillArgs) -> anyhow::Result<()> {
    let store = open_store(&args.store)?;
    let report = store
        .engine
        .backfill_by_ids(args.kind, &args.ids)
        .await
        .with_context(|| format!("backfill of {} failed", args.kind))?;
    info!(
        "Backfilled {} of {} requested {}",
        report.synced, report.requested, report.kind
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Builds the HTTP router. Everything except `/health` requires the API key.
pub fn build_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/sync/events", post(handle_event))
        .route("/sync/backfill/:kind", post(backfill))
        .route("/sync/:kind/:id", get(exists))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(guarded)
}

async fn require_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented != Some(&*state.api_key) {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// Maps an event type to the kind of its payload. Subscription events are
/// namespaced under `customer.`, so they are matched first.
fn event_kind(event_type: &str) -> Option<EntityKind> {
    const ROUTES: [(&str, EntityKind); 4] = [
        ("customer.subscription.", EntityKind::Subscription),
        ("customer.", EntityKind::Customer),
        ("subscription_schedule.", EntityKind::SubscriptionSchedule),
        ("invoice.", EntityKind::Invoice),
    ];
    ROUTES
        .iter()
        .find(|(prefix, _)| event_type.starts_with(prefix))
        .map(|(_, kind)| *kind)
}

async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> ApiResult<Json<EventResponse>> {
    let event_id = event.id.as_deref().unwrap_or("-");
    let ignored = Json(EventResponse {
        received: true,
        kind: None,
        synced: 0,
    });

    let Some(kind) = event_kind(&event.event_type) else {
        info!("Ignoring event {} of type {}", event_id, event.event_type);
        return Ok(ignored);
    };
    let JsonValue::Object(object) = event.data.object else {
        return Err(ApiError::BadRequest("data.object must be a JSON object".into()));
    };
    // e.g. customer.discount.* carries a discount, not a customer
    if object.get("object").and_then(JsonValue::as_str) != Some(kind.object_name()) {
        warn!(
            "Ignoring event {} of type {}: payload is not a {}",
            event_id,
            event.event_type,
            kind.object_name()
        );
        return Ok(ignored);
    }

    let stored = state.engine.sync_batch(kind, vec![object], true).await?;
    info!("Event {} ({}) synced into {}", event_id, event.event_type, kind);

    Ok(Json(EventResponse {
        received: true,
        kind: Some(kind),
        synced: stored.len(),
    }))
}

fn parse_path_kind(kind: &str) -> ApiResult<EntityKind> {
    kind.parse::<EntityKind>()
        .map_err(|err| ApiError::BadRequest(err.to_string()))
}

async fn backfill(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<BackfillRequest>,
) -> ApiResult<Json<BackfillReport>> {
    let kind = parse_path_kind(&kind)?;
    if body.ids.is_empty() {
        return Err(ApiError::BadRequest("ids must not be empty".into()));
    }
    let report = state.engine.backfill_by_ids(kind, &body.ids).await?;
    Ok(Json(report))
}

async fn exists(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<ExistsResponse>> {
    let kind = parse_path_kind(&kind)?;
    let exists = state.engine.exists_by_id(kind, &id).await?;
    Ok(Json(ExistsResponse { exists }))
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}

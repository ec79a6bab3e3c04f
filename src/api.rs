//! REST API for the stowage engine.
//!
//! Thin adapter over [`Engine`]: handlers deserialize commands, call the
//! engine and map error kinds to status codes. Uses Axum with CORS enabled.

use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::config::ApiConfig;
use crate::engine::Engine;
use crate::error::{CargoError, CargoResult};
use crate::geometry::Orientation;
use crate::import::{
    ContainerRecord, ImportReport, ItemRecord, PlacementRecord, RejectedRecord,
};
use crate::model::{Container, Item, ItemId, Placement};
use crate::planner::{
    PlacedItem, PlacementDecision, PlacementEvent, PlacementReport, UnplacedItem, UnplacedReason,
};
use crate::query::{
    ArrangedItem, ArrangementSnapshot, ContainerArrangement, ContainerFilter, ContainerSummary,
    ContainerUtilization, ItemFilter, PlacementStatistics,
};
use crate::rearrangement::{AppliedMove, Move, RearrangementPlan, RearrangementReason};
use crate::retrieval::{RetrievalAction, RetrievalPlan, RetrievalStep};
use crate::simulation::{ItemUsage, SimulationResult, UsedItem};
use crate::types::{Axis, Dims, Point3};
use crate::waste::{
    ExcludedWaste, ExclusionReason, ReturnMove, WasteItem, WasteManifest, WasteReason,
};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    engine: Arc<RwLock<Engine>>,
}

impl ApiState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Engine>, Response> {
        self.engine.read().map_err(|_| engine_unavailable())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Engine>, Response> {
        self.engine.write().map_err(|_| engine_unavailable())
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>stowplan API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

#[derive(Deserialize, ToSchema)]
pub struct ImportContainersRequest {
    pub containers: Vec<ContainerRecord>,
}

#[derive(Deserialize, ToSchema)]
pub struct ImportItemsRequest {
    pub items: Vec<ItemRecord>,
}

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({ "item_ids": ["000001", "000002"] }))]
pub struct PlacementRequest {
    /// Items to place; empty places every unplaced item.
    #[serde(default)]
    pub item_ids: Vec<ItemId>,
}

#[derive(Deserialize, ToSchema)]
pub struct RetrievalRequest {
    pub item_id: ItemId,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WasteQuery {
    /// Evaluation date; defaults to the simulated date.
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({
    "undocking_container_id": "contD",
    "undocking_date": "2025-06-01",
    "max_weight": 100.0
}))]
pub struct ReturnPlanRequest {
    pub undocking_container_id: String,
    pub undocking_date: NaiveDate,
    pub max_weight: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct CompleteUndockingRequest {
    pub undocking_container_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct CompleteUndockingResponse {
    pub items_removed: usize,
}

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({
    "days": 1,
    "usage": [{ "item_id": "000001", "count": 1 }]
}))]
pub struct SimulationRequest {
    /// Days to advance; exclusive with `target_date`.
    #[serde(default)]
    pub days: Option<i64>,
    /// Date to advance to; exclusive with `days`.
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    /// Uses applied on every simulated day.
    #[serde(default)]
    pub usage: Vec<ItemUsage>,
}

#[derive(Serialize, ToSchema)]
pub struct RearrangementResponse {
    pub moves: Vec<AppliedMove>,
}

#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub moves: Vec<ReturnMove>,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn query_error(err: QueryRejection) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "Invalid query parameters",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "validation_error",
        details,
    )
}

fn engine_unavailable() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "engine_unavailable",
        "A previous request panicked while holding the engine",
    )
}

fn status_for(err: &CargoError) -> StatusCode {
    match err {
        CargoError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CargoError::InvalidRange(_) => StatusCode::BAD_REQUEST,
        CargoError::NotFound { .. } => StatusCode::NOT_FOUND,
        CargoError::CapacityExceeded { .. }
        | CargoError::Overlap { .. }
        | CargoError::NoGeometricFit { .. }
        | CargoError::NotPlaced { .. }
        | CargoError::NoCapacity { .. }
        | CargoError::NothingToRemove { .. }
        | CargoError::StalePlan { .. } => StatusCode::CONFLICT,
    }
}

fn cargo_error(err: CargoError) -> Response {
    error_response(status_for(&err), err.code(), err.to_string())
}

fn respond<T: Serialize>(result: CargoResult<T>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => cargo_error(err),
    }
}

fn parse<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|Json(body)| body).map_err(json_deserialize_error)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_import_containers,
        handle_import_items,
        handle_list_containers,
        handle_list_items,
        handle_place,
        handle_place_stream,
        handle_plan_retrieval,
        handle_retrieve,
        handle_propose_rearrangement,
        handle_apply_rearrangement,
        handle_identify_waste,
        handle_plan_return,
        handle_apply_return,
        handle_complete_undocking,
        handle_advance,
        handle_export_arrangement,
        handle_statistics
    ),
    components(
        schemas(
            ImportContainersRequest,
            ImportItemsRequest,
            ContainerRecord,
            ItemRecord,
            PlacementRecord,
            ImportReport,
            RejectedRecord,
            Container,
            ContainerSummary,
            Item,
            Placement,
            Axis,
            Dims,
            Point3,
            Orientation,
            PlacementRequest,
            PlacementReport,
            PlacementDecision,
            PlacementEvent,
            PlacedItem,
            UnplacedItem,
            UnplacedReason,
            RetrievalRequest,
            RetrievalPlan,
            RetrievalStep,
            RetrievalAction,
            RearrangementPlan,
            RearrangementReason,
            Move,
            AppliedMove,
            WasteItem,
            WasteReason,
            ReturnPlanRequest,
            WasteManifest,
            ReturnMove,
            ExcludedWaste,
            ExclusionReason,
            RearrangementResponse,
            ReturnResponse,
            CompleteUndockingRequest,
            CompleteUndockingResponse,
            SimulationRequest,
            SimulationResult,
            ItemUsage,
            UsedItem,
            ArrangementSnapshot,
            ContainerArrangement,
            ArrangedItem,
            PlacementStatistics,
            ContainerUtilization,
            ErrorResponse
        )
    ),
    tags(
        (name = "import", description = "Bulk import of containers and items"),
        (name = "placement", description = "Placement and retrieval of items"),
        (name = "planning", description = "Rearrangement and waste return planning"),
        (name = "simulation", description = "Simulated clock"),
        (name = "query", description = "Listings, export and statistics")
    )
)]
struct ApiDoc;

/// Builds the router with every endpoint and CORS enabled.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/import/containers", post(handle_import_containers))
        .route("/api/import/items", post(handle_import_items))
        .route("/api/containers", get(handle_list_containers))
        .route("/api/items", get(handle_list_items))
        .route("/api/placement", post(handle_place))
        .route("/api/placement/stream", post(handle_place_stream))
        .route("/api/retrieval/plan", post(handle_plan_retrieval))
        .route("/api/retrieval", post(handle_retrieve))
        .route("/api/rearrangement", get(handle_propose_rearrangement))
        .route("/api/rearrangement/apply", post(handle_apply_rearrangement))
        .route("/api/waste", get(handle_identify_waste))
        .route("/api/waste/return-plan", post(handle_plan_return))
        .route("/api/waste/return-plan/apply", post(handle_apply_return))
        .route(
            "/api/waste/complete-undocking",
            post(handle_complete_undocking),
        )
        .route("/api/simulation/advance", post(handle_advance))
        .route("/api/export/arrangement", get(handle_export_arrangement))
        .route("/api/statistics", get(handle_statistics))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Binds the listener and serves until the server terminates.
pub async fn start_api_server(config: ApiConfig, engine: Engine) -> std::io::Result<()> {
    let app = router(ApiState::new(engine));

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("Local access: http://localhost:{}", config.port());
    }
    info!("Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

#[utoipa::path(
    post,
    path = "/api/import/containers",
    request_body = ImportContainersRequest,
    responses(
        (status = 200, description = "Per-record import outcome", body = ImportReport),
        (status = UNPROCESSABLE_ENTITY, description = "Malformed JSON", body = ErrorResponse)
    ),
    tag = "import"
)]
async fn handle_import_containers(
    State(state): State<ApiState>,
    payload: Result<Json<ImportContainersRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut engine = match state.write() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(Ok(engine.import_containers(request.containers)))
}

#[utoipa::path(
    post,
    path = "/api/import/items",
    request_body = ImportItemsRequest,
    responses(
        (status = 200, description = "Per-record import outcome", body = ImportReport),
        (status = UNPROCESSABLE_ENTITY, description = "Malformed JSON", body = ErrorResponse)
    ),
    tag = "import"
)]
async fn handle_import_items(
    State(state): State<ApiState>,
    payload: Result<Json<ImportItemsRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut engine = match state.write() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(Ok(engine.import_items(request.items)))
}

#[utoipa::path(
    get,
    path = "/api/containers",
    params(ContainerFilter),
    responses(
        (status = 200, description = "Matching containers", body = [ContainerSummary]),
        (status = BAD_REQUEST, description = "Invalid filter", body = ErrorResponse)
    ),
    tag = "query"
)]
async fn handle_list_containers(
    State(state): State<ApiState>,
    filter: Result<Query<ContainerFilter>, QueryRejection>,
) -> Response {
    let Query(filter) = match filter {
        Ok(filter) => filter,
        Err(err) => return query_error(err),
    };
    let engine = match state.read() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(engine.list_containers(&filter))
}

#[utoipa::path(
    get,
    path = "/api/items",
    params(ItemFilter),
    responses(
        (status = 200, description = "Matching items", body = [Item]),
        (status = BAD_REQUEST, description = "Invalid filter", body = ErrorResponse)
    ),
    tag = "query"
)]
async fn handle_list_items(
    State(state): State<ApiState>,
    filter: Result<Query<ItemFilter>, QueryRejection>,
) -> Response {
    let Query(filter) = match filter {
        Ok(filter) => filter,
        Err(err) => return query_error(err),
    };
    let engine = match state.read() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(engine.list_items(&filter))
}

#[utoipa::path(
    post,
    path = "/api/placement",
    request_body = PlacementRequest,
    responses(
        (status = 200, description = "Placed and unplaceable items", body = PlacementReport),
        (status = NOT_FOUND, description = "Unknown item", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "placement"
)]
async fn handle_place(
    State(state): State<ApiState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut engine = match state.write() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    info!(items = request.item_ids.len(), "placement request");
    respond(engine.place_batch(&request.item_ids))
}

/// Streams placement events as Server-Sent Events while the batch runs.
#[utoipa::path(
    post,
    path = "/api/placement/stream",
    request_body = PlacementRequest,
    responses(
        (
            status = 200,
            description = "Streams placement events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "placement"
)]
async fn handle_place_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);
    let engine = Arc::clone(&state.engine);

    tokio::task::spawn_blocking(move || {
        let Ok(mut engine) = engine.write() else {
            error!("engine lock poisoned, placement stream aborted");
            let event = json!({
                "type": "Error",
                "code": "engine_unavailable",
                "message": "A previous request panicked while holding the engine"
            });
            let _ = tx.blocking_send(event.to_string());
            return;
        };
        let outcome = engine.place_batch_with_progress(&request.item_ids, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver only means the client went away.
                let _ = tx.blocking_send(json);
            }
        });
        if let Err(err) = outcome {
            error!(%err, "streamed placement failed");
            let event = json!({ "type": "Error", "code": err.code(), "message": err.to_string() });
            let _ = tx.blocking_send(event.to_string());
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/api/retrieval/plan",
    request_body = RetrievalRequest,
    responses(
        (status = 200, description = "Steps needed to reach the item", body = RetrievalPlan),
        (status = NOT_FOUND, description = "Unknown item", body = ErrorResponse),
        (status = CONFLICT, description = "Item is not placed", body = ErrorResponse)
    ),
    tag = "placement"
)]
async fn handle_plan_retrieval(
    State(state): State<ApiState>,
    payload: Result<Json<RetrievalRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let engine = match state.read() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(engine.plan_retrieval(&request.item_id))
}

#[utoipa::path(
    post,
    path = "/api/retrieval",
    request_body = RetrievalRequest,
    responses(
        (status = 200, description = "Executed retrieval plan", body = RetrievalPlan),
        (status = NOT_FOUND, description = "Unknown item", body = ErrorResponse),
        (status = CONFLICT, description = "Item is not placed", body = ErrorResponse)
    ),
    tag = "placement"
)]
async fn handle_retrieve(
    State(state): State<ApiState>,
    payload: Result<Json<RetrievalRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut engine = match state.write() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(engine.retrieve(&request.item_id))
}

#[utoipa::path(
    get,
    path = "/api/rearrangement",
    responses(
        (status = 200, description = "Proposed plans", body = [RearrangementPlan])
    ),
    tag = "planning"
)]
async fn handle_propose_rearrangement(State(state): State<ApiState>) -> Response {
    let engine = match state.read() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(Ok(engine.propose_rearrangement()))
}

#[utoipa::path(
    post,
    path = "/api/rearrangement/apply",
    request_body = RearrangementPlan,
    responses(
        (status = 200, description = "Moves as carried out", body = RearrangementResponse),
        (status = CONFLICT, description = "Plan is stale or a move failed", body = ErrorResponse)
    ),
    tag = "planning"
)]
async fn handle_apply_rearrangement(
    State(state): State<ApiState>,
    payload: Result<Json<RearrangementPlan>, JsonRejection>,
) -> Response {
    let plan = match parse(payload) {
        Ok(plan) => plan,
        Err(response) => return response,
    };
    let mut engine = match state.write() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(
        engine
            .apply_rearrangement(&plan)
            .map(|moves| RearrangementResponse { moves }),
    )
}

#[utoipa::path(
    get,
    path = "/api/waste",
    params(WasteQuery),
    responses(
        (status = 200, description = "Waste items", body = [WasteItem])
    ),
    tag = "planning"
)]
async fn handle_identify_waste(
    State(state): State<ApiState>,
    query: Result<Query<WasteQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(err) => return query_error(err),
    };
    let engine = match state.read() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    let date = query.date.unwrap_or_else(|| engine.current_date());
    respond(Ok(engine.identify_waste_at(date)))
}

#[utoipa::path(
    post,
    path = "/api/waste/return-plan",
    request_body = ReturnPlanRequest,
    responses(
        (status = 200, description = "Waste manifest", body = WasteManifest),
        (status = BAD_REQUEST, description = "Undocking date in the past", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown container", body = ErrorResponse),
        (status = CONFLICT, description = "No waste fits the budget", body = ErrorResponse)
    ),
    tag = "planning"
)]
async fn handle_plan_return(
    State(state): State<ApiState>,
    payload: Result<Json<ReturnPlanRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let engine = match state.read() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(engine.plan_return(
        &request.undocking_container_id,
        request.undocking_date,
        request.max_weight,
    ))
}

#[utoipa::path(
    post,
    path = "/api/waste/return-plan/apply",
    request_body = WasteManifest,
    responses(
        (status = 200, description = "Moves as carried out", body = ReturnResponse),
        (status = CONFLICT, description = "Manifest is stale or a move failed", body = ErrorResponse)
    ),
    tag = "planning"
)]
async fn handle_apply_return(
    State(state): State<ApiState>,
    payload: Result<Json<WasteManifest>, JsonRejection>,
) -> Response {
    let manifest = match parse(payload) {
        Ok(manifest) => manifest,
        Err(response) => return response,
    };
    let mut engine = match state.write() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(
        engine
            .apply_return(&manifest)
            .map(|moves| ReturnResponse { moves }),
    )
}

#[utoipa::path(
    post,
    path = "/api/waste/complete-undocking",
    request_body = CompleteUndockingRequest,
    responses(
        (status = 200, description = "Items removed", body = CompleteUndockingResponse),
        (status = NOT_FOUND, description = "Unknown container", body = ErrorResponse),
        (status = CONFLICT, description = "Container is empty", body = ErrorResponse)
    ),
    tag = "planning"
)]
async fn handle_complete_undocking(
    State(state): State<ApiState>,
    payload: Result<Json<CompleteUndockingRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut engine = match state.write() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(
        engine
            .complete_undocking(&request.undocking_container_id)
            .map(|items_removed| CompleteUndockingResponse { items_removed }),
    )
}

#[utoipa::path(
    post,
    path = "/api/simulation/advance",
    request_body = SimulationRequest,
    responses(
        (status = 200, description = "Simulation outcome", body = SimulationResult),
        (status = BAD_REQUEST, description = "Invalid range", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown item in usage list", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "simulation"
)]
async fn handle_advance(
    State(state): State<ApiState>,
    payload: Result<Json<SimulationRequest>, JsonRejection>,
) -> Response {
    let request = match parse(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut engine = match state.write() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    match (request.days, request.target_date) {
        (Some(days), None) => respond(engine.advance(days, &request.usage)),
        (None, Some(target)) => respond(engine.advance_to(target, &request.usage)),
        _ => validation_error("Exactly one of 'days' and 'target_date' must be given"),
    }
}

#[utoipa::path(
    get,
    path = "/api/export/arrangement",
    responses(
        (status = 200, description = "Current arrangement", body = ArrangementSnapshot)
    ),
    tag = "query"
)]
async fn handle_export_arrangement(State(state): State<ApiState>) -> Response {
    let engine = match state.read() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(Ok(engine.export_arrangement()))
}

#[utoipa::path(
    get,
    path = "/api/statistics",
    responses(
        (status = 200, description = "Placement statistics", body = PlacementStatistics)
    ),
    tag = "query"
)]
async fn handle_statistics(State(state): State<ApiState>) -> Response {
    let engine = match state.read() {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    respond(Ok(engine.statistics()))
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

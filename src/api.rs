//! REST API for the load planner.
//!
//! Provides HTTP endpoints for the web UI: planning, free-text parsing, saved
//! projects and the message board. Uses Axum as the web framework and supports CORS.

use std::convert::Infallible;
use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{ReceiverStream, WatchStream};
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::board::{
    BoardEntry, BoardError, BoardService, BoardThread, NewBoardMessage, RECENT_LIMIT, ReplyRequest,
};
use crate::config::ApiConfig;
use crate::model::{CATALOG, CargoItem, Container, ContainerKind, ContainerType};
use crate::parse::{BulkImport, ParsedDims, RowDraft, bulk_import, parse_free_text};
use crate::planner::{
    ContainerCounts, PlanSummary, PlanningConfig, PlanningError, PlanningResult, RowInput,
    expand_rows, plan, plan_with_progress,
};
use crate::projects::{
    ProjectDocument, ProjectError, ProjectService, ProjectSummary, SaveProjectRequest, SavedRow,
};
use crate::store::{Document, Listing};
use crate::types::LengthUnit;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    planning: PlanningConfig,
    projects: Arc<ProjectService>,
    board: Arc<BoardService>,
}

impl ApiState {
    pub fn new(planning: PlanningConfig, projects: ProjectService, board: BoardService) -> Self {
        Self {
            planning,
            projects: Arc::new(projects),
            board: Arc::new(board),
        }
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>Load Planner API Docs</title>
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
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Embedded Web Assets (HTML, CSS, JS)
#[derive(RustEmbed)]
#[folder = "web/"]
struct WebAssets;

/// Request body for the planning endpoints.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "rows": [
            {"rowId": "0", "lengthRaw": "1000", "widthRaw": "500", "heightRaw": "500", "quantityRaw": "10", "unit": "mm", "colorHex": "#FFadad"},
            {"rowId": "1", "lengthRaw": "13", "widthRaw": "2", "heightRaw": "2", "quantityRaw": "1", "unit": "m", "colorHex": "#FFd6a5"}
        ],
        "drafts": [{"text": "1200x800x1000 4", "unit": "mm"}]
    })
)]
pub struct PlanRequest {
    #[serde(default)]
    pub rows: Vec<RowInput>,
    /// Free-text rows, numbered after `rows`
    #[serde(default)]
    pub drafts: Vec<RowDraft>,
}

impl PlanRequest {
    fn into_rows(self) -> Vec<RowInput> {
        let offset = self.rows.len();
        let mut rows = self.rows;
        rows.extend(
            self.drafts
                .iter()
                .enumerate()
                .map(|(idx, draft)| draft.to_row_input(offset + idx)),
        );
        rows
    }
}

/// Planning result together with its aggregated figures.
#[derive(Serialize, ToSchema)]
pub struct PlanResponse {
    pub result: PlanningResult,
    pub summary: PlanSummary,
}

impl PlanResponse {
    fn from_result(result: PlanningResult) -> Self {
        let summary = result.summary();
        Self { result, summary }
    }
}

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({ "text": "1200x800x1000 4" }))]
pub struct ParseRequest {
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({ "text": "1200x800x1000 4\n2500 1500 1100", "unit": "mm" }))]
pub struct BulkImportRequest {
    pub text: String,
    #[serde(default)]
    pub unit: LengthUnit,
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

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn not_found(details: impl Into<String>) -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found", details)
}

fn storage_error(details: impl Into<String>) -> Response {
    let details = details.into();
    tracing::error!(%details, "storage operation failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Storage failure",
        details,
    )
}

fn planning_error(err: PlanningError) -> Response {
    validation_error(err.to_string())
}

fn project_error(err: ProjectError) -> Response {
    match err {
        ProjectError::MissingName | ProjectError::NothingToSave => {
            validation_error(err.to_string())
        }
        ProjectError::NotFound(_) => not_found(err.to_string()),
        ProjectError::Store(store) => storage_error(store.to_string()),
    }
}

fn board_error(err: BoardError) -> Response {
    match err {
        BoardError::MissingNickname | BoardError::MissingText => {
            validation_error(err.to_string())
        }
        BoardError::NotFound(_) => not_found(err.to_string()),
        BoardError::Store(store) => storage_error(store.to_string()),
    }
}

fn parse_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    match payload {
        Ok(Json(payload)) => Ok(payload),
        Err(err) => Err(json_deserialize_error(err)),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_plan,
        handle_plan_stream,
        handle_parse,
        handle_bulk_import,
        handle_catalog,
        list_projects,
        save_project,
        load_project,
        delete_project,
        stream_projects,
        list_board,
        post_board_message,
        reply_board_message,
        delete_board_message,
        board_threads,
        board_ticker,
        stream_board
    ),
    components(
        schemas(
            PlanRequest,
            PlanResponse,
            RowInput,
            RowDraft,
            PlanningResult,
            PlanSummary,
            ContainerCounts,
            Container,
            CargoItem,
            ContainerKind,
            ContainerType,
            LengthUnit,
            ParseRequest,
            ParsedDims,
            BulkImportRequest,
            BulkImport,
            SaveProjectRequest,
            SavedRow,
            ProjectDocument,
            ProjectSummary,
            NewBoardMessage,
            ReplyRequest,
            BoardEntry,
            BoardThread,
            ErrorResponse
        )
    ),
    tags(
        (name = "planning", description = "Container load planning"),
        (name = "projects", description = "Saved projects"),
        (name = "board", description = "Public message board")
    )
)]
struct ApiDoc;

/// Builds the application router.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        // Planning
        .route("/plan", post(handle_plan))
        .route("/plan_stream", post(handle_plan_stream))
        .route("/parse", post(handle_parse))
        .route("/bulk_import", post(handle_bulk_import))
        .route("/catalog", get(handle_catalog))
        // Projects
        .route("/projects", get(list_projects).post(save_project))
        .route("/projects/{name}", get(load_project).delete(delete_project))
        .route("/projects_stream", get(stream_projects))
        // Board
        .route("/board", get(list_board).post(post_board_message))
        .route("/board/threads", get(board_threads))
        .route("/board/ticker", get(board_ticker))
        .route("/board/{id}", delete(delete_board_message))
        .route("/board/{id}/replies", post(reply_board_message))
        .route("/board_stream", get(stream_board))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        // Web-UI (embedded)
        .route("/", get(serve_index))
        .route("/{*path}", get(serve_static))
        .layer(cors)
        .with_state(state)
}

/// Binds the configured address and serves until the server terminates.
pub async fn start_api_server(config: ApiConfig, state: ApiState) -> std::io::Result<()> {
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        "Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        tracing::info!("Local access: http://localhost:{}", config.port());
    }
    tracing::info!("Documentation: /docs and /docs/openapi.json");

    axum::serve(listener, router(state)).await
}

/// Handler for POST /plan.
///
/// Expands the rows into single units and assigns them to containers.
#[utoipa::path(
    post,
    path = "/plan",
    request_body = PlanRequest,
    responses(
        (status = 200, description = "Planning result", body = PlanResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or no valid rows",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let rows = request.into_rows();
    tracing::info!(rows = rows.len(), "new plan request");
    let config = state.planning;
    let outcome = tokio::task::spawn_blocking(move || plan(&rows, config)).await;

    match outcome {
        Ok(Ok(result)) => {
            let response = PlanResponse::from_result(result);
            tracing::info!(
                containers = response.summary.container_count,
                items = response.summary.item_count,
                oversized = response.summary.oversized_count,
                "plan finished"
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(err)) => planning_error(err),
        Err(err) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Planning failed",
            err.to_string(),
        ),
    }
}

/// Handler for POST /plan_stream (SSE).
///
/// Streams plan events as they happen. The last event has type `Result` and
/// carries the complete planning result.
#[utoipa::path(
    post,
    path = "/plan_stream",
    request_body = PlanRequest,
    responses(
        (
            status = 200,
            description = "Streams plan events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or no valid rows",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let rows = request.into_rows();
    let config = state.planning;
    match expand_rows(&rows, &config) {
        Ok(items) if items.is_empty() => return planning_error(PlanningError::NoValidItems),
        Ok(_) => {}
        Err(err) => return planning_error(err),
    }

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let progress_tx = tx.clone();
        let outcome = plan_with_progress(&rows, config, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver means the client went away; later events are dropped.
                let _ = progress_tx.blocking_send(json);
            }
        });
        if let Ok(result) = outcome {
            let summary = result.summary();
            let payload = json!({ "type": "Result", "result": result, "summary": summary });
            let _ = tx.blocking_send(payload.to_string());
        }
    });

    let stream =
        ReceiverStream::new(rx).map(|msg| Ok::<_, Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(keep_alive())
        .into_response()
}

/// Handler for POST /parse.
#[utoipa::path(
    post,
    path = "/parse",
    request_body = ParseRequest,
    responses(
        (status = 200, description = "Recognised dimensions and quantity", body = ParsedDims),
        (status = UNPROCESSABLE_ENTITY, description = "Fewer than three numbers", body = ErrorResponse)
    ),
    tag = "planning"
)]
async fn handle_parse(payload: Result<Json<ParseRequest>, JsonRejection>) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match parse_free_text(&request.text) {
        Some(parsed) => (StatusCode::OK, Json(parsed)).into_response(),
        None => validation_error("Expected at least three numbers (length, width, height)"),
    }
}

/// Handler for POST /bulk_import.
#[utoipa::path(
    post,
    path = "/bulk_import",
    request_body = BulkImportRequest,
    responses(
        (status = 200, description = "Editor rows in metres", body = BulkImport),
        (status = UNPROCESSABLE_ENTITY, description = "No text supplied", body = ErrorResponse)
    ),
    tag = "planning"
)]
async fn handle_bulk_import(payload: Result<Json<BulkImportRequest>, JsonRejection>) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match bulk_import(&request.text, request.unit) {
        Ok(import) => (StatusCode::OK, Json(import)).into_response(),
        Err(err) => validation_error(err.to_string()),
    }
}

/// Handler for GET /catalog.
#[utoipa::path(
    get,
    path = "/catalog",
    responses((status = 200, description = "Container types", body = [ContainerType])),
    tag = "planning"
)]
async fn handle_catalog() -> Response {
    Json(CATALOG.as_slice()).into_response()
}

#[utoipa::path(
    get,
    path = "/projects",
    responses((status = 200, description = "Saved projects, newest first", body = [ProjectSummary])),
    tag = "projects"
)]
async fn list_projects(State(state): State<ApiState>) -> Response {
    Json(state.projects.list().await).into_response()
}

#[utoipa::path(
    post,
    path = "/projects",
    request_body = SaveProjectRequest,
    responses(
        (status = 200, description = "Project saved", body = ProjectDocument),
        (status = UNPROCESSABLE_ENTITY, description = "Missing name or content", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "projects"
)]
async fn save_project(
    State(state): State<ApiState>,
    payload: Result<Json<SaveProjectRequest>, JsonRejection>,
) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.projects.save(request).await {
        Ok(doc) => (StatusCode::OK, Json(doc)).into_response(),
        Err(err) => project_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{name}",
    params(("name" = String, Path, description = "Project name")),
    responses(
        (status = 200, description = "Saved project with its planning snapshot", body = ProjectDocument),
        (status = NOT_FOUND, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "projects"
)]
async fn load_project(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.projects.load(&name).await {
        Ok(doc) => Json(doc).into_response(),
        Err(err) => project_error(err),
    }
}

#[utoipa::path(
    delete,
    path = "/projects/{name}",
    params(("name" = String, Path, description = "Project name")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = NOT_FOUND, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "projects"
)]
async fn delete_project(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.projects.delete(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => project_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/projects_stream",
    responses((
        status = 200,
        description = "Project list, resent on every change",
        content_type = "text/event-stream",
        body = String
    )),
    tag = "projects"
)]
async fn stream_projects(State(state): State<ApiState>) -> Response {
    listing_stream(state.projects.subscribe(), |docs| {
        docs.iter().map(ProjectSummary::from).collect::<Vec<_>>()
    })
}

#[utoipa::path(
    get,
    path = "/board",
    responses((status = 200, description = "Newest board entries", body = [BoardEntry])),
    tag = "board"
)]
async fn list_board(State(state): State<ApiState>) -> Response {
    Json(state.board.recent().await).into_response()
}

#[utoipa::path(
    post,
    path = "/board",
    request_body = NewBoardMessage,
    responses(
        (status = 200, description = "Message posted", body = BoardEntry),
        (status = UNPROCESSABLE_ENTITY, description = "Missing nickname or text", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown parent", body = ErrorResponse)
    ),
    tag = "board"
)]
async fn post_board_message(
    State(state): State<ApiState>,
    payload: Result<Json<NewBoardMessage>, JsonRejection>,
) -> Response {
    let message = match parse_json(payload) {
        Ok(message) => message,
        Err(response) => return response,
    };

    match state.board.post(message).await {
        Ok(entry) => Json(entry).into_response(),
        Err(err) => board_error(err),
    }
}

#[utoipa::path(
    post,
    path = "/board/{id}/replies",
    params(("id" = String, Path, description = "Parent message id")),
    request_body = ReplyRequest,
    responses(
        (status = 200, description = "Reply posted", body = BoardEntry),
        (status = UNPROCESSABLE_ENTITY, description = "Missing nickname or text", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown parent", body = ErrorResponse)
    ),
    tag = "board"
)]
async fn reply_board_message(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<ReplyRequest>, JsonRejection>,
) -> Response {
    let reply = match parse_json(payload) {
        Ok(reply) => reply,
        Err(response) => return response,
    };

    match state.board.reply(&id, reply).await {
        Ok(entry) => Json(entry).into_response(),
        Err(err) => board_error(err),
    }
}

#[utoipa::path(
    delete,
    path = "/board/{id}",
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 204, description = "Message and its replies deleted"),
        (status = NOT_FOUND, description = "Unknown message", body = ErrorResponse)
    ),
    tag = "board"
)]
async fn delete_board_message(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.board.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => board_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/board/threads",
    responses((status = 200, description = "Top-level messages with replies", body = [BoardThread])),
    tag = "board"
)]
async fn board_threads(State(state): State<ApiState>) -> Response {
    Json(state.board.threads(Utc::now()).await).into_response()
}

#[utoipa::path(
    get,
    path = "/board/ticker",
    responses((status = 200, description = "Ticker texts, newest first", body = [String])),
    tag = "board"
)]
async fn board_ticker(State(state): State<ApiState>) -> Response {
    Json(state.board.ticker().await).into_response()
}

#[utoipa::path(
    get,
    path = "/board_stream",
    responses((
        status = 200,
        description = "Newest board entries, resent on every change",
        content_type = "text/event-stream",
        body = String
    )),
    tag = "board"
)]
async fn stream_board(State(state): State<ApiState>) -> Response {
    listing_stream(state.board.subscribe(), |entries| {
        entries.iter().take(RECENT_LIMIT).cloned().collect::<Vec<_>>()
    })
}

/// Sends the current listing right away and again after every change.
fn listing_stream<T, V>(
    changes: watch::Receiver<Listing<T>>,
    view: impl Fn(&[T]) -> V + Send + 'static,
) -> Response
where
    T: Document,
    V: Serialize,
{
    let stream = WatchStream::new(changes).map(move |listing| Event::default().json_data(view(&listing)));
    Sse::new(stream).keep_alive(keep_alive()).into_response()
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(std::time::Duration::from_secs(10))
        .text("keep-alive")
}

/// Serves the index.html main page
async fn serve_index() -> Response {
    match WebAssets::get("index.html") {
        Some(content) => Html(content.data).into_response(),
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

/// Serves static assets (JS, CSS, etc.)
async fn serve_static(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    match WebAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref())], content.data).into_response()
        }
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::COLLECTION_NAME as BOARD_COLLECTION;
    use crate::projects::COLLECTION_NAME as PROJECT_COLLECTION;
    use crate::store::Collection;

    fn state() -> ApiState {
        ApiState::new(
            PlanningConfig::default(),
            ProjectService::new(Collection::in_memory(PROJECT_COLLECTION)),
            BoardService::new(Collection::in_memory(BOARD_COLLECTION)),
        )
    }

    fn row(id: &str, dims: [&str; 3], qty: &str) -> RowInput {
        RowInput {
            row_id: id.to_string(),
            length_raw: dims[0].to_string(),
            width_raw: dims[1].to_string(),
            height_raw: dims[2].to_string(),
            quantity_raw: qty.to_string(),
            unit: LengthUnit::Mm,
            color_hex: "#FFadad".to_string(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in [
            "/plan",
            "/plan_stream",
            "/parse",
            "/bulk_import",
            "/catalog",
            "/projects",
            "/projects/{name}",
            "/board",
            "/board/{id}/replies",
            "/board/threads",
        ] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        for name in ["PlanRequest", "PlanningResult", "BoardEntry", "ErrorResponse"] {
            assert!(
                components.schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn plan_request_accepts_sparse_rows() {
        let json = r#"{ "rows": [{ "rowId": "3", "lengthRaw": "1", "widthRaw": "2", "heightRaw": "3" }] }"#;
        let request: PlanRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.rows[0].unit, LengthUnit::Mm);
        assert!(request.rows[0].quantity_raw.is_empty());
    }

    #[tokio::test]
    async fn plan_returns_result_and_summary() {
        let request = PlanRequest {
            rows: vec![row("0", ["2000", "2000", "2000"], "5")],
            drafts: vec![],
        };
        let response = handle_plan(State(state()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["result"]["countsByType"]["20DV"], 2);
        assert_eq!(body["result"]["rowAssignments"]["0"], json!(["20DV-1", "20DV-2"]));
        assert_eq!(body["summary"]["itemCount"], 5);
    }

    #[tokio::test]
    async fn plan_accepts_free_text_drafts_after_rows() {
        let json = r#"{
            "rows": [{ "rowId": "0", "lengthRaw": "1000", "widthRaw": "500", "heightRaw": "500", "quantityRaw": "1" }],
            "drafts": [{ "text": "1x1x1 2", "unit": "m" }, { "text": "not a row" }]
        }"#;
        let request: PlanRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        let response = handle_plan(State(state()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["summary"]["itemCount"], 3);
        assert_eq!(body["result"]["rowAssignments"]["1"], json!(["20DV-1"]));
        assert!(body["result"]["rowAssignments"].get("2").is_none());
    }

    #[tokio::test]
    async fn plan_without_valid_rows_is_unprocessable() {
        let request = PlanRequest {
            rows: vec![row("0", ["abc", "1", "1"], "1")],
            drafts: vec![],
        };
        let response = handle_plan(State(state()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid input data");
    }

    #[tokio::test]
    async fn plan_stream_rejects_empty_plans_before_streaming() {
        let response = handle_plan_stream(State(state()), Ok(Json(PlanRequest { rows: vec![], drafts: vec![] }))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn plan_stream_ends_with_result_event() {
        let request = PlanRequest {
            rows: vec![row("0", ["1000", "1000", "1000"], "2")],
            drafts: vec![],
        };
        let response = handle_plan_stream(State(state()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("\"type\":\"ContainerOpened\""));
        assert!(text.contains("\"type\":\"Finished\""));
        assert!(text.contains("\"type\":\"Result\""));
    }

    #[tokio::test]
    async fn parse_and_bulk_import_endpoints() {
        let response = handle_parse(Ok(Json(ParseRequest {
            text: "1200x800x1000 4".to_string(),
        })))
        .await;
        let body = body_json(response).await;
        assert_eq!(body["quantity"], "4");

        let response = handle_parse(Ok(Json(ParseRequest {
            text: "12 x 8".to_string(),
        })))
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = handle_bulk_import(Ok(Json(BulkImportRequest {
            text: "1200 800 1000".to_string(),
            unit: LengthUnit::Mm,
        })))
        .await;
        let body = body_json(response).await;
        assert_eq!(body["rows"][0]["lengthRaw"], "1.2");
        assert_eq!(body["rows"][0]["unit"], "m");
    }

    #[tokio::test]
    async fn catalog_lists_three_types() {
        let body = body_json(handle_catalog().await).await;
        let codes: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["20DV", "40HC", "40FR"]);
    }

    #[tokio::test]
    async fn project_endpoints_map_errors() {
        let state = state();
        let response = load_project(State(state.clone()), Path("missing".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let request = SaveProjectRequest {
            name: " ".to_string(),
            ..Default::default()
        };
        let response = save_project(State(state.clone()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let request = SaveProjectRequest {
            name: "p".to_string(),
            bulk_text: "1 2 3".to_string(),
            ..Default::default()
        };
        let response = save_project(State(state.clone()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(list_projects(State(state.clone())).await).await;
        assert_eq!(body[0]["name"], "p");

        let response = delete_project(State(state), Path("p".to_string())).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn board_endpoints_post_reply_and_delete() {
        crate::logging::init_test();
        let state = state();
        let message = NewBoardMessage {
            nickname: "ops".to_string(),
            text: "crane down".to_string(),
            ..Default::default()
        };
        let body = body_json(post_board_message(State(state.clone()), Ok(Json(message))).await).await;
        let id = body["id"].as_str().unwrap().to_string();
        assert_eq!(body["speed"], 5.0);

        let reply = ReplyRequest {
            nickname: "yard".to_string(),
            text: "fixed".to_string(),
        };
        let response =
            reply_board_message(State(state.clone()), Path(id.clone()), Ok(Json(reply))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let threads = body_json(board_threads(State(state.clone())).await).await;
        assert_eq!(threads[0]["replies"][0]["text"], "fixed");
        assert_eq!(threads[0]["hasRecentReply"], true);

        let ticker = body_json(board_ticker(State(state.clone())).await).await;
        let ticker = ticker.as_array().unwrap();
        assert_eq!(ticker.len(), 2);
        assert!(ticker.contains(&json!("crane down")));

        let response = delete_board_message(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let body = body_json(list_board(State(state)).await).await;
        assert_eq!(body, json!([]));
    }
}

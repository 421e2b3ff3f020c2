use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{Item, NewItem},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use api::{
    create_item, delete_item, item_route, items_route, list_items, reset_route, reset_store,
    update_item, ApiContext, UpdateItemRequest,
};
use app_state::AppState;
use config::{load_settings, prepare_database_url};

const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    // one-time store initialization happens here, before any route is served
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state), settings.reset_enabled);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, reset_enabled = settings.reset_enabled, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, reset_enabled: bool) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route(items_route(), get(http_list_items).post(http_create_item))
        .route(
            item_route(),
            patch(http_update_item).delete(http_delete_item),
        );
    if reset_enabled {
        router = router.route(reset_route(), post(http_reset));
    }
    router
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state.api.storage.health_check().await.map_err(|e| {
        reject(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn http_list_items(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Item>>> {
    list_items(&state.api).await.map(Json).map_err(reject)
}

async fn http_create_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewItem>,
) -> ApiResult<(StatusCode, Json<Item>)> {
    let item = create_item(&state.api, req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn http_update_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<Json<Item>> {
    update_item(&state.api, &item_id, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> ApiResult<StatusCode> {
    delete_item(&state.api, &item_id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_reset(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    reset_store(&state.api).await.map_err(reject)?;
    info!("backing store reseeded");
    Ok(StatusCode::NO_CONTENT)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = status_for(error.code);
    if status.is_server_error() {
        warn!(code = ?error.code, message = %error.message, "request failed");
    }
    (status, Json(error))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::ItemId,
    error::{ApiError, ErrorCode},
    protocol::{Item, NewItem},
};
use storage::Storage;
use tracing::info;

pub const MAX_ITEM_TEXT_BYTES: usize = 4096;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// PATCH body. Clients send the full item; only `text` is applied and the
/// identifier, when present, must match the path.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

pub fn items_route() -> &'static str {
    "/items"
}

pub fn item_route() -> &'static str {
    "/items/:item_id"
}

pub fn reset_route() -> &'static str {
    "/reset"
}

pub async fn list_items(ctx: &ApiContext) -> Result<Vec<Item>, ApiError> {
    let items = ctx.storage.list_items().await.map_err(internal)?;
    Ok(items.into_iter().map(|item| item.into_item()).collect())
}

pub async fn create_item(ctx: &ApiContext, req: NewItem) -> Result<Item, ApiError> {
    validate_text(&req.text)?;
    let item = ctx
        .storage
        .create_item(&req.text, req.created_at)
        .await
        .map_err(internal)?;
    info!(item_id = item.id, "api: item created");
    Ok(item.into_item())
}

pub async fn update_item(
    ctx: &ApiContext,
    raw_item_id: &str,
    req: UpdateItemRequest,
) -> Result<Item, ApiError> {
    let item_id = parse_item_id(raw_item_id)?;
    if let Some(body_id) = &req.id {
        if body_id.numeric() != Some(item_id) {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("body id {body_id} does not match path id {item_id}"),
            ));
        }
    }
    validate_text(&req.text)?;

    let item = ctx
        .storage
        .update_item(item_id, &req.text)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(item_id))?;
    Ok(item.into_item())
}

pub async fn delete_item(ctx: &ApiContext, raw_item_id: &str) -> Result<(), ApiError> {
    let item_id = parse_item_id(raw_item_id)?;
    let removed = ctx
        .storage
        .delete_item(item_id)
        .await
        .map_err(internal)?;
    if !removed {
        return Err(not_found(item_id));
    }
    info!(item_id, "api: item deleted");
    Ok(())
}

pub async fn reset_store(ctx: &ApiContext) -> Result<(), ApiError> {
    ctx.storage.reseed().await.map_err(internal)?;
    Ok(())
}

fn parse_item_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim().parse::<i64>().map_err(|_| {
        ApiError::new(
            ErrorCode::Validation,
            format!("item id must be an integer, got {raw:?}"),
        )
    })
}

fn validate_text(text: &str) -> Result<(), ApiError> {
    if text.len() > MAX_ITEM_TEXT_BYTES {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("item text exceeds {MAX_ITEM_TEXT_BYTES} bytes"),
        ));
    }
    Ok(())
}

fn not_found(item_id: i64) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("item {item_id} not found"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;

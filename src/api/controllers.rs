use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, FixedOffset, Utc};
use crate::api::error::{ApiError, OutcomeExt};
use crate::api::{ApiContext, Result};
use crate::entities::*;
use crate::maintenance::RebuildOrder;

const DEFAULT_PAGE_SIZE: u64 = DEFAULT_MAX_RESULTS as u64;
const MAX_PAGE_SIZE: u64 = 200;

pub fn router() -> Router {
    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/users", post(create_user))
        .route("/api/users/:user", get(get_user).delete(delete_user))
        .route("/api/users/:user/albums", get(list_albums).post(create_album))
        .route("/api/users/:user/albums/:album", get(list_album_items).post(add_media).delete(delete_album))
        .route("/api/users/:user/albums/:album/rebuild", post(rebuild_album_index))
        .route("/api/users/:user/albums/:album/media/:locator", get(get_media).delete(delete_media))
        .route("/api/users/:user/albums/:album/media/:locator/add-tag", post(add_tag))
        .route("/api/users/:user/albums/:album/media/:locator/remove-tag", post(delete_tag))
        .route("/api/users/:user/albums/:album/media/:locator/like", post(increase_like_count))
        .route("/api/users/:user/merge", post(merge_albums))
        .route("/api/users/:user/search", post(search))
        .route("/api/users/:user/saved-searches", get(list_saved_searches).post(add_saved_search))
        .route("/api/users/:user/saved-searches/:name", delete(delete_saved_search))
}

async fn ping() -> String {
    "pong".to_string()
}

#[derive(serde::Deserialize, Debug)]
struct CreateUserRequest {
    username: String,
    password: String,
}

#[derive(serde::Serialize, Debug)]
struct UserProfile {
    username: String,
    created: DateTime<Utc>,
    album_count: usize,
    saved_search_count: usize,
}

#[derive(serde::Deserialize, Debug)]
struct CreateAlbumRequest {
    name: String,
}

#[derive(serde::Deserialize, Debug)]
struct AddMediaRequest {
    name: String,
    size: Option<i64>,
    created_at: Option<DateTime<FixedOffset>>,
}

#[derive(serde::Deserialize, Debug, Default)]
struct TagBody {
    name: String,
}

#[derive(serde::Deserialize, Debug, Default)]
struct Pagination {
    offset: Option<u64>,
    limit: Option<u64>,
}

#[derive(serde::Deserialize, Debug)]
struct MergeRequest {
    source1: String,
    source2: String,
    target: String,
}

#[derive(serde::Deserialize, Debug, Default)]
struct RebuildRequest {
    order: Option<String>,
}

#[derive(serde::Serialize, Debug)]
struct RebuildResponse {
    swaps: u64,
}

#[derive(serde::Deserialize, Debug)]
struct SavedSearchRequest {
    name: String,
    #[serde(default)]
    parameters: SearchParams,
}

async fn create_user(
    ctx: Extension<ApiContext>,
    Json(req): Json<CreateUserRequest>,
) -> Result<StatusCode> {
    if req.password.is_empty() {
        return Err(ApiError::unprocessable_entity([("password", "password is empty")]));
    }
    ctx.gallery.create_user(&req.username, &req.password).await?.into_api_result()?;
    Ok(StatusCode::CREATED)
}

async fn get_user(
    ctx: Extension<ApiContext>,
    Path(user): Path<String>,
) -> Result<Json<UserProfile>> {
    let user = ctx.gallery.get_user(&user).await?.ok_or(ApiError::NotFound(Entity::User))?;
    Ok(Json(UserProfile {
        username: user.username,
        created: user.created,
        album_count: user.album_meta.len(),
        saved_search_count: user.saved_searches.len(),
    }))
}

async fn delete_user(
    ctx: Extension<ApiContext>,
    Path(user): Path<String>,
) -> Result<StatusCode> {
    if !ctx.gallery.delete_user(&user).await? {
        return Err(ApiError::NotFound(Entity::User));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_albums(
    ctx: Extension<ApiContext>,
    Path(user): Path<String>,
) -> Result<Json<Vec<AlbumSummary>>> {
    let albums = ctx.gallery.list_albums(&user).await?.ok_or(ApiError::NotFound(Entity::User))?;
    Ok(Json(albums))
}

async fn create_album(
    ctx: Extension<ApiContext>,
    Path(user): Path<String>,
    Json(req): Json<CreateAlbumRequest>,
) -> Result<StatusCode> {
    ctx.gallery.create_album(&user, &req.name).await?.into_api_result()?;
    Ok(StatusCode::CREATED)
}

async fn delete_album(
    ctx: Extension<ApiContext>,
    Path((user, album)): Path<(String, String)>,
) -> Result<StatusCode> {
    if !ctx.gallery.delete_album(&user, &album).await? {
        return Err(ApiError::NotFound(Entity::Album));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_album_items(
    ctx: Extension<ApiContext>,
    Path((user, album)): Path<(String, String)>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<Media>>> {
    let offset = pagination.offset.unwrap_or(0);
    let limit = pagination.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let media_vec = ctx.gallery.list_album_items(&user, &album, offset, limit).await?.into_api_result()?;
    Ok(Json(media_vec))
}

async fn add_media(
    ctx: Extension<ApiContext>,
    Path((user, album)): Path<(String, String)>,
    Json(req): Json<AddMediaRequest>,
) -> Result<(StatusCode, Json<Media>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::unprocessable_entity([("name", "name is empty")]));
    }
    let new_media = NewMedia { name: req.name, size: req.size, created: req.created_at };
    let media = ctx.gallery.add_media(&user, &album, new_media).await?.into_api_result()?;
    Ok((StatusCode::CREATED, Json(media)))
}

async fn get_media(
    ctx: Extension<ApiContext>,
    Path((user, album, locator)): Path<(String, String, String)>,
) -> Result<Json<Media>> {
    let media = ctx.gallery.get_media(&user, &album, &locator).await?.into_api_result()?;
    Ok(Json(media))
}

async fn delete_media(
    ctx: Extension<ApiContext>,
    Path((user, album, locator)): Path<(String, String, String)>,
) -> Result<Json<Media>> {
    let media = ctx.gallery.delete_media(&user, &album, &locator).await?.into_api_result()?;
    Ok(Json(media))
}

async fn add_tag(
    ctx: Extension<ApiContext>,
    Path((user, album, locator)): Path<(String, String, String)>,
    Json(req): Json<TagBody>,
) -> Result<Json<Media>> {
    let media = ctx.gallery.add_tag(&user, &album, &locator, req.name.trim()).await?.into_api_result()?;
    Ok(Json(media))
}

async fn delete_tag(
    ctx: Extension<ApiContext>,
    Path((user, album, locator)): Path<(String, String, String)>,
    Json(req): Json<TagBody>,
) -> Result<Json<Media>> {
    let media = ctx.gallery.delete_tag(&user, &album, &locator, req.name.trim()).await?.into_api_result()?;
    Ok(Json(media))
}

async fn increase_like_count(
    ctx: Extension<ApiContext>,
    Path((user, album, locator)): Path<(String, String, String)>,
) -> Result<Json<Media>> {
    let media = ctx.gallery.increase_like_count(&user, &album, &locator).await?.into_api_result()?;
    Ok(Json(media))
}

async fn rebuild_album_index(
    ctx: Extension<ApiContext>,
    Path((user, album)): Path<(String, String)>,
    Json(req): Json<RebuildRequest>,
) -> Result<Json<RebuildResponse>> {
    let order = req.order.as_deref().map(RebuildOrder::from).unwrap_or(RebuildOrder::Name);
    let swaps = ctx.gallery.rebuild_album_index(&user, &album, order).await?.into_api_result()?;
    Ok(Json(RebuildResponse { swaps }))
}

async fn merge_albums(
    ctx: Extension<ApiContext>,
    Path(user): Path<String>,
    Json(req): Json<MergeRequest>,
) -> Result<Json<UserAlbumMeta>> {
    let merged = ctx.gallery.merge_albums(&user, &req.source1, &req.source2, &req.target).await?.into_api_result()?;
    Ok(Json(merged))
}

async fn search(
    ctx: Extension<ApiContext>,
    Path(user): Path<String>,
    Json(params): Json<SearchParams>,
) -> Result<Json<Vec<SearchHit>>> {
    let hits = ctx.gallery.search(&user, &params).await?.ok_or(ApiError::NotFound(Entity::User))?;
    Ok(Json(hits))
}

async fn list_saved_searches(
    ctx: Extension<ApiContext>,
    Path(user): Path<String>,
) -> Result<Json<Vec<SavedSearchMeta>>> {
    let searches = ctx.gallery.list_saved_searches(&user).await?.ok_or(ApiError::NotFound(Entity::User))?;
    Ok(Json(searches))
}

async fn add_saved_search(
    ctx: Extension<ApiContext>,
    Path(user): Path<String>,
    Json(req): Json<SavedSearchRequest>,
) -> Result<Json<SavedSearchMeta>> {
    let search = ctx.gallery.add_saved_search(&user, &req.name, req.parameters).await?.into_api_result()?;
    Ok(Json(search))
}

async fn delete_saved_search(
    ctx: Extension<ApiContext>,
    Path((user, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    ctx.gallery.delete_saved_search(&user, &name).await?.into_api_result()?;
    Ok(StatusCode::NO_CONTENT)
}

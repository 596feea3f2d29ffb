//! Sync API routes shared by every collection
//!
//! Handlers are generic over [`Collection`]; each collection mounts the same
//! router under its own prefix.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::de::DeserializeOwned;

use crate::auth::CurrentUser;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{Affected, Collection, Delta, EntityStore, KeySet, Listing, SyncRequest};

fn store<C: Collection>(state: &AppState) -> EntityStore<'_, C> {
    EntityStore::new(state.db(), state.timeouts())
}

/// List, sync and the bulk state transitions
pub fn router<C: Collection>() -> Router<AppState> {
    Router::new()
        .route("/", get(list::<C>))
        .route("/sync", post(sync::<C>))
        .route("/trash", post(trash::<C>))
        .route("/untrash", post(untrash::<C>))
        .route("/delete", delete(remove::<C>))
}

/// Full router for collections whose records are created and edited as JSON
pub fn json_router<C>() -> Router<AppState>
where
    C: Collection,
    C::New: DeserializeOwned,
    C::Changes: DeserializeOwned,
{
    router::<C>()
        .route("/", post(create::<C>))
        .route("/", put(update::<C>))
}

pub async fn list<C: Collection>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Listing<C::Record>>> {
    let listing = store::<C>(&state).list(&user).await?;
    Ok(Json(listing))
}

pub async fn sync<C: Collection>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<SyncRequest>,
) -> Result<Json<Delta<C::Record>>> {
    if request.since < 0 {
        return Err(AppError::BadRequest(format!(
            "History id must not be negative: {}",
            request.since
        )));
    }

    let delta = store::<C>(&state).sync(&user, request.since).await?;
    Ok(Json(delta))
}

pub async fn create<C>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(new): Json<C::New>,
) -> Result<(StatusCode, Json<C::Record>)>
where
    C: Collection,
    C::New: DeserializeOwned,
{
    let record = store::<C>(&state).create(&user, &new).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update<C>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(changes): Json<C::Changes>,
) -> Result<Json<C::Record>>
where
    C: Collection,
    C::Changes: DeserializeOwned,
{
    let record = store::<C>(&state).update(&user, &changes).await?;
    Ok(Json(record))
}

pub async fn trash<C: Collection>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(keys): Json<KeySet>,
) -> Result<Json<Affected>> {
    let affected = store::<C>(&state).trash(&user, &keys.ids).await?;
    Ok(Json(Affected { affected }))
}

pub async fn untrash<C: Collection>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(keys): Json<KeySet>,
) -> Result<Json<Affected>> {
    let affected = store::<C>(&state).untrash(&user, &keys.ids).await?;
    Ok(Json(Affected { affected }))
}

pub async fn remove<C: Collection>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(keys): Json<KeySet>,
) -> Result<Json<Affected>> {
    let affected = store::<C>(&state).delete(&user, &keys.ids).await?;
    Ok(Json(Affected { affected }))
}

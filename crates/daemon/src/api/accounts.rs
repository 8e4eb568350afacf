// SPDX-License-Identifier: MIT

//! Account endpoints: list/lookup reads answer directly from the name
//! databases; every mutation is a task.

use super::{accepted, ApiError, AppState, Principal};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::json;
use warden_core::{NewTask, ZONE_SYSTEM};
use warden_handlers::accounts::{query, validate};
use warden_handlers::ops;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/system/users", get(list_users).post(create_user))
        .route(
            "/system/users/:username",
            get(get_user).put(modify_user).delete(delete_user),
        )
        .route("/system/users/:username/attributes", get(user_attributes))
        .route("/system/users/:username/password", post(set_password))
        .route("/system/users/:username/lock", post(lock_user))
        .route("/system/users/:username/unlock", post(unlock_user))
        .route("/system/groups", get(list_groups).post(create_group))
        .route(
            "/system/groups/:groupname",
            get(get_group).put(modify_group).delete(delete_group),
        )
        .route("/system/roles", get(list_roles).post(create_role))
        .route("/system/roles/:rolename", axum::routing::put(modify_role).delete(delete_role))
        .route("/system/rbac/authorizations", get(list_authorizations))
        .route("/system/rbac/profiles", get(list_profiles))
        .route("/system/rbac/roles", get(list_rbac_roles))
}

/// Enqueue an account mutation with the given operation and metadata.
async fn enqueue_account_task(
    state: &AppState,
    principal: &Principal,
    operation: &str,
    metadata: serde_json::Value,
    message: String,
) -> Result<axum::response::Response, ApiError> {
    let task = state
        .queue
        .enqueue(
            NewTask::new(operation)
                .zone_name(ZONE_SYSTEM)
                .metadata(metadata)
                .created_by(&principal.0),
        )
        .await?;
    Ok(accepted(&task, message))
}

// === Users ===

async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users = query::list_users(&state.runner).await.map_err(ApiError::Internal)?;
    Ok(Json(json!({"users": users})))
}

async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_username(&username).map_err(ApiError::BadRequest)?;
    let user = query::get_user(&state.runner, &username)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::not_found(format!("user {username} not found")))?;
    Ok(Json(serde_json::to_value(user).unwrap_or_default()))
}

async fn user_attributes(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_username(&username).map_err(ApiError::BadRequest)?;
    let attributes = query::user_attributes(&state.runner, &username)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({"username": username, "attributes": attributes})))
}

async fn create_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate eagerly so bad input 400s instead of failing a task later.
    let params: warden_handlers::accounts::users::UserCreateParams =
        serde_json::from_value(body.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid user body: {e}")))?;
    warden_handlers::accounts::users::build_useradd(&params).map_err(ApiError::BadRequest)?;

    enqueue_account_task(
        &state,
        &principal,
        ops::USER_CREATE,
        body,
        format!("creation of user {} queued", params.username),
    )
    .await
}

async fn modify_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(principal): Extension<Principal>,
    Json(mut body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(object) = body.as_object_mut() {
        object.insert("username".to_string(), json!(username));
    }
    let params: warden_handlers::accounts::users::UserModifyParams =
        serde_json::from_value(body.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid user body: {e}")))?;
    warden_handlers::accounts::users::build_usermod(&params).map_err(ApiError::BadRequest)?;

    enqueue_account_task(
        &state,
        &principal,
        ops::USER_MODIFY,
        body,
        format!("modification of user {username} queued"),
    )
    .await
}

async fn delete_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(principal): Extension<Principal>,
    body: Option<Json<serde_json::Value>>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_username(&username).map_err(ApiError::BadRequest)?;
    let remove_home = body
        .as_ref()
        .and_then(|Json(b)| b.get("remove_home"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    enqueue_account_task(
        &state,
        &principal,
        ops::USER_DELETE,
        json!({"username": username, "remove_home": remove_home}),
        format!("deletion of user {username} queued"),
    )
    .await
}

async fn set_password(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_username(&username).map_err(ApiError::BadRequest)?;
    let password = body
        .get("password")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("password is required"))?;
    enqueue_account_task(
        &state,
        &principal,
        ops::USER_SET_PASSWORD,
        json!({"username": username, "password": password}),
        format!("password change for {username} queued"),
    )
    .await
}

async fn lock_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_username(&username).map_err(ApiError::BadRequest)?;
    enqueue_account_task(
        &state,
        &principal,
        ops::USER_LOCK,
        json!({"username": username}),
        format!("lock of user {username} queued"),
    )
    .await
}

async fn unlock_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_username(&username).map_err(ApiError::BadRequest)?;
    enqueue_account_task(
        &state,
        &principal,
        ops::USER_UNLOCK,
        json!({"username": username}),
        format!("unlock of user {username} queued"),
    )
    .await
}

// === Groups ===

async fn list_groups(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let groups = query::list_groups(&state.runner).await.map_err(ApiError::Internal)?;
    Ok(Json(json!({"groups": groups})))
}

async fn get_group(
    State(state): State<AppState>,
    Path(groupname): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_groupname(&groupname).map_err(ApiError::BadRequest)?;
    let group = query::get_group(&state.runner, &groupname)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::not_found(format!("group {groupname} not found")))?;
    Ok(Json(serde_json::to_value(group).unwrap_or_default()))
}

async fn create_group(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let params: warden_handlers::accounts::groups::GroupParams =
        serde_json::from_value(body.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid group body: {e}")))?;
    warden_handlers::accounts::groups::build_groupadd(&params).map_err(ApiError::BadRequest)?;
    enqueue_account_task(
        &state,
        &principal,
        ops::GROUP_CREATE,
        body,
        format!("creation of group {} queued", params.groupname),
    )
    .await
}

async fn modify_group(
    State(state): State<AppState>,
    Path(groupname): Path<String>,
    Extension(principal): Extension<Principal>,
    Json(mut body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(object) = body.as_object_mut() {
        object.insert("groupname".to_string(), json!(groupname));
    }
    let params: warden_handlers::accounts::groups::GroupParams =
        serde_json::from_value(body.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid group body: {e}")))?;
    warden_handlers::accounts::groups::build_groupmod(&params).map_err(ApiError::BadRequest)?;
    enqueue_account_task(
        &state,
        &principal,
        ops::GROUP_MODIFY,
        body,
        format!("modification of group {groupname} queued"),
    )
    .await
}

async fn delete_group(
    State(state): State<AppState>,
    Path(groupname): Path<String>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_groupname(&groupname).map_err(ApiError::BadRequest)?;
    enqueue_account_task(
        &state,
        &principal,
        ops::GROUP_DELETE,
        json!({"groupname": groupname}),
        format!("deletion of group {groupname} queued"),
    )
    .await
}

// === Roles ===

async fn list_roles(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let roles = query::list_roles(&state.runner).await.map_err(ApiError::Internal)?;
    Ok(Json(json!({"roles": roles})))
}

async fn create_role(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let params: warden_handlers::accounts::groups::RoleParams =
        serde_json::from_value(body.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid role body: {e}")))?;
    warden_handlers::accounts::groups::build_roleadd(&params).map_err(ApiError::BadRequest)?;
    enqueue_account_task(
        &state,
        &principal,
        ops::ROLE_CREATE,
        body,
        format!("creation of role {} queued", params.rolename),
    )
    .await
}

async fn modify_role(
    State(state): State<AppState>,
    Path(rolename): Path<String>,
    Extension(principal): Extension<Principal>,
    Json(mut body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(object) = body.as_object_mut() {
        object.insert("rolename".to_string(), json!(rolename));
    }
    let params: warden_handlers::accounts::groups::RoleParams =
        serde_json::from_value(body.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid role body: {e}")))?;
    warden_handlers::accounts::groups::build_rolemod(&params).map_err(ApiError::BadRequest)?;
    enqueue_account_task(
        &state,
        &principal,
        ops::ROLE_MODIFY,
        body,
        format!("modification of role {rolename} queued"),
    )
    .await
}

async fn delete_role(
    State(state): State<AppState>,
    Path(rolename): Path<String>,
    Extension(principal): Extension<Principal>,
    body: Option<Json<serde_json::Value>>,
) -> Result<impl IntoResponse, ApiError> {
    validate::validate_rolename(&rolename).map_err(ApiError::BadRequest)?;
    let remove_home = body
        .as_ref()
        .and_then(|Json(b)| b.get("remove_home"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    enqueue_account_task(
        &state,
        &principal,
        ops::ROLE_DELETE,
        json!({"rolename": rolename, "remove_home": remove_home}),
        format!("deletion of role {rolename} queued"),
    )
    .await
}

// === RBAC discovery ===

async fn list_authorizations(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let authorizations =
        query::list_authorizations(&state.runner).await.map_err(ApiError::Internal)?;
    Ok(Json(json!({"authorizations": authorizations})))
}

async fn list_profiles(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let profiles = query::list_profiles(&state.runner).await.map_err(ApiError::Internal)?;
    Ok(Json(json!({"profiles": profiles})))
}

async fn list_rbac_roles(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let roles = query::list_roles(&state.runner).await.map_err(ApiError::Internal)?;
    Ok(Json(json!({"roles": roles})))
}

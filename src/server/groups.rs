use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::rules::membership;
use crate::server::AppState;
use crate::server::audit;
use crate::server::dto::{
    AddMemberRequest, CreateGroupRequest, GroupDirectoryResponse, GroupListResponse,
    GroupWithCreator, MemberResponse, MessageResponse, UpdateGroupRequest,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::server::validation::validate_group_name;
use crate::store::{GroupPatch, Store};
use crate::types::{EntityType, Group, GroupMember, Role, User};
use crate::views::{self, UserSummary};

/// Group management (rename, delete, member administration) is open to the
/// group's creator, members holding the group-scoped ADMIN role, and global
/// admins.
fn can_manage(store: &dyn Store, user: &User, group: &Group) -> Result<bool, ApiError> {
    if user.role == Role::Admin || group.creator_id == user.id {
        return Ok(true);
    }
    Ok(membership::role_in(store, &user.id, &group.id)? == Some(Role::Admin))
}

pub async fn create_group(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    validate_group_name(&req.name)?;

    let now = Utc::now();
    let group = Group {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        creator_id: auth.user.id.clone(),
        created_at: now,
        updated_at: now,
    };
    let member = GroupMember {
        id: Uuid::new_v4().to_string(),
        user_id: auth.user.id.clone(),
        group_id: group.id.clone(),
        role: Role::Admin,
        joined_at: now,
    };
    store.create_group_with_member(&group, &member)?;

    audit::record(
        store,
        &auth.user.id,
        EntityType::Group,
        &group.id,
        "created",
        json!({ "name": &group.name }),
    );

    let creator = Some(UserSummary::from(&auth.user));
    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(GroupWithCreator { group, creator })),
    ))
}

pub async fn list_my_groups(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let mut groups = Vec::new();
    for membership in store.list_user_memberships(&auth.user.id)? {
        if let Some(detail) = views::group_with_members(store, &membership.group_id)? {
            groups.push(detail);
        }
    }
    groups.sort_by(|a, b| b.group.created_at.cmp(&a.group.created_at));

    Ok::<_, ApiError>(Json(ApiResponse::success(GroupListResponse {
        results: groups.len(),
        groups,
    })))
}

pub async fn list_all_groups(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let groups = views::group_directory(state.store.as_ref(), &auth.user.id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(GroupDirectoryResponse {
        results: groups.len(),
        groups,
    })))
}

pub async fn get_group(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let detail = views::group_with_members(state.store.as_ref(), &id)?
        .or_not_found("Group not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(detail)))
}

pub async fn update_group(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateGroupRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let group = store.get_group(&id)?.or_not_found("Group not found")?;

    if !can_manage(store, &auth.user, &group)? {
        return Err(ApiError::forbidden("Not authorized to update this group"));
    }
    if let Some(name) = &req.name {
        validate_group_name(name)?;
    }

    let mut changes = serde_json::Map::new();
    if let Some(name) = &req.name {
        changes.insert("name".into(), json!(name));
    }
    if let Some(description) = &req.description {
        changes.insert("description".into(), json!(description));
    }

    store
        .update_group(
            &id,
            &GroupPatch {
                name: req.name,
                description: req.description,
            },
        )?
        .or_not_found("Group not found")?;

    audit::record(
        store,
        &auth.user.id,
        EntityType::Group,
        &id,
        "updated",
        serde_json::Value::Object(changes),
    );

    let detail = views::group_with_members(store, &id)?.or_not_found("Group not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(detail)))
}

pub async fn delete_group(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let group = store.get_group(&id)?.or_not_found("Group not found")?;

    if group.creator_id != auth.user.id && auth.user.role != Role::Admin {
        return Err(ApiError::forbidden("Not authorized to delete this group"));
    }

    store.delete_group(&id)?;
    audit::record(
        store,
        &auth.user.id,
        EntityType::Group,
        &id,
        "deleted",
        json!({}),
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn join_group(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    store.get_group(&id)?.or_not_found("Group not found")?;

    if membership::is_member(store, &auth.user.id, &id)? {
        return Err(ApiError::conflict(
            "You are already a member of this group",
        ));
    }

    let member = GroupMember {
        id: Uuid::new_v4().to_string(),
        user_id: auth.user.id.clone(),
        group_id: id.clone(),
        role: Role::User,
        joined_at: Utc::now(),
    };
    store.create_group_member(&member)?;

    audit::record(
        store,
        &auth.user.id,
        EntityType::Group,
        &id,
        "member_joined",
        json!({ "user_id": &auth.user.id }),
    );

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(MemberResponse {
            member,
            user: UserSummary::from(&auth.user),
        })),
    ))
}

pub async fn leave_group(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let group = store.get_group(&id)?.or_not_found("Group not found")?;

    if group.creator_id == auth.user.id {
        return Err(ApiError::bad_request(
            "Group creators cannot leave their own group. Delete the group instead.",
        ));
    }
    if !membership::is_member(store, &auth.user.id, &id)? {
        return Err(ApiError::not_found("You are not a member of this group"));
    }

    store.delete_group_member(&auth.user.id, &id)?;
    audit::record(
        store,
        &auth.user.id,
        EntityType::Group,
        &id,
        "member_left",
        json!({ "user_id": &auth.user.id }),
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(MessageResponse {
        message: "Successfully left group",
    })))
}

pub async fn add_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let group = store.get_group(&id)?.or_not_found("Group not found")?;

    if !can_manage(store, &auth.user, &group)? {
        return Err(ApiError::forbidden(
            "Not authorized to manage members of this group",
        ));
    }
    if req.user_id.is_empty() {
        return Err(ApiError::bad_request("User ID is required"));
    }
    let user = store.get_user(&req.user_id)?.or_not_found("User not found")?;

    if membership::is_member(store, &req.user_id, &id)? {
        return Err(ApiError::conflict(
            "User is already a member of this group",
        ));
    }

    let member = GroupMember {
        id: Uuid::new_v4().to_string(),
        user_id: req.user_id,
        group_id: id.clone(),
        role: req.role.unwrap_or(Role::User),
        joined_at: Utc::now(),
    };
    store.create_group_member(&member)?;

    audit::record(
        store,
        &auth.user.id,
        EntityType::Group,
        &id,
        "member_added",
        json!({ "user_id": &member.user_id, "role": member.role }),
    );

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(MemberResponse {
            member,
            user: UserSummary::from(&user),
        })),
    ))
}

pub async fn remove_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let group = store.get_group(&id)?.or_not_found("Group not found")?;

    if !can_manage(store, &auth.user, &group)? {
        return Err(ApiError::forbidden(
            "Not authorized to manage members of this group",
        ));
    }

    if store.get_group_member(&user_id, &id)?.is_none() {
        return Err(ApiError::not_found("Member not found in this group"));
    }

    store.delete_group_member(&user_id, &id)?;
    audit::record(
        store,
        &auth.user.id,
        EntityType::Group,
        &id,
        "member_removed",
        json!({ "user_id": &user_id }),
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

use actix_web::{web, HttpRequest, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
};
use std::collections::HashSet;

use crate::auth::current_user;
use crate::core::errors::ApiError;
use crate::core::helpers::{access_unauthorized, redirect};
use crate::models::follows;
use crate::users::get_user;
use crate::AppState;

async fn edge_exists(
    db: &DatabaseConnection,
    follower_id: i32,
    followed_id: i32,
) -> Result<bool, ApiError> {
    Ok(follows::Entity::find_by_id((followed_id, follower_id))
        .one(db)
        .await?
        .is_some())
}

/// Add the edge `follower_id -> followed_id`. Following twice is a no-op.
pub async fn follow_user(
    db: &DatabaseConnection,
    follower_id: i32,
    followed_id: i32,
) -> Result<(), ApiError> {
    if follower_id == followed_id {
        return Err(ApiError::BadRequest("Users cannot follow themselves".to_string()));
    }
    if edge_exists(db, follower_id, followed_id).await? {
        return Ok(());
    }

    let inserted = follows::ActiveModel {
        user_being_followed_id: Set(followed_id),
        user_following_id: Set(follower_id),
    }
    .insert(db)
    .await;

    match inserted {
        Ok(_) => Ok(()),
        Err(err) => {
            let err = ApiError::from(err);
            // lost a race against an identical request
            if err.is_conflict() && edge_exists(db, follower_id, followed_id).await? {
                return Ok(());
            }
            Err(err)
        }
    }
}

pub async fn unfollow_user(
    db: &DatabaseConnection,
    follower_id: i32,
    followed_id: i32,
) -> Result<(), ApiError> {
    follows::Entity::delete_by_id((followed_id, follower_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Ids of every user `user_id` follows.
pub async fn following_ids(db: &DatabaseConnection, user_id: i32) -> Result<HashSet<i32>, ApiError> {
    let ids: Vec<i32> = follows::Entity::find()
        .select_only()
        .column(follows::Column::UserBeingFollowedId)
        .filter(follows::Column::UserFollowingId.eq(user_id))
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

// === HTTP Handlers ===

pub async fn add_follow(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };

    let target = get_user(&state.db, path.into_inner()).await?;
    follow_user(&state.db, viewer.id, target.id).await?;
    log::info!("{} now follows {}", viewer, target);

    Ok(redirect(&format!("/users/{}/following", viewer.id)))
}

pub async fn stop_following(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };

    let target = get_user(&state.db, path.into_inner()).await?;
    unfollow_user(&state.db, viewer.id, target.id).await?;
    log::info!("{} stopped following {}", viewer, target);

    Ok(redirect(&format!("/users/{}/following", viewer.id)))
}

use actix_web::{web, HttpRequest, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::collections::HashSet;

use crate::auth::current_user;
use crate::core::errors::ApiError;
use crate::core::helpers::{access_unauthorized, redirect};
use crate::messages::get_message;
use crate::models::{likes, message, user};
use crate::AppState;

pub async fn is_liked(
    db: &DatabaseConnection,
    user_id: i32,
    message_id: i32,
) -> Result<bool, ApiError> {
    Ok(likes::Entity::find_by_id((user_id, message_id))
        .one(db)
        .await?
        .is_some())
}

/// Liking twice is a no-op.
pub async fn like_message(
    db: &DatabaseConnection,
    user_id: i32,
    message_id: i32,
) -> Result<(), ApiError> {
    if is_liked(db, user_id, message_id).await? {
        return Ok(());
    }

    let inserted = likes::ActiveModel {
        user_id: Set(user_id),
        message_id: Set(message_id),
    }
    .insert(db)
    .await;

    match inserted {
        Ok(_) => Ok(()),
        Err(err) => {
            let err = ApiError::from(err);
            // lost a race against an identical request
            if err.is_conflict() && is_liked(db, user_id, message_id).await? {
                return Ok(());
            }
            Err(err)
        }
    }
}

pub async fn unlike_message(
    db: &DatabaseConnection,
    user_id: i32,
    message_id: i32,
) -> Result<(), ApiError> {
    likes::Entity::delete_by_id((user_id, message_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Flip the like edge between `u` and `msg`. Returns whether `u` now
/// likes the message. Users cannot like their own messages.
pub async fn toggle_like(
    db: &DatabaseConnection,
    u: &user::Model,
    msg: &message::Model,
) -> Result<bool, ApiError> {
    if msg.user_id == u.id {
        return Err(ApiError::Forbidden);
    }

    if is_liked(db, u.id, msg.id).await? {
        unlike_message(db, u.id, msg.id).await?;
        Ok(false)
    } else {
        like_message(db, u.id, msg.id).await?;
        Ok(true)
    }
}

/// Messages `u` has liked, newest first.
pub async fn liked_messages(
    db: &DatabaseConnection,
    u: &user::Model,
) -> Result<Vec<message::Model>, ApiError> {
    Ok(message::Entity::find()
        .join(JoinType::InnerJoin, likes::Relation::Message.def().rev())
        .filter(likes::Column::UserId.eq(u.id))
        .order_by_desc(message::Column::Timestamp)
        .all(db)
        .await?)
}

pub async fn liked_message_ids(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<HashSet<i32>, ApiError> {
    let ids: Vec<i32> = likes::Entity::find()
        .select_only()
        .column(likes::Column::MessageId)
        .filter(likes::Column::UserId.eq(user_id))
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

// === HTTP Handlers ===

pub async fn handle_toggle_like(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };

    let msg = get_message(&state.db, path.into_inner()).await?;
    let liked = toggle_like(&state.db, &viewer, &msg).await?;
    log::debug!("{} {} message #{}", viewer, if liked { "liked" } else { "unliked" }, msg.id);

    Ok(redirect("/"))
}

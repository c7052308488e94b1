use actix_web::{web, HttpRequest, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;

use crate::auth::current_user;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{access_unauthorized, now_utc, redirect};
use crate::follow::following_ids;
use crate::likes::liked_message_ids;
use crate::models::{likes, message, user};
use crate::templates::{self, attr, escape, form_errors, format_text, LikeState, Page};
use crate::users::get_user;
use crate::AppState;

fn validate_text(text: &str) -> Result<&str, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Message text is required".to_string()));
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Messages are limited to {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(text)
}

pub async fn create_message(
    db: &DatabaseConnection,
    author: &user::Model,
    text: &str,
) -> Result<message::Model, ApiError> {
    let text = validate_text(text)?;

    Ok(message::ActiveModel {
        text: Set(text.to_string()),
        timestamp: Set(now_utc()),
        user_id: Set(author.id),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn find_message(
    db: &DatabaseConnection,
    id: i32,
) -> Result<Option<message::Model>, ApiError> {
    Ok(message::Entity::find_by_id(id).one(db).await?)
}

pub async fn get_message(db: &DatabaseConnection, id: i32) -> Result<message::Model, ApiError> {
    find_message(db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))
}

/// Delete a message and every like pointing at it.
pub async fn delete_message(db: &DatabaseConnection, msg: message::Model) -> Result<(), ApiError> {
    let txn = db.begin().await?;
    likes::Entity::delete_many()
        .filter(likes::Column::MessageId.eq(msg.id))
        .exec(&txn)
        .await?;
    message::Entity::delete_by_id(msg.id).exec(&txn).await?;
    txn.commit().await?;
    Ok(())
}

pub async fn messages_for_user(
    db: &DatabaseConnection,
    author: &user::Model,
) -> Result<Vec<message::Model>, ApiError> {
    Ok(message::Entity::find()
        .filter(message::Column::UserId.eq(author.id))
        .order_by_desc(message::Column::Timestamp)
        .order_by_desc(message::Column::Id)
        .limit(TIMELINE_LIMIT)
        .all(db)
        .await?)
}

/// Newest messages written by `u` or anyone `u` follows.
pub async fn timeline(
    db: &DatabaseConnection,
    u: &user::Model,
) -> Result<Vec<message::Model>, ApiError> {
    let mut authors = following_ids(db, u.id).await?;
    authors.insert(u.id);

    Ok(message::Entity::find()
        .filter(message::Column::UserId.is_in(authors))
        .order_by_desc(message::Column::Timestamp)
        .order_by_desc(message::Column::Id)
        .limit(TIMELINE_LIMIT)
        .all(db)
        .await?)
}

/// Render a message list with authors and, for a logged-in viewer, like
/// buttons on other people's messages.
pub async fn render_messages(
    db: &DatabaseConnection,
    msgs: &[message::Model],
    viewer: Option<&user::Model>,
) -> Result<String, ApiError> {
    let author_ids: Vec<i32> = msgs.iter().map(|m| m.user_id).collect();
    let authors: HashMap<i32, user::Model> = user::Entity::find()
        .filter(user::Column::Id.is_in(author_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let liked = match viewer {
        Some(v) => liked_message_ids(db, v.id).await?,
        None => Default::default(),
    };

    let items: Vec<String> = msgs
        .iter()
        .filter_map(|m| {
            let author = authors.get(&m.user_id)?;
            let like = match viewer {
                Some(v) if v.id != m.user_id => {
                    if liked.contains(&m.id) {
                        LikeState::Liked
                    } else {
                        LikeState::NotLiked
                    }
                }
                _ => LikeState::Hidden,
            };
            Some(templates::message_item(m, author, like))
        })
        .collect();

    Ok(templates::message_list(&items))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageForm {
    pub text: String,
}

fn new_message_page(
    req: &HttpRequest,
    viewer: &user::Model,
    text: &str,
    errors: &[String],
) -> Result<HttpResponse, ApiError> {
    let content = templates::render(
        "messages/new.html",
        &[
            ("FORM_ERRORS", &form_errors(errors)),
            ("TEXT", &escape(text)),
        ],
    )?;
    templates::render_page(req, Page::new("New Message", Some(viewer), content))
}

// === HTTP Handlers ===

pub async fn new_message_form(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };
    new_message_page(&req, &viewer, "", &[])
}

pub async fn add_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<MessageForm>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => {
            log::warn!("anonymous attempt to post a message");
            return Ok(access_unauthorized());
        }
    };

    match create_message(&state.db, &viewer, &form.text).await {
        Ok(msg) => {
            log::info!("{} posted message #{}", viewer, msg.id);
            Ok(redirect(&format!("/users/{}", viewer.id)))
        }
        Err(ApiError::BadRequest(reason)) => {
            new_message_page(&req, &viewer, &form.text, &[reason])
        }
        Err(err) => Err(err),
    }
}

pub async fn show_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = current_user(&req, &state).await?;
    let msg = get_message(&state.db, path.into_inner()).await?;
    let author = get_user(&state.db, msg.user_id).await?;

    let actions = match viewer.as_ref() {
        Some(v) if v.id == author.id => format!(
            r#"<form method="POST" action="/messages/{}/delete"><button class="btn btn-outline-danger">Delete</button></form>"#,
            msg.id
        ),
        Some(_) => format!(
            r#"<form method="POST" action="/messages/{}/like" class="messages-like"><button class="btn btn-sm btn-secondary">&#9733;</button></form>"#,
            msg.id
        ),
        None => String::new(),
    };

    let content = templates::render(
        "messages/show.html",
        &[
            ("USER_ID", &author.id.to_string()),
            ("USERNAME", &escape(&author.username)),
            ("IMAGE_URL", &attr(&author.image_url)),
            ("TEXT", &format_text(&msg.text)),
            ("DATE", &msg.timestamp.format("%d %B %Y").to_string()),
            ("ACTIONS", &actions),
        ],
    )?;
    let title = format!("@{}", author.username);
    templates::render_page(&req, Page::new(&title, viewer.as_ref(), content))
}

pub async fn destroy_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => {
            log::warn!("anonymous attempt to delete message #{}", *path);
            return Ok(access_unauthorized());
        }
    };

    let msg = get_message(&state.db, path.into_inner()).await?;
    if msg.user_id != viewer.id {
        log::warn!("{} tried to delete message #{} they do not own", viewer, msg.id);
        return Ok(access_unauthorized());
    }

    let id = msg.id;
    delete_message(&state.db, msg).await?;
    log::info!("{} deleted message #{}", viewer, id);

    Ok(redirect(&format!("/users/{}", viewer.id)))
}

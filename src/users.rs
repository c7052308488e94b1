use actix_web::{web, HttpRequest, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use sea_orm::sea_query::{Expr, LikeExpr};
use serde::Deserialize;

use crate::auth::{current_user, session_removal_cookie};
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{access_unauthorized, hash_password, is_valid_email, redirect_with_flash, verify_password, Flash};
use crate::core::query_params::{get_int, get_string, parse_query_params};
use crate::follow::following_ids;
use crate::likes;
use crate::messages;
use crate::models::{follows, likes as likes_model, message, session, user};
use crate::templates::{self, attr, escape, form_errors, FollowButton, Page, ProfileActions, UserStats};
use crate::AppState;

pub async fn find_user(db: &DatabaseConnection, id: i32) -> Result<Option<user::Model>, ApiError> {
    Ok(user::Entity::find_by_id(id).one(db).await?)
}

pub async fn get_user(db: &DatabaseConnection, id: i32) -> Result<user::Model, ApiError> {
    find_user(db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub async fn find_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<user::Model>, ApiError> {
    Ok(user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?)
}

/// Hash the password and insert a new user. A taken username or email
/// fails with `ApiError::Conflict`.
pub async fn signup(
    db: &DatabaseConnection,
    username: &str,
    email: &str,
    password: &str,
    image_url: Option<&str>,
) -> Result<user::Model, ApiError> {
    let image_url = image_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_IMAGE_URL);

    let created = user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password: Set(hash_password(password)?),
        image_url: Set(image_url.to_string()),
        header_image_url: Set(DEFAULT_HEADER_IMAGE_URL.to_string()),
        bio: Set(None),
        location: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(created)
}

/// `None` for an unknown username or a wrong password.
pub async fn authenticate(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<user::Model>, ApiError> {
    let found = find_by_username(db, username).await?;
    Ok(found.filter(|u| verify_password(password, &u.password)))
}

/// Does `u` follow `other`?
pub async fn is_following(
    db: &DatabaseConnection,
    u: &user::Model,
    other: &user::Model,
) -> Result<bool, ApiError> {
    let edge = follows::Entity::find_by_id((other.id, u.id)).one(db).await?;
    Ok(edge.is_some())
}

/// Is `u` followed by `other`?
pub async fn is_followed_by(
    db: &DatabaseConnection,
    u: &user::Model,
    other: &user::Model,
) -> Result<bool, ApiError> {
    is_following(db, other, u).await
}

/// Users that `u` follows.
pub async fn following(
    db: &DatabaseConnection,
    u: &user::Model,
) -> Result<Vec<user::Model>, ApiError> {
    Ok(user::Entity::find()
        .join(JoinType::InnerJoin, follows::Relation::Followed.def().rev())
        .filter(follows::Column::UserFollowingId.eq(u.id))
        .order_by_asc(user::Column::Id)
        .all(db)
        .await?)
}

/// Users following `u`.
pub async fn followers(
    db: &DatabaseConnection,
    u: &user::Model,
) -> Result<Vec<user::Model>, ApiError> {
    Ok(user::Entity::find()
        .join(JoinType::InnerJoin, follows::Relation::Follower.def().rev())
        .filter(follows::Column::UserBeingFollowedId.eq(u.id))
        .order_by_asc(user::Column::Id)
        .all(db)
        .await?)
}

pub async fn stats(db: &DatabaseConnection, u: &user::Model) -> Result<UserStats, ApiError> {
    Ok(UserStats {
        messages: message::Entity::find()
            .filter(message::Column::UserId.eq(u.id))
            .count(db)
            .await?,
        following: follows::Entity::find()
            .filter(follows::Column::UserFollowingId.eq(u.id))
            .count(db)
            .await?,
        followers: follows::Entity::find()
            .filter(follows::Column::UserBeingFollowedId.eq(u.id))
            .count(db)
            .await?,
        likes: likes_model::Entity::find()
            .filter(likes_model::Column::UserId.eq(u.id))
            .count(db)
            .await?,
    })
}

/// LIKE pattern matching `q` literally anywhere in the value.
fn contains_pattern(q: &str) -> String {
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Users whose username contains `q` (all users without a query).
/// `%` and `_` in `q` match themselves.
pub async fn search(
    db: &DatabaseConnection,
    q: Option<&str>,
    page: u64,
) -> Result<Vec<user::Model>, ApiError> {
    let mut query = user::Entity::find().order_by_asc(user::Column::Username);
    if let Some(q) = q {
        query = query.filter(
            Expr::col((user::Entity, user::Column::Username))
                .like(LikeExpr::new(contains_pattern(q)).escape('\\')),
        );
    }
    Ok(query
        .paginate(db, USERS_PER_PAGE)
        .fetch_page(page.saturating_sub(1))
        .await?)
}

/// Fields left as `None` are not touched. Empty image URLs fall back to
/// the defaults; an empty bio or location clears it.
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub header_image_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub async fn update_profile(
    db: &DatabaseConnection,
    u: user::Model,
    changes: ProfileChanges,
) -> Result<user::Model, ApiError> {
    let mut active: user::ActiveModel = u.into();

    if let Some(username) = changes.username {
        active.username = Set(username);
    }
    if let Some(email) = changes.email {
        active.email = Set(email);
    }
    if let Some(image_url) = changes.image_url {
        active.image_url =
            Set(non_empty(image_url).unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string()));
    }
    if let Some(header) = changes.header_image_url {
        active.header_image_url =
            Set(non_empty(header).unwrap_or_else(|| DEFAULT_HEADER_IMAGE_URL.to_string()));
    }
    if let Some(bio) = changes.bio {
        active.bio = Set(non_empty(bio));
    }
    if let Some(location) = changes.location {
        active.location = Set(non_empty(location));
    }

    Ok(active.update(db).await?)
}

/// Remove a user together with everything hanging off it.
pub async fn delete_user(db: &DatabaseConnection, u: user::Model) -> Result<(), ApiError> {
    let txn = db.begin().await?;

    let own_message_ids: Vec<i32> = message::Entity::find()
        .select_only()
        .column(message::Column::Id)
        .filter(message::Column::UserId.eq(u.id))
        .into_tuple()
        .all(&txn)
        .await?;

    session::Entity::delete_many()
        .filter(session::Column::UserId.eq(u.id))
        .exec(&txn)
        .await?;
    likes_model::Entity::delete_many()
        .filter(
            likes_model::Column::UserId
                .eq(u.id)
                .or(likes_model::Column::MessageId.is_in(own_message_ids)),
        )
        .exec(&txn)
        .await?;
    follows::Entity::delete_many()
        .filter(
            follows::Column::UserFollowingId
                .eq(u.id)
                .or(follows::Column::UserBeingFollowedId.eq(u.id)),
        )
        .exec(&txn)
        .await?;
    message::Entity::delete_many()
        .filter(message::Column::UserId.eq(u.id))
        .exec(&txn)
        .await?;
    user::Entity::delete_by_id(u.id).exec(&txn).await?;

    txn.commit().await?;
    log::info!("deleted {}", u);
    Ok(())
}

// === Page helpers ===

fn profile_actions(viewer: Option<&user::Model>, target: &user::Model, follows: bool) -> ProfileActions {
    match viewer {
        None => ProfileActions::Anonymous,
        Some(v) if v.id == target.id => ProfileActions::Own,
        Some(_) if follows => ProfileActions::Unfollow,
        Some(_) => ProfileActions::Follow,
    }
}

/// Render `body` inside the profile layout of `target`.
async fn render_profile(
    req: &HttpRequest,
    state: &AppState,
    viewer: Option<&user::Model>,
    target: &user::Model,
    body: &str,
    flash: Option<Flash>,
) -> Result<HttpResponse, ApiError> {
    let follows = match viewer {
        Some(v) => is_following(&state.db, v, target).await?,
        None => false,
    };
    let stats = stats(&state.db, target).await?;
    let content = templates::user_detail(
        target,
        stats,
        profile_actions(viewer, target, follows),
        body,
    )?;
    let title = format!("@{}", target.username);
    let mut page = Page::new(&title, viewer, content);
    if let Some(flash) = flash {
        page = page.flash(flash);
    }
    templates::render_page(req, page)
}

/// Messages column shown on a user's main profile page.
async fn profile_messages(
    db: &DatabaseConnection,
    viewer: Option<&user::Model>,
    target: &user::Model,
) -> Result<String, ApiError> {
    let msgs = messages::messages_for_user(db, target).await?;
    let list = messages::render_messages(db, &msgs, viewer).await?;
    Ok(format!("<div class=\"col-sm-6\">\n{}\n</div>", list))
}

/// Pair every user with the follow button `viewer` should see.
async fn with_follow_buttons(
    db: &DatabaseConnection,
    viewer: Option<&user::Model>,
    list: Vec<user::Model>,
) -> Result<Vec<(user::Model, FollowButton)>, ApiError> {
    let Some(v) = viewer else {
        return Ok(list.into_iter().map(|u| (u, FollowButton::Hidden)).collect());
    };

    let followed = following_ids(db, v.id).await?;
    Ok(list
        .into_iter()
        .map(|u| {
            let button = if u.id == v.id {
                FollowButton::Hidden
            } else if followed.contains(&u.id) {
                FollowButton::Unfollow
            } else {
                FollowButton::Follow
            };
            (u, button)
        })
        .collect())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: String,
    pub location: String,
    pub password: String,
}

impl ProfileForm {
    fn from_user(u: &user::Model) -> Self {
        Self {
            username: u.username.clone(),
            email: u.email.clone(),
            image_url: u.image_url.clone(),
            header_image_url: u.header_image_url.clone(),
            bio: u.bio.clone().unwrap_or_default(),
            location: u.location.clone().unwrap_or_default(),
            password: String::new(),
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let username = self.username.trim();
        let len = username.chars().count();
        if len < MIN_USERNAME_LENGTH || len > MAX_USERNAME_LENGTH {
            errors.push(format!(
                "Username must be {}-{} characters",
                MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
            ));
        }
        if !is_valid_email(self.email.trim()) {
            errors.push("Invalid email address.".to_string());
        }
        if self.bio.chars().count() > MAX_BIO_LENGTH {
            errors.push(format!("Bio too long (max {} chars)", MAX_BIO_LENGTH));
        }
        errors
    }

    fn changes(&self) -> ProfileChanges {
        ProfileChanges {
            username: Some(self.username.trim().to_string()),
            email: Some(self.email.trim().to_string()),
            image_url: Some(self.image_url.clone()),
            header_image_url: Some(self.header_image_url.clone()),
            bio: Some(self.bio.clone()),
            location: Some(self.location.clone()),
        }
    }
}

fn edit_page(
    req: &HttpRequest,
    viewer: &user::Model,
    form: &ProfileForm,
    errors: &[String],
    flash: Option<Flash>,
) -> Result<HttpResponse, ApiError> {
    let content = templates::render(
        "users/edit.html",
        &[
            ("FORM_ERRORS", &form_errors(errors)),
            ("USER_ID", &viewer.id.to_string()),
            ("USERNAME", &attr(&form.username)),
            ("EMAIL", &attr(&form.email)),
            ("IMAGE_URL", &attr(&form.image_url)),
            ("HEADER_IMAGE_URL", &attr(&form.header_image_url)),
            ("BIO", &escape(&form.bio)),
            ("LOCATION", &attr(&form.location)),
        ],
    )?;
    let mut page = Page::new("Edit Profile", Some(viewer), content);
    if let Some(flash) = flash {
        page = page.flash(flash);
    }
    templates::render_page(req, page)
}

// === HTTP Handlers ===

pub async fn list_users(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let viewer = current_user(&req, &state).await?;
    let params = parse_query_params(req.query_string());
    let q = get_string(&params, "q");
    let page = get_int(&params, "page", 1);

    let found = search(&state.db, q.as_deref(), page).await?;
    let cards = with_follow_buttons(&state.db, viewer.as_ref(), found).await?;

    let content = format!(
        "<div class=\"row justify-content-end\">\n{}\n</div>",
        templates::user_grid(&cards)
    );
    templates::render_page(&req, Page::new("Users", viewer.as_ref(), content))
}

pub async fn show_user(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = current_user(&req, &state).await?;
    let target = get_user(&state.db, path.into_inner()).await?;

    let body = profile_messages(&state.db, viewer.as_ref(), &target).await?;
    render_profile(&req, &state, viewer.as_ref(), &target, &body, None).await
}

pub async fn show_following(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };
    let target = get_user(&state.db, path.into_inner()).await?;

    let list = following(&state.db, &target).await?;
    let cards = with_follow_buttons(&state.db, Some(&viewer), list).await?;
    render_profile(&req, &state, Some(&viewer), &target, &templates::user_grid(&cards), None).await
}

pub async fn show_followers(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };
    let target = get_user(&state.db, path.into_inner()).await?;

    let list = followers(&state.db, &target).await?;
    let cards = with_follow_buttons(&state.db, Some(&viewer), list).await?;
    render_profile(&req, &state, Some(&viewer), &target, &templates::user_grid(&cards), None).await
}

pub async fn show_likes(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };
    let target = get_user(&state.db, path.into_inner()).await?;

    let liked = likes::liked_messages(&state.db, &target).await?;
    let list = messages::render_messages(&state.db, &liked, Some(&viewer)).await?;
    let body = format!("<div class=\"col-sm-6\">\n{}\n</div>", list);
    render_profile(&req, &state, Some(&viewer), &target, &body, None).await
}

pub async fn edit_profile_form(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };
    edit_page(&req, &viewer, &ProfileForm::from_user(&viewer), &[], None)
}

pub async fn update_profile_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<ProfileForm>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };
    let form = form.into_inner();

    let errors = form.validate();
    if !errors.is_empty() {
        return edit_page(&req, &viewer, &form, &errors, None);
    }

    if !verify_password(&form.password, &viewer.password) {
        log::warn!("profile edit for {} rejected: wrong password", viewer);
        return edit_page(
            &req,
            &viewer,
            &form,
            &[],
            Some(Flash::new("danger", "Wrong password, please try again.")),
        );
    }

    match update_profile(&state.db, viewer.clone(), form.changes()).await {
        Ok(updated) => {
            log::info!("profile updated: {}", updated);
            let body = profile_messages(&state.db, Some(&updated), &updated).await?;
            render_profile(
                &req,
                &state,
                Some(&updated),
                &updated,
                &body,
                Some(Flash::new("success", "Profile updated.")),
            )
            .await
        }
        Err(err) if err.is_conflict() => edit_page(
            &req,
            &viewer,
            &form,
            &["Username or email already taken.".to_string()],
            None,
        ),
        Err(err) => Err(err),
    }
}

pub async fn delete_user_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match current_user(&req, &state).await? {
        Some(u) => u,
        None => return Ok(access_unauthorized()),
    };

    delete_user(&state.db, viewer).await?;

    let mut resp = redirect_with_flash("/signup", Flash::new("success", "Your account has been deleted."));
    resp.add_cookie(&session_removal_cookie())
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(resp)
}

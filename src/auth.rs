use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Duration;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{is_valid_email, now_utc, redirect, redirect_with_flash, validate_uuid, Flash};
use crate::models::{session, user};
use crate::templates::{self, attr, form_errors, Page};
use crate::users;
use crate::AppState;

/// Start a server-side session for `user_id` and return its id.
pub async fn do_login(db: &DatabaseConnection, user_id: i32) -> Result<String, ApiError> {
    let id = Uuid::new_v4().to_string();
    session::ActiveModel {
        id: Set(id.clone()),
        user_id: Set(user_id),
        created_at: Set(now_utc()),
    }
    .insert(db)
    .await?;
    log::debug!("session opened for user #{}", user_id);
    Ok(id)
}

pub async fn do_logout(db: &DatabaseConnection, session_id: &str) -> Result<(), ApiError> {
    session::Entity::delete_by_id(session_id.to_string())
        .exec(db)
        .await?;
    Ok(())
}

/// Drop every session older than `hours`. Returns how many were removed.
pub async fn purge_expired_sessions(db: &DatabaseConnection, hours: i64) -> Result<u64, ApiError> {
    let cutoff = now_utc() - Duration::hours(hours);
    let res = session::Entity::delete_many()
        .filter(session::Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

pub fn session_cookie(session_id: &str) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, session_id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

pub fn session_removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

pub fn session_id(req: &HttpRequest) -> Option<String> {
    let cookie = req.cookie(SESSION_COOKIE)?;
    let id = cookie.value();
    if id.is_empty() || !validate_uuid(id) {
        return None;
    }
    Some(id.to_string())
}

/// Resolve the logged-in user from the session cookie, if any.
pub async fn current_user(
    req: &HttpRequest,
    state: &AppState,
) -> Result<Option<user::Model>, ApiError> {
    let Some(sid) = session_id(req) else {
        return Ok(None);
    };

    let Some(sess) = session::Entity::find_by_id(sid.clone()).one(&state.db).await? else {
        return Ok(None);
    };

    let age = now_utc() - sess.created_at;
    if age > Duration::hours(state.config.session_expiration_hours) {
        do_logout(&state.db, &sid).await?;
        return Ok(None);
    }

    Ok(user::Entity::find_by_id(sess.user_id).one(&state.db).await?)
}

// === Forms ===

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub image_url: String,
}

impl SignupForm {
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
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ));
        }
        errors
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

fn signup_page(
    req: &HttpRequest,
    form: &SignupForm,
    errors: &[String],
    flash: Option<Flash>,
) -> Result<HttpResponse, ApiError> {
    let content = templates::render(
        "users/signup.html",
        &[
            ("FORM_ERRORS", &form_errors(errors)),
            ("USERNAME", &attr(&form.username)),
            ("EMAIL", &attr(&form.email)),
            ("IMAGE_URL", &attr(&form.image_url)),
        ],
    )?;
    let mut page = Page::new("Sign up", None, content);
    if let Some(flash) = flash {
        page = page.flash(flash);
    }
    templates::render_page(req, page)
}

fn login_page(
    req: &HttpRequest,
    form: &LoginForm,
    flash: Option<Flash>,
) -> Result<HttpResponse, ApiError> {
    let content = templates::render(
        "users/login.html",
        &[
            ("FORM_ERRORS", ""),
            ("USERNAME", &attr(&form.username)),
        ],
    )?;
    let mut page = Page::new("Log in", None, content);
    if let Some(flash) = flash {
        page = page.flash(flash);
    }
    templates::render_page(req, page)
}

fn with_session(mut resp: HttpResponse, session_id: &str) -> Result<HttpResponse, ApiError> {
    resp.add_cookie(&session_cookie(session_id))
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(resp)
}

// === HTTP Handlers ===

pub async fn signup_form(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    signup_page(&req, &SignupForm::default(), &[], None)
}

pub async fn signup(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();

    // Signing up replaces whatever session the browser carried.
    if let Some(sid) = session_id(&req) {
        do_logout(&state.db, &sid).await?;
    }

    let errors = form.validate();
    if !errors.is_empty() {
        return signup_page(&req, &form, &errors, None);
    }

    let image_url = Some(form.image_url.trim()).filter(|u| !u.is_empty());
    let created = users::signup(
        &state.db,
        form.username.trim(),
        form.email.trim(),
        &form.password,
        image_url,
    )
    .await;

    match created {
        Ok(u) => {
            log::info!("signup: {}", u);
            let sid = do_login(&state.db, u.id).await?;
            with_session(redirect("/"), &sid)
        }
        Err(err) if err.is_conflict() => {
            log::info!("signup rejected for {}: {}", form.username.trim(), err);
            signup_page(
                &req,
                &form,
                &[],
                Some(Flash::new("danger", "Username or email already taken.")),
            )
        }
        Err(err) => Err(err),
    }
}

pub async fn login_form(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    login_page(&req, &LoginForm::default(), None)
}

pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();

    match users::authenticate(&state.db, form.username.trim(), &form.password).await? {
        Some(u) => {
            let sid = do_login(&state.db, u.id).await?;
            log::info!("login: {}", u);
            let greeting = format!("Hello, {}!", u.username);
            with_session(redirect_with_flash("/", Flash::new("success", &greeting)), &sid)
        }
        None => {
            log::warn!("failed login for {:?}", form.username.trim());
            login_page(&req, &form, Some(Flash::new("danger", "Invalid credentials.")))
        }
    }
}

pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if let Some(sid) = session_id(&req) {
        do_logout(&state.db, &sid).await?;
    }

    let mut resp = redirect_with_flash(
        "/login",
        Flash::new("success", "You have successfully logged out."),
    );
    resp.add_cookie(&session_removal_cookie())
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(resp)
}

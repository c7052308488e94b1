use actix_web::cookie::Cookie;
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::FLASH_COOKIE;

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Regex should compile")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// One-shot notice shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

impl Flash {
    pub fn new(category: &str, message: &str) -> Self {
        Self {
            category: category.to_string(),
            message: message.to_string(),
        }
    }

    fn encode(&self) -> String {
        format!("{}:{}", self.category, urlencoding::encode(&self.message))
    }

    fn decode(raw: &str) -> Option<Self> {
        let (category, encoded) = raw.split_once(':')?;
        let message = urlencoding::decode(encoded).ok()?.into_owned();
        Some(Self {
            category: category.to_string(),
            message,
        })
    }
}

pub fn flash_cookie(flash: &Flash) -> Cookie<'static> {
    Cookie::build(FLASH_COOKIE, flash.encode())
        .path("/")
        .http_only(true)
        .finish()
}

pub fn flash_removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(FLASH_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

pub fn read_flash(req: &HttpRequest) -> Option<Flash> {
    req.cookie(FLASH_COOKIE)
        .and_then(|c| Flash::decode(c.value()))
}

/// 302 with a small HTML body linking the target.
pub fn redirect(location: &str) -> HttpResponse {
    let escaped = html_escape::encode_double_quoted_attribute(location);
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .content_type("text/html; charset=utf-8")
        .body(format!(
            "<!doctype html>\n<html lang=en>\n<title>Redirecting...</title>\n<h1>Redirecting...</h1>\n<p>You should be redirected automatically to the target URL: <a href=\"{0}\">{0}</a>. If not, click the link.\n",
            escaped
        ))
}

pub fn redirect_with_flash(location: &str, flash: Flash) -> HttpResponse {
    let mut resp = redirect(location);
    // Cookie values built here are always valid header values.
    let _ = resp.add_cookie(&flash_cookie(&flash));
    resp
}

pub fn access_unauthorized() -> HttpResponse {
    redirect_with_flash("/", Flash::new("danger", "Access unauthorized."))
}

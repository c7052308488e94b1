#![allow(dead_code)]

use actix_web::cookie::Cookie;
use actix_web::web;
use sea_orm::DatabaseConnection;

use warbler::auth;
use warbler::config::Config;
use warbler::core::db;
use warbler::models::{message, user};
use warbler::{messages, users, AppState};

pub async fn app_state() -> web::Data<AppState> {
    let config = Config::in_memory();
    let db = db::connect(&config).await.expect("in-memory database");
    web::Data::new(AppState { db, config })
}

pub async fn create_user(db: &DatabaseConnection, name: &str) -> user::Model {
    users::signup(db, name, &format!("{}@test.com", name), "password", None)
        .await
        .expect("signup")
}

pub async fn create_message(db: &DatabaseConnection, author: &user::Model, text: &str) -> message::Model {
    messages::create_message(db, author, text)
        .await
        .expect("create message")
}

/// Open a session for `u` and return the cookie a browser would send.
pub async fn login(db: &DatabaseConnection, u: &user::Model) -> Cookie<'static> {
    let sid = auth::do_login(db, u.id).await.expect("login");
    auth::session_cookie(&sid)
}

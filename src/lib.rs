use actix_web::web;
use sea_orm::DatabaseConnection;

pub mod auth;
pub mod config;
pub mod core;
pub mod follow;
pub mod handlers;
pub mod likes;
pub mod messages;
pub mod models;
pub mod static_server;
pub mod templates;
pub mod users;

use config::Config;

/// Shared state handed to every handler through `web::Data`.
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
}

// === Routes ===
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::homepage))
        .route("/signup", web::get().to(auth::signup_form))
        .route("/signup", web::post().to(auth::signup))
        .route("/login", web::get().to(auth::login_form))
        .route("/login", web::post().to(auth::login))
        .route("/logout", web::get().to(auth::logout))
        .route("/users", web::get().to(users::list_users))
        // literal segments must win over `/users/{id}`
        .route("/users/profile", web::get().to(users::edit_profile_form))
        .route("/users/profile", web::post().to(users::update_profile_handler))
        .route("/users/delete", web::post().to(users::delete_user_handler))
        .route("/users/follow/{id}", web::post().to(follow::add_follow))
        .route("/users/stop-following/{id}", web::post().to(follow::stop_following))
        .route("/users/{id}", web::get().to(users::show_user))
        .route("/users/{id}/following", web::get().to(users::show_following))
        .route("/users/{id}/followers", web::get().to(users::show_followers))
        .route("/users/{id}/likes", web::get().to(users::show_likes))
        .route("/messages/new", web::get().to(messages::new_message_form))
        .route("/messages/new", web::post().to(messages::add_message))
        .route("/messages/{id}", web::get().to(messages::show_message))
        .route("/messages/{id}/delete", web::post().to(messages::destroy_message))
        .route("/messages/{id}/like", web::post().to(likes::handle_toggle_like))
        .route("/static/{tail:.*}", web::get().to(static_server::static_file));
}

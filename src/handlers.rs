use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::current_user;
use crate::core::errors::ApiError;
use crate::messages::{render_messages, timeline};
use crate::templates::{self, attr, escape, Page};
use crate::users::stats;
use crate::AppState;

/// Timeline for a logged-in user, landing page otherwise.
pub async fn homepage(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let Some(viewer) = current_user(&req, &state).await? else {
        let content = templates::render("home-anon.html", &[])?;
        return templates::render_page(
            &req,
            Page::new("Warbler", None, content).body_class("homepage"),
        );
    };

    let msgs = timeline(&state.db, &viewer).await?;
    let list = render_messages(&state.db, &msgs, Some(&viewer)).await?;
    let counts = stats(&state.db, &viewer).await?;

    let content = templates::render(
        "home.html",
        &[
            ("USER_ID", &viewer.id.to_string()),
            ("USERNAME", &escape(&viewer.username)),
            ("IMAGE_URL", &attr(&viewer.image_url)),
            ("HEADER_IMAGE_URL", &attr(&viewer.header_image_url)),
            ("MESSAGE_COUNT", &counts.messages.to_string()),
            ("FOLLOWING_COUNT", &counts.following.to_string()),
            ("FOLLOWERS_COUNT", &counts.followers.to_string()),
            ("MESSAGES", &list),
        ],
    )?;
    templates::render_page(&req, Page::new("Warbler", Some(&viewer), content))
}

pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    log::debug!("no route for {} {}", req.method(), req.path());
    Err(ApiError::NotFound(format!("{} does not exist", req.path())))
}

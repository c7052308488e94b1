use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use ammonia::Builder;
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use rust_embed::RustEmbed;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::core::errors::ApiError;
use crate::core::helpers::{flash_removal_cookie, read_flash, Flash};
use crate::models::{message, user};

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

fn load(name: &str) -> Result<String, ApiError> {
    let file = Templates::get(name)
        .ok_or_else(|| ApiError::InternalError(format!("Template {} not found", name)))?;
    String::from_utf8(file.data.to_vec())
        .map_err(|e| ApiError::InternalError(format!("Template {} is not UTF-8: {}", name, e)))
}

/// Substitute `{{KEY}}` markers in one pass. Inserted values are never
/// rescanned, so user text cannot smuggle in a placeholder.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match values.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn render(name: &str, values: &[(&str, &str)]) -> Result<String, ApiError> {
    Ok(fill(&load(name)?, values))
}

pub fn escape(text: &str) -> String {
    encode_text(text).to_string()
}

pub fn attr(text: &str) -> String {
    encode_double_quoted_attribute(text).to_string()
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s<]+").expect("Regex should compile"))
}

/// Message and bio bodies: strip all markup, then turn bare URLs into links.
pub fn format_text(text: &str) -> String {
    let clean = Builder::default().tags(HashSet::new()).clean(text).to_string();

    url_regex()
        .replace_all(&clean, |caps: &regex::Captures| {
            let url = &caps[0];
            format!(
                r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
                url, url
            )
        })
        .to_string()
}

pub struct Page<'a> {
    pub title: &'a str,
    pub current_user: Option<&'a user::Model>,
    pub content: String,
    pub body_class: &'a str,
    /// Shown instead of any flash carried by the request cookie.
    pub flash: Option<Flash>,
}

impl<'a> Page<'a> {
    pub fn new(title: &'a str, current_user: Option<&'a user::Model>, content: String) -> Self {
        Self {
            title,
            current_user,
            content,
            body_class: "",
            flash: None,
        }
    }

    pub fn body_class(mut self, class: &'a str) -> Self {
        self.body_class = class;
        self
    }

    pub fn flash(mut self, flash: Flash) -> Self {
        self.flash = Some(flash);
        self
    }
}

fn nav(current_user: Option<&user::Model>) -> String {
    match current_user {
        Some(u) => format!(
            r#"      <li>
        <form class="navbar-form navbar-right" action="/users">
          <input name="q" class="form-control" placeholder="Search Warbler" id="search">
          <button class="btn btn-default">Search</button>
        </form>
      </li>
      <li><a href="/users/{id}"><img src="{image}" alt="{username}"></a></li>
      <li><a href="/messages/new">New Message</a></li>
      <li><a href="/logout">Log out</a></li>"#,
            id = u.id,
            image = attr(&u.image_url),
            username = attr(&u.username),
        ),
        None => r#"      <li><a href="/signup">Sign up</a></li>
      <li><a href="/login">Log in</a></li>"#
            .to_string(),
    }
}

fn flash_html(flash: Option<&Flash>) -> String {
    flash
        .map(|f| {
            format!(
                r#"<div class="alert alert-{}">{}</div>"#,
                attr(&f.category),
                escape(&f.message)
            )
        })
        .unwrap_or_default()
}

fn render_base(page: &Page<'_>, flash: Option<&Flash>) -> Result<String, ApiError> {
    render(
        "base.html",
        &[
            ("PAGE_TITLE", &escape(page.title)),
            ("PAGE_BODY_CLASS", &attr(page.body_class)),
            ("PAGE_NAV", &nav(page.current_user)),
            ("PAGE_FLASHES", &flash_html(flash)),
            ("PAGE_CONTENT", &page.content),
        ],
    )
}

/// Render a full page with status 200, consuming any pending flash.
pub fn render_page(req: &HttpRequest, page: Page<'_>) -> Result<HttpResponse, ApiError> {
    let cookie_flash = read_flash(req);
    let flash = page.flash.clone().or_else(|| cookie_flash.clone());
    let html = render_base(&page, flash.as_ref())?;

    let mut builder = HttpResponse::Ok();
    builder.content_type("text/html; charset=utf-8");
    if cookie_flash.is_some() {
        builder.cookie(flash_removal_cookie());
    }
    Ok(builder.body(html))
}

/// Error pages never fail; a missing template degrades to plain markup.
pub fn error_page(status: StatusCode, detail: &str) -> String {
    let heading = status.canonical_reason().unwrap_or("Error");
    let content = format!(
        r#"<div class="row justify-content-center">
  <div class="col-md-6 error-page">
    <h1>{}</h1>
    <p>{}</p>
    <a href="/" class="btn btn-primary">Take me home</a>
  </div>
</div>"#,
        status.as_u16(),
        escape(detail)
    );
    let page = Page::new(heading, None, content);
    render_base(&page, None).unwrap_or(page.content)
}

pub fn form_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!(r#"<span class="text-danger">{}</span>"#, escape(e)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowButton {
    Hidden,
    Follow,
    Unfollow,
}

fn follow_button_html(target_id: i32, button: FollowButton) -> String {
    match button {
        FollowButton::Hidden => String::new(),
        FollowButton::Follow => format!(
            r#"<form method="POST" action="/users/follow/{}"><button class="btn btn-outline-primary btn-sm">Follow</button></form>"#,
            target_id
        ),
        FollowButton::Unfollow => format!(
            r#"<form method="POST" action="/users/stop-following/{}"><button class="btn btn-primary btn-sm">Unfollow</button></form>"#,
            target_id
        ),
    }
}

pub fn user_card(u: &user::Model, button: FollowButton) -> String {
    format!(
        r#"<div class="col-lg-4 col-md-6 col-12">
  <div class="card user-card">
    <div class="card-inner">
      <div class="image-wrapper">
        <img src="{header}" alt="" class="card-hero">
      </div>
      <div class="card-contents">
        <a href="/users/{id}" class="card-link">
          <img src="{image}" alt="Image for {username}" class="card-image">
          <p>@{username}</p>
        </a>
        {button}
      </div>
      <p class="card-bio">{bio}</p>
    </div>
  </div>
</div>"#,
        header = attr(&u.header_image_url),
        id = u.id,
        image = attr(&u.image_url),
        username = escape(&u.username),
        button = follow_button_html(u.id, button),
        bio = u.bio.as_deref().map(format_text).unwrap_or_default(),
    )
}

pub fn user_grid(users: &[(user::Model, FollowButton)]) -> String {
    if users.is_empty() {
        return r#"<div class="col-sm-9"><h3>Sorry, no users found</h3></div>"#.to_string();
    }
    let cards: Vec<String> = users.iter().map(|(u, b)| user_card(u, *b)).collect();
    format!(
        "<div class=\"col-sm-9\">\n<div class=\"row\">\n{}\n</div>\n</div>",
        cards.join("\n")
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeState {
    Hidden,
    Liked,
    NotLiked,
}

pub fn message_item(msg: &message::Model, author: &user::Model, like: LikeState) -> String {
    let like_form = match like {
        LikeState::Hidden => String::new(),
        LikeState::Liked | LikeState::NotLiked => format!(
            r#"<form method="POST" action="/messages/{}/like" class="messages-like">
      <button class="btn btn-sm {}">&#9733;</button>
    </form>"#,
            msg.id,
            if like == LikeState::Liked { "btn-primary" } else { "btn-secondary" }
        ),
    };

    format!(
        r#"<li class="list-group-item">
    <a href="/messages/{msg_id}" class="message-link"></a>
    <a href="/users/{user_id}"><img src="{image}" alt="" class="timeline-image"></a>
    <div class="message-area">
      <a href="/users/{user_id}">@{username}</a>
      <span class="text-muted">{date}</span>
      <p>{text}</p>
    </div>
    {like_form}
  </li>"#,
        msg_id = msg.id,
        user_id = author.id,
        image = attr(&author.image_url),
        username = escape(&author.username),
        date = msg.timestamp.format("%d %B %Y"),
        text = format_text(&msg.text),
        like_form = like_form,
    )
}

pub fn message_list(items: &[String]) -> String {
    format!(
        "<ul class=\"list-group\" id=\"messages\">\n{}\n</ul>",
        items.join("\n")
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub messages: u64,
    pub following: u64,
    pub followers: u64,
    pub likes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileActions {
    Anonymous,
    Own,
    Follow,
    Unfollow,
}

fn profile_actions_html(u: &user::Model, actions: ProfileActions) -> String {
    match actions {
        ProfileActions::Anonymous => String::new(),
        ProfileActions::Own => r#"<a href="/users/profile" class="btn btn-outline-secondary">Edit Profile</a>
          <form method="POST" action="/users/delete" class="form-inline">
            <button class="btn btn-outline-danger ml-2">Delete Profile</button>
          </form>"#
            .to_string(),
        ProfileActions::Follow => follow_button_html(u.id, FollowButton::Follow),
        ProfileActions::Unfollow => follow_button_html(u.id, FollowButton::Unfollow),
    }
}

/// Profile header, stats and sidebar wrapped around `body`.
pub fn user_detail(
    u: &user::Model,
    stats: UserStats,
    actions: ProfileActions,
    body: &str,
) -> Result<String, ApiError> {
    render(
        "users/detail.html",
        &[
            ("USER_ID", &u.id.to_string()),
            ("USERNAME", &escape(&u.username)),
            ("USERNAME_ATTR", &attr(&u.username)),
            ("IMAGE_URL", &attr(&u.image_url)),
            ("HEADER_IMAGE_URL", &attr(&u.header_image_url)),
            ("BIO", &u.bio.as_deref().map(format_text).unwrap_or_default()),
            ("LOCATION", &u.location.as_deref().map(escape).unwrap_or_default()),
            ("MESSAGE_COUNT", &stats.messages.to_string()),
            ("FOLLOWING_COUNT", &stats.following.to_string()),
            ("FOLLOWERS_COUNT", &stats.followers.to_string()),
            ("LIKES_COUNT", &stats.likes.to_string()),
            ("ACTIONS", &profile_actions_html(u, actions)),
            ("DETAIL_CONTENT", body),
        ],
    )
}

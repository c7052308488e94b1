mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use sea_orm::{EntityTrait, PaginatorTrait};

use common::{app_state, create_message, create_user, login};
use warbler::models::{likes as likes_model, message};
use warbler::{configure_routes, handlers, likes, users};

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(configure_routes)
                .default_service(web::to(handlers::not_found)),
        )
        .await
    };
}

fn location(resp: &actix_web::dev::ServiceResponse) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn body_text(resp: actix_web::dev::ServiceResponse) -> String {
    String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
}

#[actix_web::test]
async fn test_anonymous_homepage() {
    let state = app_state().await;
    let app = app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("New to Warbler?"));
    assert!(body.contains(r#"<a href="/signup">Sign up</a>"#));
}

#[actix_web::test]
async fn test_homepage_shows_timeline() {
    let state = app_state().await;
    let me = create_user(&state.db, "testuser").await;
    let friend = create_user(&state.db, "friend").await;
    create_message(&state.db, &friend, "hello from a friend").await;
    warbler::follow::follow_user(&state.db, me.id, friend.id).await.unwrap();
    let cookie = login(&state.db, &me).await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/").cookie(cookie).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("hello from a friend"));
    assert!(body.contains("@testuser"));
}

#[actix_web::test]
async fn test_signup_logs_in() {
    let state = app_state().await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/signup")
        .set_form([
            ("username", "newbie"),
            ("email", "newbie@test.com"),
            ("password", "password"),
            ("image_url", ""),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
    assert!(resp
        .response()
        .cookies()
        .any(|c| c.name() == "warbler_session" && !c.value().is_empty()));

    let created = users::find_by_username(&state.db, "newbie").await.unwrap().unwrap();
    assert_eq!(created.image_url, "/static/images/default-pic.svg");
}

#[actix_web::test]
async fn test_signup_duplicate_username() {
    let state = app_state().await;
    create_user(&state.db, "taken").await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/signup")
        .set_form([
            ("username", "taken"),
            ("email", "someone@test.com"),
            ("password", "password"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Username or email already taken."));
}

#[actix_web::test]
async fn test_login() {
    let state = app_state().await;
    create_user(&state.db, "testuser").await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/login")
        .set_form([("username", "testuser"), ("password", "password")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");

    let req = test::TestRequest::post()
        .uri("/login")
        .set_form([("username", "testuser"), ("password", "nope")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Invalid credentials."));
}

#[actix_web::test]
async fn test_logout() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    let cookie = login(&state.db, &u).await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/logout").cookie(cookie.clone()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/login");
    assert!(body_text(resp).await.contains(r#"<a href="/login">/login</a>"#));

    // the old session no longer works
    let req = test::TestRequest::get().uri("/messages/new").cookie(cookie).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(location(&resp), "/");
}

#[actix_web::test]
async fn test_users_index_shows_follow_buttons() {
    let state = app_state().await;
    let me = create_user(&state.db, "viewer").await;
    let other = create_user(&state.db, "testuser").await;
    let cookie = login(&state.db, &me).await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/users").cookie(cookie).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("@testuser"));
    assert!(body.contains(&format!(r#"action="/users/follow/{}""#, other.id)));
    assert!(body.contains(r#"<button class="btn btn-outline-primary btn-sm">Follow</button>"#));
    assert!(!body.contains(&format!(r#"action="/users/follow/{}""#, me.id)));
}

#[actix_web::test]
async fn test_users_search() {
    let state = app_state().await;
    create_user(&state.db, "alice").await;
    create_user(&state.db, "bob").await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/users?q=ali").to_request();
    let body = body_text(test::call_service(&app, req).await).await;
    assert!(body.contains("@alice"));
    assert!(!body.contains("@bob"));

    let req = test::TestRequest::get().uri("/users?q=zzz").to_request();
    let body = body_text(test::call_service(&app, req).await).await;
    assert!(body.contains("Sorry, no users found"));
}

#[actix_web::test]
async fn test_user_show() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    create_message(&state.db, &u, "my first warble").await;
    let app = app!(state);

    let req = test::TestRequest::get().uri(&format!("/users/{}", u.id)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains(&format!(r#"<a href="/users/{}">@testuser</a>"#, u.id)));
    assert!(body.contains("my first warble"));
}

#[actix_web::test]
async fn test_unknown_user_is_404() {
    let state = app_state().await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/users/9999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/no/such/page").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_following_and_followers_pages() {
    let state = app_state().await;
    let u1 = create_user(&state.db, "user1").await;
    let u2 = create_user(&state.db, "user2").await;
    warbler::follow::follow_user(&state.db, u1.id, u2.id).await.unwrap();
    let cookie = login(&state.db, &u1).await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}/following", u1.id))
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains(r#"<p class="small">Following</p>"#));
    assert!(body.contains("@user2"));

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}/followers", u2.id))
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains(r#"<p class="small">Followers</p>"#));
    assert!(body.contains("@user1"));
}

#[actix_web::test]
async fn test_follow_pages_require_login() {
    let state = app_state().await;
    let u = create_user(&state.db, "user1").await;
    let app = app!(state);

    for page in ["following", "followers", "likes"] {
        let req = test::TestRequest::get()
            .uri(&format!("/users/{}/{}", u.id, page))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/");
    }
}

#[actix_web::test]
async fn test_follow_and_stop_following() {
    let state = app_state().await;
    let u1 = create_user(&state.db, "user1").await;
    let u2 = create_user(&state.db, "user2").await;
    let cookie = login(&state.db, &u1).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/users/follow/{}", u2.id))
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), format!("/users/{}/following", u1.id));
    assert!(users::is_following(&state.db, &u1, &u2).await.unwrap());

    let req = test::TestRequest::post()
        .uri(&format!("/users/stop-following/{}", u2.id))
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), format!("/users/{}/following", u1.id));
    assert!(!users::is_following(&state.db, &u1, &u2).await.unwrap());
}

#[actix_web::test]
async fn test_protected_posts_logged_out() {
    let state = app_state().await;
    let u1 = create_user(&state.db, "user1").await;
    let u2 = create_user(&state.db, "user2").await;
    let u3 = create_user(&state.db, "user3").await;
    warbler::follow::follow_user(&state.db, u1.id, u2.id).await.unwrap();
    let m = create_message(&state.db, &u2, "liked already").await;
    likes::like_message(&state.db, u1.id, m.id).await.unwrap();
    let app = app!(state);

    let routes = [
        (format!("/users/stop-following/{}", u2.id), vec![]),
        (format!("/users/follow/{}", u3.id), vec![]),
        (format!("/messages/{}/like", m.id), vec![]),
        (format!("/messages/{}/delete", m.id), vec![]),
        ("/messages/new".to_string(), vec![("text", "sneaky")]),
        ("/users/delete".to_string(), vec![]),
        (
            "/users/profile".to_string(),
            vec![
                ("username", "hijacked"),
                ("email", "hijacked@test.com"),
                ("password", "password"),
            ],
        ),
    ];

    for (uri, form) in routes {
        let req = test::TestRequest::post().uri(&uri).set_form(&form).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{}", uri);
        assert_eq!(location(&resp), "/", "{}", uri);
    }

    assert!(users::is_following(&state.db, &u1, &u2).await.unwrap());
    assert!(!users::is_following(&state.db, &u1, &u3).await.unwrap());
    assert_eq!(warbler::models::follows::Entity::find().count(&state.db).await.unwrap(), 1);
    assert!(likes::is_liked(&state.db, u1.id, m.id).await.unwrap());
    assert_eq!(likes_model::Entity::find().count(&state.db).await.unwrap(), 1);
    assert_eq!(message::Entity::find().count(&state.db).await.unwrap(), 1);
    assert_eq!(warbler::models::user::Entity::find().count(&state.db).await.unwrap(), 3);
    for u in [&u1, &u2, &u3] {
        let fresh = users::get_user(&state.db, u.id).await.unwrap();
        assert_eq!(fresh.username, u.username);
        assert_eq!(fresh.email, u.email);
    }
}

#[actix_web::test]
async fn test_add_message() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    let cookie = login(&state.db, &u).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/messages/new")
        .cookie(cookie)
        .set_form([("text", "Hello")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), format!("/users/{}", u.id));

    let all = message::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].text, "Hello");
    assert_eq!(all[0].user_id, u.id);
}

#[actix_web::test]
async fn test_add_message_too_long() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    let cookie = login(&state.db, &u).await;
    let app = app!(state);

    let text = "x".repeat(141);
    let req = test::TestRequest::post()
        .uri("/messages/new")
        .cookie(cookie)
        .set_form([("text", text.as_str())])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("limited to 140 characters"));
    assert_eq!(message::Entity::find().count(&state.db).await.unwrap(), 0);
}

#[actix_web::test]
async fn test_add_message_logged_out() {
    let state = app_state().await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/messages/new")
        .set_form([("text", "Hello")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
    assert!(resp
        .response()
        .cookies()
        .any(|c| c.name() == "warbler_flash" && c.value().contains("unauthorized")));
    assert_eq!(message::Entity::find().count(&state.db).await.unwrap(), 0);
}

#[actix_web::test]
async fn test_show_message() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    let m = create_message(&state.db, &u, "look at https://example.com").await;
    let app = app!(state);

    let req = test::TestRequest::get().uri(&format!("/messages/{}", m.id)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains(r#"<a href="https://example.com""#));

    let req = test::TestRequest::get().uri("/messages/9999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_delete_message() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    let m = create_message(&state.db, &u, "delete me").await;
    let cookie = login(&state.db, &u).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/delete", m.id))
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), format!("/users/{}", u.id));
    assert!(message::Entity::find_by_id(m.id).one(&state.db).await.unwrap().is_none());
}

#[actix_web::test]
async fn test_delete_message_logged_out() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    let m = create_message(&state.db, &u, "keep me").await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/delete", m.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
    assert!(message::Entity::find_by_id(m.id).one(&state.db).await.unwrap().is_some());
}

#[actix_web::test]
async fn test_delete_other_users_message() {
    let state = app_state().await;
    let owner = create_user(&state.db, "owner").await;
    let intruder = create_user(&state.db, "intruder").await;
    let m = create_message(&state.db, &owner, "not yours").await;
    let cookie = login(&state.db, &intruder).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/delete", m.id))
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
    assert!(message::Entity::find_by_id(m.id).one(&state.db).await.unwrap().is_some());
}

#[actix_web::test]
async fn test_like_toggle() {
    let state = app_state().await;
    let author = create_user(&state.db, "author").await;
    let fan = create_user(&state.db, "fan").await;
    let m = create_message(&state.db, &author, "like me").await;
    let fan_cookie = login(&state.db, &fan).await;
    let author_cookie = login(&state.db, &author).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/like", m.id))
        .cookie(fan_cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(likes::is_liked(&state.db, fan.id, m.id).await.unwrap());

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}/likes", fan.id))
        .cookie(fan_cookie.clone())
        .to_request();
    let body = body_text(test::call_service(&app, req).await).await;
    assert!(body.contains("like me"));

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/like", m.id))
        .cookie(fan_cookie)
        .to_request();
    test::call_service(&app, req).await;
    assert!(!likes::is_liked(&state.db, fan.id, m.id).await.unwrap());

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/like", m.id))
        .cookie(author_cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(likes_model::Entity::find().count(&state.db).await.unwrap(), 0);
}

#[actix_web::test]
async fn test_edit_profile() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    let cookie = login(&state.db, &u).await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/users/profile")
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains(r#"value="testuser@test.com""#));

    let req = test::TestRequest::post()
        .uri("/users/profile")
        .cookie(cookie)
        .set_form([
            ("username", "renamed"),
            ("email", "renamed@test.com"),
            ("image_url", ""),
            ("header_image_url", ""),
            ("bio", "Hello there"),
            ("location", "Porto"),
            ("password", "password"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("Profile updated."));
    assert!(body.contains(&format!(r#"<a href="/users/{}">@renamed</a>"#, u.id)));

    let updated = users::get_user(&state.db, u.id).await.unwrap();
    assert_eq!(updated.username, "renamed");
    assert_eq!(updated.email, "renamed@test.com");
    assert_eq!(updated.bio.as_deref(), Some("Hello there"));
    assert_eq!(updated.location.as_deref(), Some("Porto"));
}

#[actix_web::test]
async fn test_edit_profile_keeping_username() {
    let state = app_state().await;
    let u = users::signup(&state.db, "testuser2", "test2@test.com", "password", None)
        .await
        .unwrap();
    let cookie = login(&state.db, &u).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/users/profile")
        .cookie(cookie)
        .set_form([
            ("username", "testuser2"),
            ("email", "test2@test.com"),
            ("image_url", ""),
            ("header_image_url", ""),
            ("bio", ""),
            ("password", "password"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let updated = users::get_user(&state.db, u.id).await.unwrap();
    assert_eq!(updated.username, "testuser2");
    assert_eq!(updated.email, "test2@test.com");
    assert_eq!(updated.image_url, "/static/images/default-pic.svg");
    assert_eq!(updated.header_image_url, "/static/images/warbler-hero.svg");
    assert_eq!(updated.bio, None);
}

#[actix_web::test]
async fn test_edit_profile_wrong_password() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    let cookie = login(&state.db, &u).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/users/profile")
        .cookie(cookie)
        .set_form([
            ("username", "renamed"),
            ("email", "renamed@test.com"),
            ("password", "not-my-password"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Wrong password, please try again."));

    let unchanged = users::get_user(&state.db, u.id).await.unwrap();
    assert_eq!(unchanged.username, "testuser");
}

#[actix_web::test]
async fn test_delete_account() {
    let state = app_state().await;
    let u = create_user(&state.db, "testuser").await;
    create_message(&state.db, &u, "soon gone").await;
    let cookie = login(&state.db, &u).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/users/delete")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/signup");
    assert!(users::find_user(&state.db, u.id).await.unwrap().is_none());
    assert_eq!(message::Entity::find().count(&state.db).await.unwrap(), 0);
}

#[actix_web::test]
async fn test_static_assets() {
    let state = app_state().await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/static/stylesheets/style.css").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/static/missing.css").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

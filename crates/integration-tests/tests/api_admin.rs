use axum::http::StatusCode;
use chrono::Duration;
use domains::MessageStatus;
use integration_tests::{TestApp, ADMIN_EMAIL, ADMIN_PASSWORD};
use serde_json::json;

#[tokio::test]
async fn admin_routes_need_a_session() {
    let app = TestApp::new();
    app.submit("a@x.com", "A", "hi", "10.1.0.1").await;
    let id = app.store.messages_for("a@x.com")[0].id.to_string();

    let listing = app.get("/admin/messages", None).await;
    assert_eq!(listing.status, StatusCode::FORBIDDEN);
    assert_eq!(listing.json()["message"], "Unauthorized access");

    for path in ["/admin/respond", "/admin/block", "/admin/delete_message"] {
        let response = app
            .post_json(path, json!({ "_id": id, "status": "responded" }), None)
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{path}");
    }

    let forged = app
        .get("/admin/messages", Some("portfolio_session=not.a.session"))
        .await;
    assert_eq!(forged.status, StatusCode::FORBIDDEN);

    assert_eq!(app.store.messages_for("a@x.com")[0].status, MessageStatus::Pending);
}

#[tokio::test]
async fn login_checks_credentials() {
    let app = TestApp::new();

    let missing = app
        .post_json("/admin/login", json!({ "email": ADMIN_EMAIL }), None)
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()["message"], "Email and password required");

    let wrong = app
        .post_json(
            "/admin/login",
            json!({ "email": ADMIN_EMAIL, "password": "guess" }),
            None,
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert!(!wrong.headers.contains_key("set-cookie"));

    let right = app
        .post_json(
            "/admin/login",
            json!({ "email": ADMIN_EMAIL.to_uppercase(), "password": ADMIN_PASSWORD }),
            None,
        )
        .await;
    assert_eq!(right.status, StatusCode::OK);
    let cookie = right.headers["set-cookie"].to_str().unwrap();
    assert!(cookie.starts_with("portfolio_session="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn check_auth_follows_login_and_logout() {
    let app = TestApp::new();

    let anonymous = app.get("/admin/check-auth", None).await.json();
    assert_eq!(anonymous["authenticated"], false);
    assert_eq!(anonymous["admin"], false);

    let cookie = app.login().await;
    let signed_in = app.get("/admin/check-auth", Some(&cookie)).await.json();
    assert_eq!(signed_in["authenticated"], true);
    assert_eq!(signed_in["admin"], true);
    assert_eq!(signed_in["email"], ADMIN_EMAIL);

    let logout = app.post_json("/admin/logout", json!({}), Some(&cookie)).await;
    assert_eq!(logout.status, StatusCode::OK);
    assert!(logout.headers["set-cookie"]
        .to_str()
        .unwrap()
        .contains("Max-Age=0"));

    let after = app.get("/admin/check-auth", Some(&cookie)).await.json();
    assert_eq!(after["authenticated"], false);
    assert_eq!(
        app.get("/admin/messages", Some(&cookie)).await.status,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn sessions_expire() {
    let app = TestApp::new();
    let cookie = app.login().await;
    assert_eq!(app.get("/admin/messages", Some(&cookie)).await.status, StatusCode::OK);

    app.clock.advance(Duration::hours(12) + Duration::minutes(1));
    assert_eq!(
        app.get("/admin/messages", Some(&cookie)).await.status,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn messages_are_listed_newest_first() {
    let app = TestApp::new();
    for (n, email) in ["one@x.com", "two@x.com", "three@x.com"].iter().enumerate() {
        let ip = format!("10.1.1.{n}");
        assert_eq!(app.submit(email, "N", "hello", &ip).await.status, StatusCode::OK);
        app.clock.advance(Duration::seconds(5));
    }
    let cookie = app.login().await;

    let first = app.get("/admin/messages?page=1&limit=2", Some(&cookie)).await;
    assert_eq!(first.status, StatusCode::OK);
    let first = first.json();
    assert_eq!(first["count"], 2);
    assert_eq!(first["data"][0]["email"], "three@x.com");
    assert_eq!(first["data"][1]["email"], "two@x.com");
    assert_eq!(first["data"][0]["status"], "pending");

    let second = app
        .get("/admin/messages?page=2&limit=2", Some(&cookie))
        .await
        .json();
    assert_eq!(second["count"], 1);
    assert_eq!(second["data"][0]["email"], "one@x.com");

    let bad = app.get("/admin/messages?page=abc", Some(&cookie)).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn respond_accepts_any_label_but_reports_no_ops() {
    let app = TestApp::new();
    app.submit("a@x.com", "A", "hi", "10.1.2.1").await;
    let id = app.store.messages_for("a@x.com")[0].id.to_string();
    let cookie = app.login().await;

    let archived = app
        .post_json(
            "/admin/respond",
            json!({ "_id": id, "status": "archived" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(archived.status, StatusCode::OK);
    assert_eq!(
        app.store.messages_for("a@x.com")[0].status,
        MessageStatus::Other("archived".to_string())
    );

    let repeat = app
        .post_json(
            "/admin/respond",
            json!({ "_id": id, "status": "archived" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(repeat.status, StatusCode::NOT_FOUND);

    let unknown = app
        .post_json(
            "/admin/respond",
            json!({ "_id": uuid::Uuid::new_v4().to_string(), "status": "responded" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let garbled = app
        .post_json(
            "/admin/respond",
            json!({ "_id": "42", "status": "responded" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(garbled.status, StatusCode::BAD_REQUEST);

    let no_status = app
        .post_json("/admin/respond", json!({ "_id": id }), Some(&cookie))
        .await;
    assert_eq!(no_status.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_block_covers_every_message_from_the_sender() {
    let app = TestApp::new();
    app.submit("a@x.com", "A", "hi", "10.1.3.1").await;
    let id = app.store.messages_for("a@x.com")[0].id.to_string();
    let cookie = app.login().await;

    let blocked = app
        .post_json("/admin/block", json!({ "_id": id }), Some(&cookie))
        .await;
    assert_eq!(blocked.status, StatusCode::OK);
    assert_eq!(blocked.json()["message"], "a@x.com has been blocked");
    assert_eq!(app.store.messages_for("a@x.com")[0].status, MessageStatus::Blocked);

    let rejected = app.submit("a@x.com", "A", "again", "10.1.3.2").await;
    assert_eq!(rejected.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_removes_once() {
    let app = TestApp::new();
    app.submit("a@x.com", "A", "hi", "10.1.4.1").await;
    let id = app.store.messages_for("a@x.com")[0].id.to_string();
    let cookie = app.login().await;

    let deleted = app
        .post_json("/admin/delete_message", json!({ "_id": id }), Some(&cookie))
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(app.store.message_count(), 0);

    let again = app
        .post_json("/admin/delete_message", json!({ "_id": id }), Some(&cookie))
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);

    // The sender may start a fresh conversation afterwards.
    assert_eq!(
        app.submit("a@x.com", "A", "hello again", "10.1.4.2").await.status,
        StatusCode::OK
    );
}

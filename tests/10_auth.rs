mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{TestServer, PASSWORD};

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = TestServer::memory().await?;

    let res = server.client.get(server.url("/api/health")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["backend"], "memory");
    Ok(())
}

#[tokio::test]
async fn signup_then_duplicate_conflicts() -> Result<()> {
    let server = TestServer::memory().await?;
    let payload = json!({
        "email": "ada@example.com",
        "password": PASSWORD,
        "confirmPassword": PASSWORD,
        "name": "Ada",
    });

    let res = server.client.post(server.url("/api/auth/signup")).json(&payload).send().await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert_eq!(body["data"]["name"], "Ada");
    assert!(body["data"].get("password").is_none());

    let res = server.client.post(server.url("/api/auth/signup")).json(&payload).send().await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn signup_rejects_mismatched_confirmation() -> Result<()> {
    let server = TestServer::memory().await?;

    let res = server
        .client
        .post(server.url("/api/auth/signup"))
        .json(&json!({
            "email": "ada@example.com",
            "password": PASSWORD,
            "confirmPassword": "something-else",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(
        body["details"],
        json!([{ "field": "confirmPassword", "message": "Passwords don't match" }])
    );
    Ok(())
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() -> Result<()> {
    let server = TestServer::memory().await?;
    server.register_and_login("ada@example.com").await?;

    let res = server
        .client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "email": "ada@example.com", "password": "not-the-password" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Invalid login credentials");
    Ok(())
}

#[tokio::test]
async fn whoami_requires_a_session() -> Result<()> {
    let server = TestServer::memory().await?;

    let res = server.client.get(server.url("/api/auth/whoami")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let token = server.token_for("ada@example.com").await?;
    let res = server
        .client
        .get(server.url("/api/auth/whoami"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["email"], "ada@example.com");
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_session() -> Result<()> {
    let server = TestServer::memory().await?;
    let token = server.token_for("ada@example.com").await?;

    let res = server
        .client
        .post(server.url("/api/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .client
        .get(server.url("/api/auth/whoami"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn unknown_routes_are_json_404() -> Result<()> {
    let server = TestServer::memory().await?;

    let res = server.client.get(server.url("/api/nope")).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Not found");
    Ok(())
}

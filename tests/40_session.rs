mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;

use common::{cookie_value, memory_state, set_cookies, TestServer};
use items_api::config::AppConfig;

/// Access tokens that are already past the verifier's leeway when issued
async fn expiring_server() -> Result<TestServer> {
    let mut config = AppConfig::testing();
    config.security.access_token_ttl_secs = -120;
    TestServer::spawn(memory_state(config)?).await
}

fn session_cookie(session: &Value) -> String {
    format!(
        "access-token={}; refresh-token={}",
        session["access_token"].as_str().unwrap_or_default(),
        session["refresh_token"].as_str().unwrap_or_default()
    )
}

#[tokio::test]
async fn expired_access_token_is_refreshed() -> Result<()> {
    let server = expiring_server().await?;
    let session = server.register_and_login("ada@example.com").await?;
    let cookies = session_cookie(&session);

    let res = server
        .client
        .get(server.url("/api/auth/whoami"))
        .header("cookie", &cookies)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let renewed = set_cookies(&res);
    let access = cookie_value(&renewed, "access-token").expect("new access cookie");
    let refresh = cookie_value(&renewed, "refresh-token").expect("new refresh cookie");
    assert!(!access.is_empty());
    assert_ne!(Some(refresh.as_str()), session["refresh_token"].as_str());

    let body: Value = res.json().await?;
    assert_eq!(body["data"]["email"], "ada@example.com");

    // The rotated-out refresh token is spent
    let res = server
        .client
        .get(server.url("/api/auth/whoami"))
        .header("cookie", &cookies)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn parallel_refresh_does_not_clear_the_winners_cookies() -> Result<()> {
    let server = expiring_server().await?;
    let session = server.register_and_login("ada@example.com").await?;
    let cookies = session_cookie(&session);

    let winner = server
        .client
        .get(server.url("/api/auth/whoami"))
        .header("cookie", &cookies)
        .send()
        .await?;
    assert_eq!(winner.status(), StatusCode::OK);
    assert_eq!(set_cookies(&winner).len(), 2);

    // Same spent pair, moments later
    let loser = server
        .client
        .get(server.url("/api/auth/whoami"))
        .header("cookie", &cookies)
        .send()
        .await?;
    assert_eq!(loser.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&loser).is_empty());
    Ok(())
}

#[tokio::test]
async fn signed_out_cookies_are_cleared() -> Result<()> {
    let server = TestServer::memory().await?;
    let session = server.register_and_login("ada@example.com").await?;
    let cookies = session_cookie(&session);

    let res = server
        .client
        .post(server.url("/api/auth/logout"))
        .bearer_auth(session["access_token"].as_str().unwrap_or_default())
        .send()
        .await?;
    assert!(res.status().is_success());

    let res = server
        .client
        .get(server.url("/api/auth/whoami"))
        .header("cookie", &cookies)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let cleared = set_cookies(&res);
    assert_eq!(cookie_value(&cleared, "refresh-token").as_deref(), Some(""));
    Ok(())
}

#[tokio::test]
async fn health_is_never_session_checked() -> Result<()> {
    let server = TestServer::memory().await?;

    let res = server
        .client
        .get(server.url("/api/health"))
        .header("cookie", "access-token=garbage; refresh-token=garbage")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(set_cookies(&res).is_empty());
    Ok(())
}

#[tokio::test]
async fn dead_cookies_are_cleared() -> Result<()> {
    let server = TestServer::memory().await?;

    let res = server
        .client
        .get(server.url("/dashboard"))
        .header("cookie", "access-token=garbage; refresh-token=garbage")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let cleared = set_cookies(&res);
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
    Ok(())
}

#[tokio::test]
async fn bearer_header_wins_over_cookie() -> Result<()> {
    let server = TestServer::memory().await?;
    let token = server.token_for("ada@example.com").await?;

    let res = server
        .client
        .get(server.url("/api/auth/whoami"))
        .bearer_auth(&token)
        .header("cookie", "access-token=garbage")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(set_cookies(&res).is_empty());
    Ok(())
}

#[tokio::test]
async fn anonymous_requests_get_no_cookies() -> Result<()> {
    let server = TestServer::memory().await?;

    let res = server.client.get(server.url("/")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(set_cookies(&res).is_empty());
    Ok(())
}

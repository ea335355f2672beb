use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use items_api::backend::{AuthProvider, BackendError, Caller, DataStore, HostedBackend};
use items_api::models::{NewItem, Priority, RowRange, SessionUser};

const ANON_KEY: &str = "anon-key";

fn hosted(server: &MockServer) -> Result<HostedBackend> {
    Ok(HostedBackend::new(
        Url::parse(&server.uri())?,
        ANON_KEY,
        Duration::from_secs(5),
    )?)
}

fn caller() -> Caller {
    Caller::new(
        SessionUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            name: None,
        },
        "user-jwt",
    )
}

#[tokio::test]
async fn select_items_sends_inclusive_range() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/items"))
        .and(query_param("order", "created_at.asc"))
        .and(header("range", "0-9"))
        .and(header("range-unit", "items"))
        .and(header("apikey", ANON_KEY))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let items = hosted(&server)?
        .select_items(&caller(), RowRange::page(10, 0).expect("window"))
        .await?;
    assert!(items.is_empty());
    Ok(())
}

#[tokio::test]
async fn range_past_the_end_is_empty() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/items"))
        .respond_with(ResponseTemplate::new(416).set_body_json(json!({ "message": "Requested range not satisfiable" })))
        .mount(&server)
        .await;

    let items = hosted(&server)?
        .select_items(&caller(), RowRange::page(10, 500).expect("window"))
        .await?;
    assert!(items.is_empty());
    Ok(())
}

#[tokio::test]
async fn insert_passes_store_message_through() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/items"))
        .and(header("prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "new row violates row-level security policy for table \"items\"",
        })))
        .mount(&server)
        .await;

    let item = NewItem {
        title: "Buy milk".to_string(),
        description: None,
        priority: Priority::Medium,
    };
    match hosted(&server)?.insert_item(&caller(), item).await {
        Err(BackendError::Rejected(message)) => assert!(message.starts_with("new row violates")),
        other => panic!("expected rejection, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn password_grant_maps_bad_credentials() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_json(json!({ "email": "ada@example.com", "password": "wrong" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials",
        })))
        .mount(&server)
        .await;

    let result = hosted(&server)?.sign_in_with_password("ada@example.com", "wrong").await;
    assert!(matches!(result, Err(BackendError::InvalidCredentials)));
    Ok(())
}

#[tokio::test]
async fn password_grant_builds_a_session() -> Result<()> {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jwt",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "user": { "id": user_id, "email": "ada@example.com", "user_metadata": { "name": "Ada" } },
        })))
        .mount(&server)
        .await;

    let session = hosted(&server)?
        .sign_in_with_password("ada@example.com", "password123")
        .await?;
    assert_eq!(session.access_token, "jwt");
    assert_eq!(session.user.id, user_id);
    assert_eq!(session.user.name.as_deref(), Some("Ada"));
    Ok(())
}

#[tokio::test]
async fn unknown_token_is_no_user() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "invalid JWT" })))
        .mount(&server)
        .await;

    assert_eq!(hosted(&server)?.get_user("expired").await?, None);
    Ok(())
}

#[tokio::test]
async fn missing_profile_row_is_none() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(header("accept", "application/vnd.pgrst.object+json"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "code": "PGRST116",
            "message": "JSON object requested, multiple (or no) rows returned",
        })))
        .mount(&server)
        .await;

    assert!(hosted(&server)?.select_profile(&caller()).await?.is_none());
    Ok(())
}

// Integration tests for the Jexia SDK
//
// These tests run the token manager, the data operations and the reqwest
// transport together against a mock project API.

use mockito::{Matcher, Server};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use jexia_sdk::{
    AuthOptions, Client, HttpRequestAdapter, MemoryTokenStorage, RequestAdapter, RequestOptions,
    SdkError, TokenManager, Tokens,
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Post {
    title: String,
}

fn transport() -> Arc<HttpRequestAdapter> {
    Arc::new(
        HttpRequestAdapter::new(5, 5, 5, 0)
            .expect("Failed to create HTTP client")
            .with_base_delay(1),
    )
}

fn options(server: &Server) -> AuthOptions {
    AuthOptions::new("p1")
        .with_credentials("k", "s")
        .with_api_url(server.url())
}

async fn mock_login(server: &mut Server, body: serde_json::Value) -> mockito::Mock {
    server
        .mock("POST", "/auth")
        .match_body(Matcher::Json(json!({"method": "apk", "key": "k", "secret": "s"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

/// Transport that must never be reached
struct OfflineAdapter;

#[async_trait::async_trait]
impl RequestAdapter for OfflineAdapter {
    async fn execute(&self, url: &str, _options: RequestOptions) -> jexia_sdk::Result<serde_json::Value> {
        Err(SdkError::Network(format!("offline: {}", url)))
    }
}

// ==================================================================================================
// Scenarios
// ==================================================================================================

#[tokio::test]
async fn test_init_without_credentials_makes_no_request() {
    let mut server = Server::new_async().await;
    let mock = server.mock("POST", Matcher::Any).expect(0).create_async().await;

    let manager = TokenManager::new(transport(), Arc::new(MemoryTokenStorage::new()));
    manager
        .init(AuthOptions::new("p1").with_api_url(server.url()))
        .await
        .unwrap();

    let err = manager.token(None).await.unwrap_err();
    assert_eq!(err, SdkError::TokenNotAvailable);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_login_data_request_and_refresh() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, json!({"access_token": "A1", "refresh_token": "R1"})).await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .match_body(Matcher::Json(json!({"refresh_token": "R1"})))
        .with_status(200)
        .with_body(r#"{"access_token": "A2", "refresh_token": "R2"}"#)
        .expect(1)
        .create_async()
        .await;
    let select_a1 = server
        .mock("GET", "/ds/posts")
        .match_header("authorization", "Bearer A1")
        .with_status(200)
        .with_body(r#"[{"title": "first"}]"#)
        .create_async()
        .await;
    let select_a2 = server
        .mock("GET", "/ds/posts")
        .match_header("authorization", "Bearer A2")
        .match_query(Matcher::UrlEncoded("outputs".into(), r#"["title"]"#.into()))
        .with_status(200)
        .with_body(r#"[{"title": "second"}]"#)
        .create_async()
        .await;

    let client = Client::new(transport()).init(options(&server)).await.unwrap();
    let manager = client.token_manager();
    assert_eq!(manager.token(Some("apikey")).await.unwrap(), "A1");

    let posts = client.dataset::<Post>("posts").unwrap().select().execute().await.unwrap();
    assert_eq!(posts, vec![Post { title: "first".to_string() }]);

    let tokens = manager.refresh(&["apikey"]).await.unwrap();
    assert_eq!(tokens, Tokens::new("A2", "R2"));
    assert_eq!(manager.token(Some("apikey")).await.unwrap(), "A2");

    let posts = client
        .dataset::<Post>("posts")
        .unwrap()
        .select()
        .fields(["title"])
        .execute()
        .await
        .unwrap();
    assert_eq!(posts, vec![Post { title: "second".to_string() }]);

    login.assert_async().await;
    refresh.assert_async().await;
    select_a1.assert_async().await;
    select_a2.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_refresh_sends_one_request() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, json!({"access_token": "A1", "refresh_token": "R1"})).await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"access_token": "A2", "refresh_token": "R2"}"#)
        .expect(1)
        .create_async()
        .await;

    let manager = TokenManager::new(transport(), Arc::new(MemoryTokenStorage::new()));
    manager.init(options(&server)).await.unwrap();

    let (first, second) = tokio::join!(manager.refresh(&["apikey"]), manager.refresh(&["apikey"]));
    assert_eq!(first.unwrap(), second.unwrap());
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_failed_login_rejects_init() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth")
        .with_status(401)
        .with_body("invalid key")
        .create_async()
        .await;

    let manager = TokenManager::new(transport(), Arc::new(MemoryTokenStorage::new()));
    let result = manager.init(options(&server)).await;

    assert!(matches!(result, Err(SdkError::Auth(ref message)) if message.contains("invalid key")));
}

#[tokio::test]
async fn test_terminate_makes_every_token_unavailable() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, json!({"access_token": "A1", "refresh_token": "R1"})).await;

    let mut client = Client::new(transport()).init(options(&server)).await.unwrap();
    let manager = client.token_manager().clone();
    manager
        .add_tokens(["user"], Tokens::new("U1", "R1"), false)
        .unwrap();

    client.terminate();

    assert_eq!(manager.token(None).await.unwrap_err(), SdkError::TokenNotAvailable);
    assert_eq!(manager.token(Some("user")).await.unwrap_err(), SdkError::TokenNotAvailable);
    assert!(manager.refresh_groups().is_empty());
}

#[tokio::test]
async fn test_missing_refresh_token_terminates_unrelated_aliases() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, json!({"access_token": "A1"})).await;

    let manager = TokenManager::new(transport(), Arc::new(MemoryTokenStorage::new()));
    manager
        .init(options(&server).with_refresh_interval(Duration::from_millis(50)))
        .await
        .unwrap();
    manager
        .add_tokens(["userA"], Tokens::new("X", "Y"), false)
        .unwrap();
    assert_eq!(manager.token(Some("userA")).await.unwrap(), "X");

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(manager.token(Some("userA")).await.unwrap_err(), SdkError::TokenNotAvailable);
    assert_eq!(manager.token(None).await.unwrap_err(), SdkError::TokenNotAvailable);
    assert!(manager.refresh_groups().is_empty());
}

#[tokio::test]
async fn test_added_group_resolves_for_every_alias() {
    let manager = TokenManager::new(Arc::new(OfflineAdapter), Arc::new(MemoryTokenStorage::new()));
    manager
        .add_tokens(["userA", "userB"], Tokens::new("X", "Y"), true)
        .unwrap();

    assert_eq!(manager.token(Some("userB")).await.unwrap(), "X");
    assert_eq!(manager.token(Some("userA")).await.unwrap(), "X");
    assert_eq!(manager.token(None).await.unwrap(), "X");
    assert_eq!(manager.refresh_groups(), vec![vec!["userA".to_string(), "userB".to_string()]]);
}

// ==================================================================================================
// Properties
// ==================================================================================================

proptest! {
    #[test]
    fn prop_first_alias_of_last_default_group_is_default(
        groups in prop::collection::vec(
            (prop::collection::btree_set("[a-z]{1,6}", 1..4), any::<bool>()),
            1..5,
        )
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let manager = TokenManager::new(Arc::new(OfflineAdapter), Arc::new(MemoryTokenStorage::new()));
            let mut expected_default = None;

            // Groups get distinct prefixes so later calls never overwrite earlier pairs
            let groups: Vec<(Vec<String>, bool)> = groups
                .into_iter()
                .enumerate()
                .map(|(i, (names, make_default))| {
                    (names.into_iter().map(|name| format!("g{}-{}", i, name)).collect(), make_default)
                })
                .collect();

            for (i, (aliases, make_default)) in groups.iter().enumerate() {
                let access = format!("T{}", i);
                manager
                    .add_tokens(aliases, Tokens::new(access.clone(), "R"), *make_default)
                    .unwrap();

                prop_assert_eq!(manager.token(Some(aliases[0].as_str())).await.unwrap(), access.clone());
                if *make_default {
                    expected_default = Some(access);
                }
            }

            for (i, (aliases, _)) in groups.iter().enumerate() {
                for alias in aliases {
                    prop_assert_eq!(manager.token(Some(alias.as_str())).await.unwrap(), format!("T{}", i));
                }
            }

            match expected_default {
                Some(access) => {
                    prop_assert_eq!(manager.token(None).await.unwrap(), access);
                }
                None => {
                    prop_assert_eq!(manager.token(None).await.unwrap_err(), SdkError::TokenNotAvailable);
                }
            }

            manager.terminate();
            Ok::<(), TestCaseError>(())
        })?;
    }
}

use std::sync::Arc;

use reqwest::Client;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use favsync_core::{
    FavoritesApi, FavoritesError, FavoritesManager, HttpFavoritesApi, MemorySnapshotStore,
};

fn api(server: &MockServer, token: Option<&str>) -> HttpFavoritesApi {
    HttpFavoritesApi::new(
        Client::new(),
        &format!("{}/api", server.uri()),
        token.map(str::to_string),
    )
    .unwrap()
}

#[tokio::test]
async fn list_accepts_bare_id_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/favorites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["p1", "p2"])))
        .mount(&server)
        .await;

    let ids = api(&server, None).list().await.unwrap();
    assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
}

#[tokio::test]
async fn list_accepts_wrapped_records_and_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/favorites"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "favorites": [{ "productId": "p7", "createdAt": "2024-10-21T07:28:00Z" }, "p8"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids = api(&server, Some("secret")).list().await.unwrap();
    assert_eq!(ids, vec!["p7".to_string(), "p8".to_string()]);
}

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/favorites"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = api(&server, None).list().await.unwrap_err();
    assert!(err.is_auth(), "unexpected error: {err}");
}

#[tokio::test]
async fn add_posts_product_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/favorites"))
        .and(body_json(serde_json::json!({ "productId": "p9" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    api(&server, Some("t")).add("p9").await.unwrap();
}

#[tokio::test]
async fn remove_deletes_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/favorites/p9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    api(&server, Some("t")).remove("p9").await.unwrap();
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/favorites/p9"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
        .mount(&server)
        .await;

    match api(&server, None).remove("p9").await.unwrap_err() {
        FavoritesError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "database down");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn token_can_be_swapped_after_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/favorites"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = api(&server, None);
    client.set_token(Some("fresh".into()));
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn manager_switches_identity_and_reloads_that_users_favorites() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/favorites"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["p1"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/favorites"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["p2"])))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySnapshotStore::in_memory();
    let m = FavoritesManager::new(Arc::new(api(&server, Some("old"))), Arc::new(store.clone()));
    m.initialize().await;
    assert_eq!(m.favorites(), vec!["p1".to_string()]);

    m.switch_identity(Some("fresh".into())).await;

    assert_eq!(m.favorites(), vec!["p2".to_string()]);
    assert!(!m.is_favorite("p1"));
    assert_eq!(store.ids(), Some(vec!["p2".to_string()]));
    assert_eq!(m.debug_snapshot().generation, 1);
}

#[test]
fn rejects_non_base_urls() {
    let err = HttpFavoritesApi::new(Client::new(), "mailto:shop@example.com", None).unwrap_err();
    assert!(matches!(err, FavoritesError::Config(_)));
    let err = HttpFavoritesApi::new(Client::new(), "not a url", None).unwrap_err();
    assert!(matches!(err, FavoritesError::InvalidUrl(_)));
}

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use common::{imdb, test_router, FAILING_EXTERNAL_ID, FAILING_ID, UNKNOWN_ID};

fn create_test_server() -> TestServer {
    TestServer::new(test_router()).unwrap()
}

fn user(id: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_static(id),
    )
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server();
    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_header_is_set() {
    let server = create_test_server();
    let response = server.get("/health").await;

    let request_id = response.header("x-request-id");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_trending_page() {
    let server = create_test_server();
    let response = server.get("/api/v1/trending/tv?page=2").await;

    response.assert_status_ok();
    let page: Value = response.json();
    assert_eq!(page["page"], 2);
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["results"].as_array().unwrap().len(), 20);
    assert_eq!(page["results"][0]["id"], 21);
    assert_eq!(page["results"][0]["kind"], "tv");
    assert_eq!(page["results"][0]["posterPath"], "/poster-21.jpg");
}

#[tokio::test]
async fn test_unknown_media_kind_rejected() {
    let server = create_test_server();
    let response = server.get("/api/v1/trending/person").await;
    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_search_requires_query() {
    let server = create_test_server();

    let response = server.get("/api/v1/search/movie?q=heat").await;
    response.assert_status_ok();
    let page: Value = response.json();
    assert_eq!(page["results"][0]["title"], "heat");

    let response = server.get("/api/v1/search/movie?q=%20").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Search query cannot be empty");
}

#[tokio::test]
async fn test_genres() {
    let server = create_test_server();
    let response = server.get("/api/v1/genres/movie").await;

    response.assert_status_ok();
    let genres: Vec<Value> = response.json();
    assert_eq!(genres.len(), 2);
    assert_eq!(genres[0]["name"], "Drama");
}

#[tokio::test]
async fn test_external_ids_batch_keeps_order_and_cardinality() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/batch/external-ids")
        .json(&json!({ "ids": [3, UNKNOWN_ID, 10, FAILING_ID, 1], "kind": "movie" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let data = body["data"].as_array().unwrap();
    assert!(body["timestamp"].is_string());

    assert_eq!(data.len(), 5);
    let ids: Vec<u64> = data.iter().map(|r| r["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![3, UNKNOWN_ID, 10, FAILING_ID, 1]);

    assert_eq!(data[0]["externalId"], imdb(3));
    assert!(data[1]["externalId"].is_null());
    assert!(data[2]["externalId"].is_null());
    assert!(data[3]["externalId"].is_null());
    assert_eq!(data[4]["externalId"], imdb(1));
}

#[tokio::test]
async fn test_external_ids_kind_defaults_to_movie() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/batch/external-ids")
        .json(&json!({ "ids": [7] }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"][0]["kind"], "movie");
}

#[tokio::test]
async fn test_empty_batch_returns_empty_data() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/batch/runtime")
        .json(&json!({ "ids": [] }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_oversized_batch_rejected() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/batch/external-ids")
        .json(&json!({ "ids": [1, 2, 3, 4, 5, 6] }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("exceeds the limit"));
}

#[tokio::test]
async fn test_runtime_batch_rejects_malformed_id() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/batch/runtime")
        .json(&json!({ "ids": [imdb(1), "550"] }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("'550'"));
}

#[tokio::test]
async fn test_runtime_batch_placeholders() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/batch/runtime")
        .json(&json!({ "ids": [imdb(3), imdb(1)] }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let data = body["data"].as_array().unwrap();

    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["externalId"], imdb(3));
    assert!(data[0]["runtimeMinutes"].is_null());
    assert!(data[0]["primaryTitle"].is_null());
    assert_eq!(data[1]["runtimeMinutes"], 61);
}

#[tokio::test]
async fn test_rating_lookup_error_becomes_placeholder() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/batch/rating")
        .json(&json!({ "ids": [FAILING_EXTERNAL_ID, imdb(42)] }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let data = body["data"].as_array().unwrap();

    assert_eq!(data[0]["externalId"], FAILING_EXTERNAL_ID);
    assert!(data[0]["averageRating"].is_null());
    assert!(data[0]["numVotes"].is_null());
    assert_eq!(data[1]["numVotes"], 1000);
}

#[tokio::test]
async fn test_watch_later_requires_user() {
    let server = create_test_server();
    let response = server.get("/api/v1/watch-later").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "Sign in required");
}

#[tokio::test]
async fn test_watch_later_add_is_idempotent() {
    let server = create_test_server();
    let (name, value) = user("user-1");
    let body = json!({ "mediaId": 42, "mediaType": "movie" });

    for _ in 0..2 {
        let response = server
            .post("/api/v1/watch-later")
            .add_header(name.clone(), value.clone())
            .json(&body)
            .await;
        response.assert_status(StatusCode::CREATED);
        let entry: Value = response.json();
        assert_eq!(entry["mediaId"], 42);
        assert!(entry["addedAt"].is_string());
    }

    let response = server
        .get("/api/v1/watch-later")
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    let list: Vec<Value> = response.json();
    assert_eq!(list.len(), 1);
}

#[tokio::test]
async fn test_watch_later_remove_and_isolation() {
    let server = create_test_server();
    let (name, value) = user("user-1");
    let (other_name, other_value) = user("user-2");

    server
        .post("/api/v1/watch-later")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "mediaId": 1399, "mediaType": "tv" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .get("/api/v1/watch-later")
        .add_header(other_name, other_value)
        .await;
    let list: Vec<Value> = response.json();
    assert!(list.is_empty());

    // the same id as a movie is a different title
    server
        .delete("/api/v1/watch-later")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "mediaId": 1399, "mediaType": "movie" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let list: Vec<Value> = server
        .get("/api/v1/watch-later")
        .add_header(name.clone(), value.clone())
        .await
        .json();
    assert_eq!(list.len(), 1);

    server
        .delete("/api/v1/watch-later")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "mediaId": 1399, "mediaType": "tv" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let list: Vec<Value> = server
        .get("/api/v1/watch-later")
        .add_header(name, value)
        .await
        .json();
    assert!(list.is_empty());
}

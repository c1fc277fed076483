use chatdesk_cli::client::StoreClient;
use chatdesk_schema::ChatMessage;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn add_message_posts_wrapped_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/add-message/abc"))
        .and(body_json(serde_json::json!({
            "message": {"role": "user", "content": "hi"}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{"role": "user", "content": "hi"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri());
    let messages = client
        .add_message("abc", ChatMessage::user("hi"))
        .await
        .unwrap();
    assert_eq!(messages, vec![ChatMessage::user("hi")]);
}

#[tokio::test]
async fn error_body_text_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/add-message/abc"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "Invalid message format"
        })))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri());
    let err = client
        .add_message("abc", ChatMessage::user("hi"))
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("400"));
    assert!(err.contains("Invalid message format"));
}

#[tokio::test]
async fn health_fails_when_server_unreachable() {
    // Port 9 (discard) on loopback is expected to refuse connections.
    let client = StoreClient::new("http://127.0.0.1:9");
    let err = client.health().await.unwrap_err();
    assert!(format!("{err:#}").contains("unreachable"));
}

#[tokio::test]
async fn new_chat_and_sessions_decode() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/new-chat"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"session_id": "s-1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get-all-sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["s-1"])))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri());
    assert_eq!(client.new_chat().await.unwrap(), "s-1");
    assert_eq!(client.sessions().await.unwrap(), vec!["s-1".to_string()]);
}

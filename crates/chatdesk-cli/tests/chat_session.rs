use std::sync::Arc;

use chatdesk_cli::chat::ChatSession;
use chatdesk_cli::client::StoreClient;
use chatdesk_cli::config::LlmConfig;
use chatdesk_provider::StubProvider;
use chatdesk_schema::{ChatMessage, FileInfo};
use chatdesk_server::state::AppState;
use chatdesk_store::ChatStore;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn spawn_store() -> (StoreClient, Arc<ChatStore>, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = Arc::new(ChatStore::new());
    let state = AppState::new(store.clone());
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        chatdesk_server::serve_listener(state, listener, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });
    (StoreClient::new(format!("http://{addr}")), store, tx)
}

fn llm_config() -> LlmConfig {
    LlmConfig {
        model: "test-model".into(),
        ..LlmConfig::default()
    }
}

#[tokio::test]
async fn chat_turn_stores_user_and_assistant_messages() {
    let (client, store, _shutdown) = spawn_store().await;
    client.health().await.unwrap();

    let session = ChatSession::start(client, Arc::new(StubProvider), llm_config(), None)
        .await
        .unwrap();

    let mut streamed = String::new();
    let reply = session
        .send("hello there", |delta| streamed.push_str(delta))
        .await
        .unwrap();

    assert_eq!(reply, "[stub:test-model] hello there");
    assert_eq!(streamed, reply);
    assert_eq!(
        store.history(session.session_id()).await,
        vec![
            ChatMessage::user("hello there"),
            ChatMessage::assistant("[stub:test-model] hello there"),
        ]
    );
}

#[tokio::test]
async fn resumed_session_keeps_prior_turns() {
    let (client, store, _shutdown) = spawn_store().await;
    store.append("existing", ChatMessage::user("earlier")).await;

    let session = ChatSession::start(
        client,
        Arc::new(StubProvider),
        llm_config(),
        Some("existing".into()),
    )
    .await
    .unwrap();
    session.send("again", |_| {}).await.unwrap();

    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0], ChatMessage::user("earlier"));
    assert_eq!(history[1], ChatMessage::user("again"));
    assert_eq!(history[2].role, "assistant");
}

#[tokio::test]
async fn new_session_switches_away_from_current() {
    let (client, _store, _shutdown) = spawn_store().await;
    let mut session = ChatSession::start(client, Arc::new(StubProvider), llm_config(), None)
        .await
        .unwrap();
    let first = session.session_id().to_string();
    let second = session.new_session().await.unwrap().to_string();

    assert_ne!(first, second);
    let sessions = session.sessions().await.unwrap();
    assert!(sessions.contains(&first));
    assert!(sessions.contains(&second));
}

#[tokio::test]
async fn registry_round_and_pending_files() {
    let (client, _store, _shutdown) = spawn_store().await;
    client
        .save_file_info(&FileInfo::new("a.pdf", "/docs/a.pdf"))
        .await
        .unwrap();

    let err = client
        .save_file_info(&FileInfo::new("a.pdf", "/docs/other.pdf"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("file name already registered"));

    let pending = client
        .pending_files(vec![
            FileInfo::new("a.pdf", "/docs/a.pdf"),
            FileInfo::new("b.pdf", "/docs/b.pdf"),
        ])
        .await
        .unwrap();
    assert_eq!(pending, vec![FileInfo::new("b.pdf", "/docs/b.pdf")]);
}

#[tokio::test]
async fn switched_id_with_reserved_characters_reaches_its_session() {
    let (client, store, _shutdown) = spawn_store().await;
    let odd_id = "team/alpha?draft#1";

    let history = client
        .add_message(odd_id, ChatMessage::user("hi"))
        .await
        .unwrap();
    assert_eq!(history, vec![ChatMessage::user("hi")]);

    assert_eq!(store.history(odd_id).await, vec![ChatMessage::user("hi")]);
    assert_eq!(
        client.history(odd_id).await.unwrap(),
        vec![ChatMessage::user("hi")]
    );
}

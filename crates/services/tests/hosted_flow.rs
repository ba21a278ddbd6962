use std::sync::Arc;

use learn_core::model::{ItemId, LearnerId, ProficiencyLevel, ProgressRecord, TopicProgress};
use learn_core::time::fixed_now;
use reqwest::StatusCode;
use services::{AuthError, AuthProvider, HostedAuth, ProgressError, ProgressService, ProgressStore};
use storage::repository::{InMemoryRepository, ProgressWriter, Storage, StorageError};
use storage::rest::RestConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Answer one connection per canned `(status line, body)` pair, in order.
/// The handle yields every raw request received.
async fn serve(
    responses: Vec<(&'static str, &'static str)>,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        requests
    });
    (base_url, handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_ascii_lowercase()
}

fn ids(raw: &[&str]) -> Vec<ItemId> {
    raw.iter().map(|id| ItemId::new(*id).unwrap()).collect()
}

fn session(base_url: String) -> RestConfig {
    RestConfig::new(base_url, "anon-key").with_access_token("session-token")
}

const ANNA: &str = r#"{"id":"anna","email":"anna@example.com","role":"authenticated"}"#;

#[tokio::test]
async fn signed_in_session_reads_progress_from_the_hosted_backend() {
    let rows = r#"[{"user_id":"anna","word_id":"haus","proficiency_level":"learned"},
        {"user_id":"anna","word_id":"hund","proficiency_level":"learning"}]"#;
    let (base_url, server) = serve(vec![("200 OK", ANNA), ("200 OK", rows)]).await;
    let config = session(base_url);
    let service = ProgressService::new(
        Arc::new(HostedAuth::new(config.clone())),
        Storage::rest(config).progress,
    );

    let topic = service.topic_progress(&ids(&["haus", "hund", "baum"])).await;
    assert_eq!(topic, TopicProgress::new(1, 3));

    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].starts_with("get /auth/v1/user"));
    assert!(requests[0].contains("apikey: anon-key"));
    assert!(requests[0].contains("authorization: bearer session-token"));
    assert!(requests[1].starts_with("get /rest/v1/word_progress?"));
    assert!(requests[1].contains("user_id=eq.anna"));
}

#[tokio::test]
async fn expired_or_forbidden_session_is_signed_out() {
    for status in ["401 Unauthorized", "403 Forbidden"] {
        let (base_url, server) = serve(vec![(status, r#"{"msg":"invalid JWT"}"#)]).await;
        let auth = HostedAuth::new(session(base_url));
        assert_eq!(auth.current_learner().await.unwrap(), None, "{status}");
        server.await.unwrap();
    }
}

#[tokio::test]
async fn auth_outage_reads_as_anonymous() {
    let (base_url, server) = serve(vec![("503 Service Unavailable", "")]).await;
    let auth = HostedAuth::new(session(base_url.clone()));
    assert!(matches!(
        auth.current_learner().await,
        Err(AuthError::HttpStatus(StatusCode::SERVICE_UNAVAILABLE))
    ));
    server.await.unwrap();

    // Progress exists for anna, but an outage must not reveal it.
    let repo = InMemoryRepository::new();
    let record = ProgressRecord::new(
        LearnerId::new("anna").unwrap(),
        ItemId::new("haus").unwrap(),
        ProficiencyLevel::Learned,
        fixed_now(),
    );
    repo.upsert_progress(&record).await.unwrap();

    let outage = ("503 Service Unavailable", "");
    let (base_url, server) = serve(vec![outage, outage]).await;
    let auth = Arc::new(HostedAuth::new(session(base_url)));
    let service = ProgressService::new(auth, Arc::new(repo));
    assert!(service.mastered_items().await.is_empty());
    assert_eq!(service.mastered_count().await, 0);
    assert_eq!(server.await.unwrap().len(), 2);
}

#[tokio::test]
async fn backend_failure_is_reported_by_try_and_empty_otherwise() {
    let body = r#"{"message":"permission denied for table word_progress","code":"42501"}"#;
    let (base_url, server) = serve(vec![
        ("500 Internal Server Error", body),
        ("500 Internal Server Error", body),
    ])
    .await;
    let store = ProgressStore::new(Storage::rest(session(base_url)).progress);
    let anna = LearnerId::new("anna").unwrap();

    let err = store.try_mastered_items(Some(&anna)).await.unwrap_err();
    assert!(matches!(
        err,
        ProgressError::Storage(StorageError::Remote(ref remote))
            if remote.status == Some(500) && remote.code.as_deref() == Some("42501")
    ));
    assert!(store.mastered_items(Some(&anna)).await.is_empty());
    assert_eq!(server.await.unwrap().len(), 2);
}

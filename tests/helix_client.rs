//! Integration tests for the Helix client against a local one-shot HTTP server

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use twitch_session::{HelixClient, IdentityApi, MemoryCell, SessionError, SessionManager};

/// Accept one connection, answer it, and hand back the raw request head
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
        String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{addr}/helix"), handle)
}

fn client(base_url: &str) -> HelixClient {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    HelixClient::with_client(base_url, http)
}

const USERS_BODY: &str = r#"{"data":[{"id":"141981764","login":"twitchdev","display_name":"TwitchDev","type":"","broadcaster_type":"partner","description":"","profile_image_url":"","offline_image_url":"","created_at":"2016-12-14T20:32:28Z"}]}"#;

#[tokio::test]
async fn test_get_users_sends_auth_headers() {
    let (base_url, server) = serve_once("200 OK", USERS_BODY).await;

    let response = client(&base_url)
        .get_users("tok123", "client-abc")
        .await
        .unwrap();
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0].display_name, "TwitchDev");

    let request = server.await.unwrap().to_ascii_lowercase();
    assert!(request.starts_with("get /helix/users http/1.1"));
    assert!(request.contains("authorization: bearer tok123"));
    assert!(request.contains("client-id: client-abc"));
}

#[tokio::test]
async fn test_get_users_maps_helix_error_body() {
    let (base_url, _server) = serve_once(
        "401 Unauthorized",
        r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#,
    )
    .await;

    let err = client(&base_url).get_users("bad", "id").await.unwrap_err();

    match err {
        SessionError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid OAuth token");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_users_falls_back_to_status_reason() {
    let (base_url, _server) = serve_once("503 Service Unavailable", "upstream down").await;

    let err = client(&base_url).get_users("tok", "id").await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Api { status: 503, ref message } if message == "Service Unavailable"
    ));
}

#[tokio::test]
async fn test_get_users_rejects_unexpected_body() {
    let (base_url, _server) = serve_once("200 OK", r#"{"users":[]}"#).await;

    let err = client(&base_url).get_users("tok", "id").await.unwrap_err();

    assert!(matches!(err, SessionError::InvalidResponse(_)));
    assert!(err.is_remote());
}

#[tokio::test]
async fn test_session_refresh_over_http() {
    let (base_url, server) = serve_once("200 OK", USERS_BODY).await;

    let session = SessionManager::builder()
        .token_cell(MemoryCell::new(Some("live-token".to_string())))
        .api(client(&base_url))
        .build()
        .unwrap();
    session.refresh_current_user().await.unwrap();

    assert_eq!(
        session.current_user().map(|u| u.login),
        Some("twitchdev".to_string())
    );
    let request = server.await.unwrap().to_ascii_lowercase();
    assert!(request.contains("authorization: bearer live-token"));
    assert!(request.contains(&format!(
        "client-id: {}",
        twitch_session::config::DEFAULT_CLIENT_ID
    )));
}

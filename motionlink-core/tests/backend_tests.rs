//! Tests for the HTTP backend client against a canned local server

use motionlink_core::{BackendApi, HttpBackend, MotionLinkError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn serve_error(status_line: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: text/html; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}", addr)
}

// ============================================================================
// ERROR RESPONSE TESTS
// ============================================================================

#[tokio::test]
async fn test_rejection_with_multibyte_body_is_truncated_cleanly() {
    let body = format!("{}é tail", "x".repeat(255));
    let base = serve_error("500 Internal Server Error", body).await;
    let backend = HttpBackend::new(&base, Duration::from_secs(5)).unwrap();

    let err = tokio_test::assert_err!(backend.set_detection_mode("gesture").await);
    match err {
        MotionLinkError::BackendRejected {
            endpoint,
            status,
            body,
        } => {
            assert_eq!(endpoint, "/api/mode");
            assert_eq!(status, 500);
            assert_eq!(body, "x".repeat(255));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_rejection_keeps_short_body() {
    let base = serve_error("404 Not Found", "no such route".to_string()).await;
    let backend = HttpBackend::new(&base, Duration::from_secs(5)).unwrap();

    let err = tokio_test::assert_err!(backend.clear_canvas().await);
    assert!(matches!(
        err,
        MotionLinkError::BackendRejected { status: 404, ref body, .. } if body == "no such route"
    ));
}

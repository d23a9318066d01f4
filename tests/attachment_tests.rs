//! Integration tests for the attachment ingestion pipeline.

use std::io::Write;
use std::time::Duration;

use guildrelay::attachments::{
    process_attachments, AttachmentDescriptor, AttachmentError, AttachmentPipeline,
    MAX_ATTACHMENT_BYTES,
};
use guildrelay::error::{ClassifiedError, ErrorKind};

fn encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

// ============================================================================
// Inline data
// ============================================================================

#[tokio::test]
async fn test_inline_hello() {
    let resolved = process_attachments(&[AttachmentDescriptor::inline("hello.txt", "aGVsbG8=")])
        .await
        .unwrap();

    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].display_name, "hello.txt");
    assert_eq!(resolved[0].bytes, b"hello");
}

#[tokio::test]
async fn test_inline_over_limit_reports_both_sizes() {
    let data = encode(&vec![0u8; 10_000_000]);
    let err = process_attachments(&[AttachmentDescriptor::inline("big.bin", data)])
        .await
        .unwrap_err();

    assert!(matches!(
        err.root(),
        AttachmentError::TooLarge {
            actual: 10_000_000,
            ..
        }
    ));
    let message = err.to_string();
    assert!(message.contains("big.bin"));
    assert!(message.contains("9.54 MB"));
    assert!(message.contains("8.00 MB"));

    let classified = ClassifiedError::from(err);
    assert_eq!(classified.kind, ErrorKind::InvalidParameters);
    assert!(!classified.is_retryable);
}

#[tokio::test]
async fn test_inline_exactly_at_limit_is_accepted() {
    let data = encode(&vec![7u8; MAX_ATTACHMENT_BYTES as usize]);
    let resolved = process_attachments(&[AttachmentDescriptor::inline("edge.bin", data)])
        .await
        .unwrap();
    assert_eq!(resolved[0].size(), MAX_ATTACHMENT_BYTES as usize);
}

// ============================================================================
// Remote URLs
// ============================================================================

#[tokio::test]
async fn test_remote_fetch() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/logo.png")
        .with_status(200)
        .with_body(vec![137u8, 80, 78, 71])
        .create_async()
        .await;

    let descriptor = AttachmentDescriptor {
        alt_text: Some("Project logo".to_string()),
        ..AttachmentDescriptor::remote("logo.png", format!("{}/logo.png", server.url()))
    };
    let resolved = process_attachments(&[descriptor]).await.unwrap();

    assert_eq!(resolved[0].bytes, vec![137u8, 80, 78, 71]);
    assert_eq!(resolved[0].alt_text.as_deref(), Some("Project logo"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_declared_too_large_with_spoiler() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/video.mp4")
        .with_status(200)
        .with_body(vec![0u8; 9_000_000])
        .create_async()
        .await;

    let descriptor = AttachmentDescriptor {
        spoiler: Some(true),
        ..AttachmentDescriptor::remote("video.mp4", format!("{}/video.mp4", server.url()))
    };
    let err = process_attachments(&[descriptor]).await.unwrap_err();

    assert!(matches!(
        err.root(),
        AttachmentError::DeclaredTooLarge {
            declared: 9_000_000,
            ..
        }
    ));
    assert!(err.to_string().contains("8.58 MB"));
}

#[tokio::test]
async fn test_remote_chunked_body_over_limit() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/stream.bin")
        .with_status(200)
        .with_chunked_body(|w| w.write_all(&vec![0u8; 9 * 1024 * 1024]))
        .create_async()
        .await;

    let err = process_attachments(&[AttachmentDescriptor::remote(
        "stream.bin",
        format!("{}/stream.bin", server.url()),
    )])
    .await
    .unwrap_err();

    match err.root() {
        AttachmentError::TooLarge { actual, max } => {
            assert!(*actual > MAX_ATTACHMENT_BYTES);
            assert_eq!(*max, MAX_ATTACHMENT_BYTES);
        }
        other => panic!("expected TooLarge, got {other:?}"),
    }
    assert!(err.to_string().contains("exceeds the maximum of 8.00 MB"));
    assert_eq!(ClassifiedError::from(err).kind, ErrorKind::InvalidParameters);
}

#[tokio::test]
async fn test_remote_server_that_never_replies_times_out() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let pipeline = AttachmentPipeline::default().with_fetch_timeout(Duration::from_millis(300));
    let err = pipeline
        .process(&[AttachmentDescriptor::remote(
            "a.bin",
            format!("http://{addr}/a.bin"),
        )])
        .await
        .unwrap_err();

    assert!(matches!(err.root(), AttachmentError::FetchTimeout { .. }));
    assert!(err.to_string().contains("timed out after 300ms"));

    let classified = ClassifiedError::from(err);
    assert_eq!(classified.kind, ErrorKind::NetworkError);
    assert!(classified.is_retryable);
}

#[tokio::test]
async fn test_remote_not_found_is_classified() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/missing.png")
        .with_status(404)
        .create_async()
        .await;

    let err = process_attachments(&[AttachmentDescriptor::remote(
        "missing.png",
        format!("{}/missing.png", server.url()),
    )])
    .await
    .unwrap_err();

    let classified = ClassifiedError::from(err);
    assert_eq!(classified.kind, ErrorKind::NotFound);
    assert_eq!(classified.status_code, Some(404));
}

#[tokio::test]
async fn test_remote_unreachable_is_network_error() {
    let pipeline = AttachmentPipeline::default().with_fetch_timeout(Duration::from_secs(5));
    let err = pipeline
        .process(&[AttachmentDescriptor::remote(
            "x.png",
            "http://127.0.0.1:1/x.png",
        )])
        .await
        .unwrap_err();

    assert_eq!(ClassifiedError::from(err).kind, ErrorKind::NetworkError);
}

// ============================================================================
// Local paths
// ============================================================================

#[tokio::test]
async fn test_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    std::fs::write(&path, "# Notes\n").unwrap();

    let resolved = process_attachments(&[AttachmentDescriptor::local(
        "notes.md",
        path.to_string_lossy(),
    )])
    .await
    .unwrap();

    assert_eq!(resolved[0].bytes, b"# Notes\n");
}

#[tokio::test]
async fn test_parent_directory_is_rejected_before_io() {
    let err = process_attachments(&[AttachmentDescriptor::local(
        "passwd",
        "uploads/../../etc/passwd",
    )])
    .await
    .unwrap_err();

    assert!(matches!(err.root(), AttachmentError::PathTraversal(_)));
    assert_eq!(err.index(), Some(0));
}

#[tokio::test]
async fn test_missing_local_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.txt");

    let err = process_attachments(&[AttachmentDescriptor::local(
        "absent.txt",
        path.to_string_lossy(),
    )])
    .await
    .unwrap_err();

    assert_eq!(ClassifiedError::from(err).kind, ErrorKind::NotFound);
}

// ============================================================================
// Batches
// ============================================================================

#[tokio::test]
async fn test_batch_preserves_order() {
    let descriptors: Vec<_> = (0..10)
        .map(|i| AttachmentDescriptor::inline(format!("file{i}.txt"), encode(format!("{i}").as_bytes())))
        .collect();

    let resolved = process_attachments(&descriptors).await.unwrap();

    let names: Vec<_> = resolved.iter().map(|a| a.display_name.as_str()).collect();
    assert_eq!(names[0], "file0.txt");
    assert_eq!(names[9], "file9.txt");
    assert_eq!(resolved[9].bytes, b"9");
}

#[tokio::test]
async fn test_eleven_attachments_rejected() {
    let descriptors: Vec<_> = (0..11)
        .map(|i| AttachmentDescriptor::inline(format!("file{i}.txt"), "aGVsbG8="))
        .collect();

    let err = process_attachments(&descriptors).await.unwrap_err();
    assert!(matches!(err, AttachmentError::TooMany { count: 11 }));
}

#[tokio::test]
async fn test_first_failure_by_position_wins() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.txt");

    let err = process_attachments(&[
        AttachmentDescriptor::inline("ok.txt", "aGVsbG8="),
        AttachmentDescriptor::local("gone.txt", missing.to_string_lossy()),
        AttachmentDescriptor::inline("bad.txt", "!!!not base64!!!"),
    ])
    .await
    .unwrap_err();

    assert_eq!(err.index(), Some(1));
    assert!(err.to_string().starts_with("attachment 2 (gone.txt)"));
}

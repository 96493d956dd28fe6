use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use upload_sentry::{
    KeywordScanner, NoOpScanner, ReputationClient, ReputationStatus, SecurityConfig,
    SecurityManager, ThreatScanner,
};

fn test_config(root: &std::path::Path) -> SecurityConfig {
    SecurityConfig {
        upload_root: root.to_path_buf(),
        ..SecurityConfig::development()
    }
}

fn manager_with(config: SecurityConfig, scanner: Arc<dyn ThreatScanner>) -> SecurityManager {
    let reputation = ReputationClient::new(&config);
    SecurityManager::new(config, scanner, reputation).unwrap()
}

fn dir_count(path: &std::path::Path) -> usize {
    std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
}

fn png_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(8, 8));
    let mut buf = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut buf),
        image::ImageOutputFormat::Png,
    )
    .unwrap();
    buf
}

fn pdf_with_text(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

#[tokio::test]
async fn oversize_upload_rejected_without_staging() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.max_file_size = 1024;
    let manager = manager_with(config, Arc::new(NoOpScanner));

    // Declared size over the limit: rejected before reading the stream
    let verdict = manager
        .validate_upload(&b"tiny"[..], "big.png", 2048)
        .await;
    assert!(!verdict.accepted);
    assert_eq!(verdict.reason.unwrap().code(), "file_too_large");

    // Undeclared oversize stream: rejected after the bounded read
    let big = vec![b'a'; 2048];
    let verdict = manager.validate_upload(&big[..], "big.txt", 100).await;
    assert!(!verdict.accepted);
    assert_eq!(verdict.reason.unwrap().code(), "file_too_large");

    assert_eq!(dir_count(&root.path().join("staging")), 0);
    assert_eq!(dir_count(&root.path().join("files")), 0);
}

#[tokio::test]
async fn dangerous_signatures_rejected_regardless_of_extension() {
    let root = tempfile::tempdir().unwrap();
    let manager = manager_with(test_config(root.path()), Arc::new(NoOpScanner));

    for (name, content) in [
        ("photo.png", &b"MZ\x90\x00rest of a PE file"[..]),
        ("notes.pdf", &b"\x7fELF\x02\x01\x01rest"[..]),
    ] {
        let verdict = manager
            .validate_upload(content, name, content.len() as u64)
            .await;
        assert!(!verdict.accepted, "{name} should be rejected");
        assert_eq!(verdict.reason.unwrap().code(), "dangerous_signature");
    }
    assert_eq!(dir_count(&root.path().join("staging")), 0);
}

#[tokio::test]
async fn zip_disguised_as_text_rejected_before_staging() {
    let root = tempfile::tempdir().unwrap();
    let manager = manager_with(test_config(root.path()), Arc::new(NoOpScanner));

    let content = b"PK\x03\x04zipped payload";
    let verdict = manager
        .validate_upload(&content[..], "report.txt", content.len() as u64)
        .await;
    assert!(!verdict.accepted);
    assert_eq!(verdict.reason.unwrap().code(), "type_mismatch");
    assert_eq!(dir_count(&root.path().join("staging")), 0);
    assert_eq!(dir_count(&root.path().join("files")), 0);
}

#[tokio::test]
async fn valid_png_accepted_in_local_only_mode() {
    let root = tempfile::tempdir().unwrap();
    let manager = manager_with(test_config(root.path()), Arc::new(KeywordScanner));

    let content = png_bytes();
    let verdict = manager
        .validate_upload(&content[..], "photo.png", content.len() as u64)
        .await;
    assert!(verdict.accepted, "{:?}", verdict.reason);

    let identity = verdict.identity.unwrap();
    assert_eq!(identity.detected_type.as_str(), "png");
    assert_eq!(identity.size_bytes, content.len() as u64);
    assert_eq!(identity.content_hash.len(), 64);

    let scan = verdict.scan.unwrap();
    assert_eq!(scan.reputation.status, ReputationStatus::Unknown);

    let stored = verdict.stored_name.unwrap();
    assert!(stored.ends_with(".png"));
    assert!(root.path().join("files").join(&stored).exists());
    assert_eq!(dir_count(&root.path().join("staging")), 0);
}

#[tokio::test]
async fn validation_is_idempotent_for_identical_content() {
    let root = tempfile::tempdir().unwrap();
    let manager = manager_with(test_config(root.path()), Arc::new(KeywordScanner));

    let content = png_bytes();
    let first = manager
        .validate_upload(&content[..], "a.png", content.len() as u64)
        .await;
    let second = manager
        .validate_upload(&content[..], "b.png", content.len() as u64)
        .await;

    assert!(first.accepted && second.accepted);
    let (a, b) = (first.identity.unwrap(), second.identity.unwrap());
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(a.detected_type, b.detected_type);
    // Distinct stored names for identical content
    assert_ne!(first.stored_name, second.stored_name);
    assert_eq!(dir_count(&root.path().join("files")), 2);
    assert_eq!(dir_count(&root.path().join("staging")), 0);
}

#[tokio::test]
async fn infected_file_rejected_and_staged_copy_discarded() {
    let root = tempfile::tempdir().unwrap();
    let manager = manager_with(test_config(root.path()), Arc::new(KeywordScanner));

    let content = b"attached you will find the virus sample we discussed";
    let verdict = manager
        .validate_upload(&content[..], "sample.txt", content.len() as u64)
        .await;
    assert!(!verdict.accepted);
    assert_eq!(verdict.reason.unwrap().code(), "infected");
    assert!(verdict.message.contains("virus"));
    assert_eq!(dir_count(&root.path().join("staging")), 0);
    assert_eq!(dir_count(&root.path().join("files")), 0);
}

#[tokio::test]
async fn pdf_text_thresholds_enforced() {
    let root = tempfile::tempdir().unwrap();
    let manager = manager_with(test_config(root.path()), Arc::new(NoOpScanner));

    let readable = pdf_with_text("Damaged pavement at the corner of Main and Second");
    let verdict = manager
        .validate_upload(&readable[..], "report.pdf", readable.len() as u64)
        .await;
    assert!(verdict.accepted, "{:?}", verdict.reason);

    let textless = pdf_with_text("x");
    let verdict = manager
        .validate_upload(&textless[..], "scan.pdf", textless.len() as u64)
        .await;
    assert!(!verdict.accepted);
    assert_eq!(verdict.reason.unwrap().code(), "no_extractable_text");
    assert_eq!(dir_count(&root.path().join("staging")), 0);
}

/// Behavior of the stub reputation service
#[derive(Clone, Copy)]
enum StubBehavior {
    /// Every hash is unseen, uploads are accepted, the analysis never completes
    StalledAnalysis,
    /// The corpus already knows the hash and flags it malicious
    KnownMalicious,
    /// Every hash is unseen; the submitted analysis completes with clean stats
    CompletesClean,
}

/// Minimal reputation service stub speaking just enough HTTP for one client
async fn spawn_stub_reputation_server(behavior: StubBehavior) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut tmp = [0u8; 4096];
                let header_end = loop {
                    let n = match socket.read(&mut tmp).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&tmp[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };
                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    })
                    .unwrap_or(0);
                let mut body_read = buf.len() - header_end;
                while body_read < content_length {
                    match socket.read(&mut tmp).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => body_read += n,
                    }
                }

                let request_line = head.lines().next().unwrap_or("").to_string();
                let ok = |body: &str| {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    )
                };
                let not_found =
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string();
                let response = if request_line.starts_with("GET /files/") {
                    match behavior {
                        StubBehavior::KnownMalicious => ok(
                            r#"{"data":{"attributes":{"last_analysis_stats":{"malicious":5,"suspicious":1,"harmless":60,"undetected":4}}}}"#,
                        ),
                        _ => not_found,
                    }
                } else if request_line.starts_with("POST /files") {
                    ok(r#"{"data":{"id":"analysis-1"}}"#)
                } else if request_line.starts_with("GET /analyses/") {
                    match behavior {
                        StubBehavior::CompletesClean => ok(
                            r#"{"data":{"attributes":{"status":"completed","stats":{"malicious":0,"suspicious":0,"harmless":68,"undetected":2}}}}"#,
                        ),
                        _ => ok(r#"{"data":{"attributes":{"status":"queued","stats":{}}}}"#),
                    }
                } else {
                    not_found
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn stalled_analysis_times_out_and_follows_policy() {
    let addr = spawn_stub_reputation_server(StubBehavior::StalledAnalysis).await;
    let content = b"street light out on the north avenue since last week";

    for (fail_closed, expect_accepted) in [(false, true), (true, false)] {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.reputation_api_key = Some("test-key".to_string());
        config.reputation_poll_interval = Duration::from_millis(50);
        config.reputation_poll_timeout = Duration::from_millis(250);
        config.fail_closed = fail_closed;

        let reputation =
            ReputationClient::with_base_url(&config, format!("http://{}", addr));
        let manager =
            SecurityManager::new(config, Arc::new(KeywordScanner), reputation).unwrap();

        let verdict = manager
            .validate_upload(&content[..], "note.txt", content.len() as u64)
            .await;

        let scan = verdict.scan.expect("scan details present");
        assert_eq!(scan.reputation.status, ReputationStatus::TimedOut);
        assert_eq!(verdict.accepted, expect_accepted, "fail_closed={fail_closed}");
        if !expect_accepted {
            assert_eq!(verdict.reason.unwrap().code(), "reputation_inconclusive");
        }
        // Cleanup invariant holds on both outcomes
        assert_eq!(dir_count(&root.path().join("staging")), 0);
    }
}

#[tokio::test]
async fn hash_known_to_corpus_as_malicious_is_rejected() {
    let addr = spawn_stub_reputation_server(StubBehavior::KnownMalicious).await;
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.reputation_api_key = Some("test-key".to_string());

    let reputation = ReputationClient::with_base_url(&config, format!("http://{}", addr));
    let manager = SecurityManager::new(config, Arc::new(NoOpScanner), reputation).unwrap();

    let content = b"pothole on elm street, photo reference attached below";
    let verdict = manager
        .validate_upload(&content[..], "note.txt", content.len() as u64)
        .await;

    assert!(!verdict.accepted);
    assert_eq!(verdict.reason.unwrap().code(), "reputation_malicious");
    let reputation = verdict.scan.unwrap().reputation;
    assert_eq!(reputation.status, ReputationStatus::Malicious);
    let tally = reputation.tally.unwrap();
    assert_eq!(tally.malicious, 5);
    assert_eq!(tally.total, 70);
    assert_eq!(dir_count(&root.path().join("staging")), 0);
    assert_eq!(dir_count(&root.path().join("files")), 0);
}

#[tokio::test]
async fn unseen_file_accepted_once_analysis_completes_clean() {
    let addr = spawn_stub_reputation_server(StubBehavior::CompletesClean).await;
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.reputation_api_key = Some("test-key".to_string());
    config.reputation_poll_interval = Duration::from_millis(50);
    config.reputation_poll_timeout = Duration::from_millis(500);

    let reputation = ReputationClient::with_base_url(&config, format!("http://{}", addr));
    let manager = SecurityManager::new(config, Arc::new(NoOpScanner), reputation).unwrap();

    let content = b"broken bench in the riverside park, near the south gate";
    let verdict = manager
        .validate_upload(&content[..], "note.txt", content.len() as u64)
        .await;

    assert!(verdict.accepted, "{:?}", verdict.reason);
    let reputation = verdict.scan.unwrap().reputation;
    assert_eq!(reputation.status, ReputationStatus::Clean);
    assert_eq!(reputation.tally.unwrap().total, 70);
    assert!(root
        .path()
        .join("files")
        .join(verdict.stored_name.unwrap())
        .exists());
    assert_eq!(dir_count(&root.path().join("staging")), 0);
}

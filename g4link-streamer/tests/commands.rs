//! Command tests against a local stand-in for the panel controller's HTTP
//! endpoints.

use std::path::{Path, PathBuf};

use g4link_core::{FRAME_BYTES, LinkError, TransportKind};
use g4link_streamer::config::StreamerConfig;
use g4link_streamer::service::Streamer;
use image::{GrayImage, Luma};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

// ── Local controller ─────────────────────────────────────────────

/// One request seen by [`controller`].
#[derive(Debug)]
struct Seen {
    target: String,
    body: Vec<u8>,
}

/// Answer every request with `200 OK` and a fixed body, recording each
/// request in arrival order.
async fn controller(body: &'static str) -> (String, mpsc::UnboundedReceiver<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            if let Some(seen) = read_request(&mut stream).await {
                let _ = tx.send(seen);
            }
            let reply = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    (addr.to_string(), rx)
}

async fn read_request(stream: &mut TcpStream) -> Option<Seen> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let target = head.split_whitespace().nth(1)?.to_string();
    // Multipart bodies from the client always carry a length.
    let length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf.split_off(header_end);
    while body.len() < length {
        let n = stream.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&tmp[..n]);
    }
    Some(Seen { target, body })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Bytes of the first multipart part.
fn first_part(body: &[u8]) -> &[u8] {
    let start = find(body, b"\r\n\r\n").unwrap() + 4;
    let end = start + find(&body[start..], b"\r\n--").unwrap();
    &body[start..end]
}

fn write_png(dir: &Path, width: u32, height: u32, luma: u8) -> PathBuf {
    let path = dir.join("frame.png");
    GrayImage::from_pixel(width, height, Luma([luma]))
        .save(&path)
        .unwrap();
    path
}

fn config_for(host: String) -> StreamerConfig {
    let mut cfg = StreamerConfig::default();
    cfg.device.host = host;
    cfg
}

#[tokio::test]
async fn probe_reports_both_endpoints() {
    let (host, _requests) = controller("ready").await;
    let streamer = Streamer::new(config_for(host));

    let report = streamer.probe().await.unwrap();
    assert!(report.is_healthy());
    assert_eq!(report.fs_status.body, "ready");
    assert_eq!(report.runtime_status.body, "ready");
}

#[tokio::test]
async fn probe_fails_when_controller_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    drop(listener);

    let streamer = Streamer::new(config_for(host));
    let err = streamer.probe().await.unwrap_err();
    assert!(matches!(err, LinkError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn bad_host_is_a_config_error() {
    let streamer = Streamer::new(config_for("not a host".into()));
    assert!(matches!(
        streamer.probe().await,
        Err(LinkError::Config(_))
    ));
}

#[tokio::test]
async fn show_missing_image_fails_before_sending() {
    let streamer = Streamer::new(StreamerConfig::default());
    let err = assert_err!(streamer.show("/nonexistent/frame.png".as_ref()).await);
    assert!(matches!(err, LinkError::Image(_)));
}

#[tokio::test]
async fn show_uploads_then_applies_a_white_frame() {
    let dir = TempDir::new().unwrap();
    let image = write_png(dir.path(), 640, 480, 255);
    let (host, mut requests) = controller("OK").await;
    let mut cfg = config_for(host);
    cfg.stream.transport = TransportKind::UploadApply;

    let report = assert_ok!(Streamer::new(cfg).show(&image).await);
    assert_eq!(report.delivery.chunks, 1);
    assert_eq!(report.delivery.bytes, FRAME_BYTES);

    let upload = requests.recv().await.unwrap();
    assert_eq!(upload.target, "/upload");
    let frame = first_part(&upload.body);
    assert_eq!(frame.len(), FRAME_BYTES);
    assert!(frame.iter().all(|&b| b == 0xFF));

    let apply = requests.recv().await.unwrap();
    assert_eq!(apply.target, "/apply");
    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn show_pushes_a_resized_image_chunk_by_chunk() {
    let dir = TempDir::new().unwrap();
    let image = write_png(dir.path(), 320, 240, 0);
    let (host, mut requests) = controller("OK").await;
    let mut cfg = config_for(host);
    cfg.stream.transport = TransportKind::ChunkPush;
    cfg.stream.rows_per_chunk = 60;

    let report = assert_ok!(Streamer::new(cfg).show(&image).await);
    assert_eq!(report.delivery.chunks, 8);
    assert_eq!(report.delivery.bytes, FRAME_BYTES);

    for i in 0..8 {
        let seen = requests.recv().await.unwrap();
        assert_eq!(
            seen.target,
            format!("/stream-chunk?rowStart={}&rows=60&packed=1", i * 60)
        );
        let payload = first_part(&seen.body);
        assert_eq!(payload.len(), 60 * 320);
        assert!(payload.iter().all(|&b| b == 0x00));
    }
}

#[cfg(not(target_os = "windows"))]
#[tokio::test]
async fn desktop_commands_need_windows() {
    let streamer = Streamer::new(StreamerConfig::default());
    assert!(matches!(
        streamer.once().await,
        Err(LinkError::Capability(_))
    ));
    assert!(matches!(
        streamer.stream().await,
        Err(LinkError::Capability(_))
    ));
}

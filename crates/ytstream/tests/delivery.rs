use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use ytstream::{
    Begin, ByteStream, DeliverySession, Error, RenditionDescriptor, RequestOptions, ResumePolicy,
    SegmentedStreamer, StreamOptions, TransportMode, open_stream,
};

const RESOURCE_LEN: usize = 1000;

fn resource() -> Vec<u8> {
    (0..RESOURCE_LEN).map(|i| (i % 251) as u8).collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn request_options() -> RequestOptions {
    RequestOptions::new().with_system_proxy(false)
}

fn fast_policy(max_stalled_reconnects: u32) -> ResumePolicy {
    ResumePolicy::default()
        .with_max_stalled_reconnects(max_stalled_reconnects)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
        .with_jitter(false)
}

fn range_options(policy: ResumePolicy) -> StreamOptions {
    StreamOptions::new()
        .with_request(request_options())
        .with_resume(policy)
}

/// Read one request head from `socket`.
async fn read_request_head(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

fn range_header(head: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("range")
            .then(|| value.trim().to_owned())
    })
}

fn range_start(range: Option<&str>) -> usize {
    range
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.split('-').next())
        .and_then(|start| start.parse().ok())
        .unwrap_or(0)
}

/// How a raw upstream answers one connection.
#[derive(Debug, Clone, Copy)]
enum Reply {
    /// 206 for the requested range, body cut off at the given absolute offset.
    PartialUntil(usize),
    /// 200 with the whole resource, ignoring `Range`.
    Full,
}

type SeenRanges = Arc<Mutex<Vec<Option<String>>>>;

/// A raw HTTP upstream able to drop connections mid-body. The n-th connection
/// gets the n-th reply, the last one repeats. Every `Range` header is recorded.
async fn spawn_raw_upstream(replies: Vec<Reply>) -> (SocketAddr, SeenRanges) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: SeenRanges = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let data = resource();

    tokio::spawn(async move {
        let mut connection = 0;
        while let Ok((mut socket, _)) = listener.accept().await {
            let Some(head) = read_request_head(&mut socket).await else {
                continue;
            };
            let range = range_header(&head);
            recorder.lock().unwrap().push(range.clone());

            let reply = replies[connection.min(replies.len() - 1)];
            connection += 1;

            let (head, body) = match reply {
                Reply::PartialUntil(cut) => {
                    let start = range_start(range.as_deref());
                    let head = format!(
                        "HTTP/1.1 206 Partial Content\r\n\
                         Content-Range: bytes {start}-{last}/{total}\r\n\
                         Content-Length: {len}\r\n\
                         Connection: close\r\n\r\n",
                        last = RESOURCE_LEN - 1,
                        total = RESOURCE_LEN,
                        len = RESOURCE_LEN - start,
                    );
                    (head, &data[start..cut.max(start)])
                }
                Reply::Full => {
                    let head = format!(
                        "HTTP/1.1 200 OK\r\n\
                         Content-Length: {RESOURCE_LEN}\r\n\
                         Connection: close\r\n\r\n"
                    );
                    (head, &data[..])
                }
            };

            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body).await;
            let _ = socket.flush().await;
            let _ = socket.shutdown().await;
        }
    });

    (addr, seen)
}

fn rendition(addr: SocketAddr, content_length: Option<usize>) -> RenditionDescriptor {
    let rendition = RenditionDescriptor::new(140).with_url(format!("http://{addr}/videoplayback"));
    match content_length {
        Some(len) => rendition.with_content_length(len.to_string()),
        None => rendition,
    }
}

async fn collect_body(mut session: DeliverySession) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    while let Some(chunk) = session.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

#[tokio::test]
async fn resumes_after_premature_close() {
    init_tracing();
    let (addr, seen) = spawn_raw_upstream(vec![
        Reply::PartialUntil(400),
        Reply::PartialUntil(700),
        Reply::PartialUntil(RESOURCE_LEN),
    ])
    .await;

    let session = open_stream(&rendition(addr, Some(RESOURCE_LEN)), &range_options(fast_policy(3)))
        .await
        .unwrap();
    assert_eq!(session.mode(), TransportMode::RangeFetch);
    assert_eq!(session.content_length(), Some(RESOURCE_LEN as u64));
    let progress = session.progress();

    let body = collect_body(session).await.unwrap();
    assert_eq!(body, resource());
    assert_eq!(progress.received(), RESOURCE_LEN as u64);
    assert_eq!(progress.reconnects(), 2);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            Some("bytes=0-999".to_owned()),
            Some("bytes=400-999".to_owned()),
            Some("bytes=700-999".to_owned()),
        ]
    );
}

#[tokio::test]
async fn resume_answered_with_full_body_skips_delivered_prefix() {
    let (addr, _) = spawn_raw_upstream(vec![Reply::PartialUntil(400), Reply::Full]).await;

    let session = open_stream(&rendition(addr, Some(RESOURCE_LEN)), &range_options(fast_policy(3)))
        .await
        .unwrap();
    let body = collect_body(session).await.unwrap();
    assert_eq!(body.len(), RESOURCE_LEN);
    assert_eq!(body, resource());
}

#[tokio::test]
async fn learns_length_from_content_range() {
    let (addr, seen) = spawn_raw_upstream(vec![
        Reply::PartialUntil(600),
        Reply::PartialUntil(RESOURCE_LEN),
    ])
    .await;

    let session = open_stream(&rendition(addr, None), &range_options(fast_policy(3)))
        .await
        .unwrap();
    assert_eq!(session.content_length(), Some(RESOURCE_LEN as u64));

    let body = collect_body(session).await.unwrap();
    assert_eq!(body, resource());

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0].as_deref(), Some("bytes=0-"));
    assert_eq!(seen[1].as_deref(), Some("bytes=600-999"));
}

#[tokio::test]
async fn gives_up_when_connections_make_no_progress() {
    init_tracing();
    let (addr, seen) = spawn_raw_upstream(vec![Reply::PartialUntil(0)]).await;

    let session = open_stream(&rendition(addr, Some(RESOURCE_LEN)), &range_options(fast_policy(2)))
        .await
        .unwrap();
    let err = collect_body(session).await.unwrap_err();

    match err {
        Error::Stalled {
            received, expected, ..
        } => {
            assert_eq!(received, 0);
            assert_eq!(expected, RESOURCE_LEN as u64);
        }
        other => panic!("unexpected error: {other}"),
    }
    // First connection plus the allowed stalled reconnects
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn stall_counter_resets_on_progress() {
    let (addr, _) = spawn_raw_upstream(vec![
        Reply::PartialUntil(200),
        Reply::PartialUntil(200),
        Reply::PartialUntil(500),
        Reply::PartialUntil(500),
        Reply::PartialUntil(RESOURCE_LEN),
    ])
    .await;

    let session = open_stream(&rendition(addr, Some(RESOURCE_LEN)), &range_options(fast_policy(1)))
        .await
        .unwrap();
    let body = collect_body(session).await.unwrap();
    assert_eq!(body, resource());
}

// Ignores `Range`
async fn upstream_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "video/mp4")], resource())
}

async fn forbidden_handler() -> impl IntoResponse {
    StatusCode::FORBIDDEN
}

async fn spawn_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/videoplayback", get(upstream_handler))
        .route("/forbidden", get(forbidden_handler));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn plain_server_without_range_support() {
    let addr = spawn_upstream().await;

    let session = open_stream(&rendition(addr, None), &range_options(fast_policy(3)))
        .await
        .unwrap();
    assert_eq!(session.content_length(), Some(RESOURCE_LEN as u64));
    let body = collect_body(session).await.unwrap();
    assert_eq!(body, resource());
}

#[tokio::test]
async fn status_error_surfaces_on_open() {
    let addr = spawn_upstream().await;
    let rendition = RenditionDescriptor::new(140).with_url(format!("http://{addr}/forbidden"));

    let err = open_stream(&rendition, &range_options(fast_policy(3)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::HttpStatus {
            status: StatusCode::FORBIDDEN,
            ..
        }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn passthrough_relays_a_single_plain_get() {
    let (addr, seen) = spawn_raw_upstream(vec![Reply::Full]).await;
    let options = StreamOptions::new()
        .with_request(request_options())
        .passthrough();

    let session = open_stream(&rendition(addr, Some(RESOURCE_LEN)), &options)
        .await
        .unwrap();
    assert_eq!(session.mode(), TransportMode::Passthrough);
    let progress = session.progress();

    let body = collect_body(session).await.unwrap();
    assert_eq!(body, resource());
    assert_eq!(progress.received(), RESOURCE_LEN as u64);
    assert_eq!(progress.reconnects(), 0);
    assert_eq!(seen.lock().unwrap().clone(), vec![None]);
}

#[derive(Default)]
struct RecordingStreamer {
    opened: Mutex<Vec<(String, Option<Begin>)>>,
}

#[async_trait]
impl SegmentedStreamer for RecordingStreamer {
    async fn open(
        &self,
        url: &str,
        begin: Option<Begin>,
        _request: &RequestOptions,
    ) -> Result<ByteStream, Error> {
        self.opened.lock().unwrap().push((url.to_owned(), begin));
        let chunks = vec![
            Ok(Bytes::from_static(b"segment-1")),
            Ok(Bytes::from_static(b"segment-2")),
        ];
        Ok(stream::iter(chunks).boxed())
    }
}

#[tokio::test]
async fn live_hls_starts_at_the_live_edge() {
    let streamer = Arc::new(RecordingStreamer::default());
    let options = StreamOptions::new()
        .with_request(request_options())
        .with_segmented(streamer.clone());
    let url = "https://manifest.test/api/yt_live_broadcast/itag/96/hls_playlist/index.m3u8";
    let rendition = RenditionDescriptor::new(96).with_url(url);

    let before = Utc::now();
    let session = open_stream(&rendition, &options).await.unwrap();
    let after = Utc::now();
    assert_eq!(session.mode(), TransportMode::Segmented);
    let progress = session.progress();

    let body = collect_body(session).await.unwrap();
    assert_eq!(body, b"segment-1segment-2");
    assert_eq!(progress.received(), 18);

    let opened = streamer.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, url);
    match opened[0].1 {
        Some(Begin::WallClock(at)) => assert!(before <= at && at <= after),
        other => panic!("unexpected begin: {other:?}"),
    }
}

#[tokio::test]
async fn explicit_begin_is_passed_through() {
    let streamer = Arc::new(RecordingStreamer::default());
    let begin = Begin::Offset(Duration::from_secs(10));
    let options = StreamOptions::new()
        .with_request(request_options())
        .with_segmented(streamer.clone())
        .with_begin(begin);

    let live = RenditionDescriptor::new(96)
        .with_url("https://manifest.test/api/yt_live_broadcast/hls_playlist/index.m3u8");
    let dash = RenditionDescriptor::new(137).with_url("https://manifest.test/api/manifest/dash/id/1");
    open_stream(&live, &options).await.unwrap();
    open_stream(&dash, &options).await.unwrap();

    let opened = streamer.opened.lock().unwrap().clone();
    assert_eq!(opened[0].1, Some(begin));
    assert_eq!(opened[1].1, Some(begin));
}

#[tokio::test]
async fn recorded_dash_has_no_begin() {
    let streamer = Arc::new(RecordingStreamer::default());
    let options = StreamOptions::new()
        .with_request(request_options())
        .with_segmented(streamer.clone());
    let dash = RenditionDescriptor::new(137).with_url("https://manifest.test/api/manifest/dash/id/1");

    open_stream(&dash, &options).await.unwrap();
    assert_eq!(streamer.opened.lock().unwrap()[0].1, None);
}

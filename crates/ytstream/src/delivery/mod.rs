//! Delivery: turning a resolved rendition into a byte stream.
//!
//! Three transport modes are available:
//!
//! - [`TransportMode::RangeFetch`] (default): `Range` requests that resume
//!   after premature connection closes, see [`ResumePolicy`]
//! - [`TransportMode::Passthrough`]: a single plain GET relayed as-is, chosen
//!   when resumption is disabled
//! - [`TransportMode::Segmented`]: DASH/HLS URLs handed to an external
//!   [`SegmentedStreamer`]

mod range;
pub mod retry;
pub mod segmented;

use std::{
    fmt,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use reqwest::Client;
use tracing::{debug, info, instrument};

pub use retry::ResumePolicy;
pub use segmented::{Begin, ByteStream, SegmentedStreamer};

use crate::{
    config::RequestOptions,
    error::Error,
    media::RenditionDescriptor,
    utils::{is_dash_content_url, is_hls_content_url, is_live_content_url},
};
use range::RangeFetch;

const UNKNOWN_LENGTH: u64 = u64::MAX;

/// How a session obtains its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Passthrough,
    RangeFetch,
    Segmented,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough => write!(f, "passthrough"),
            Self::RangeFetch => write!(f, "range-fetch"),
            Self::Segmented => write!(f, "segmented"),
        }
    }
}

/// Live counters for a session, readable while the stream is consumed.
#[derive(Debug)]
pub struct SessionProgress {
    received: AtomicU64,
    content_length: AtomicU64,
    reconnects: AtomicU32,
}

impl Default for SessionProgress {
    fn default() -> Self {
        Self {
            received: AtomicU64::new(0),
            content_length: AtomicU64::new(UNKNOWN_LENGTH),
            reconnects: AtomicU32::new(0),
        }
    }
}

impl SessionProgress {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn content_length(&self) -> Option<u64> {
        match self.content_length.load(Ordering::Relaxed) {
            UNKNOWN_LENGTH => None,
            len => Some(len),
        }
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub(crate) fn add_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn set_content_length(&self, len: Option<u64>) {
        self.content_length
            .store(len.unwrap_or(UNKNOWN_LENGTH), Ordering::Relaxed);
    }

    pub(crate) fn add_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }
}

/// Options for opening a delivery session.
#[derive(Clone)]
pub struct StreamOptions {
    /// Start position for segmented streams.
    pub begin: Option<Begin>,
    pub request: RequestOptions,
    /// Component used for DASH/HLS URLs.
    pub segmented: Option<Arc<dyn SegmentedStreamer>>,
    /// Resume behaviour for range fetches; `None` selects passthrough.
    pub resume: Option<ResumePolicy>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            begin: None,
            request: RequestOptions::default(),
            segmented: None,
            resume: Some(ResumePolicy::default()),
        }
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_begin(mut self, begin: Begin) -> Self {
        self.begin = Some(begin);
        self
    }

    pub fn with_request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    pub fn with_segmented(mut self, streamer: Arc<dyn SegmentedStreamer>) -> Self {
        self.segmented = Some(streamer);
        self
    }

    pub fn with_resume(mut self, policy: ResumePolicy) -> Self {
        self.resume = Some(policy);
        self
    }

    /// Disable resumption: one plain GET, relayed as-is.
    pub fn passthrough(mut self) -> Self {
        self.resume = None;
        self
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("begin", &self.begin)
            .field("request", &self.request)
            .field("segmented", &self.segmented.as_ref().map(|_| ".."))
            .field("resume", &self.resume)
            .finish()
    }
}

/// An in-progress download, consumed as a stream of byte chunks.
///
/// Chunks arrive in file order with no gaps or duplicates. An error is the
/// last item of the stream.
pub struct DeliverySession {
    url: String,
    mode: TransportMode,
    progress: Arc<SessionProgress>,
    stream: ByteStream,
}

impl DeliverySession {
    fn new(url: String, mode: TransportMode, progress: Arc<SessionProgress>, stream: ByteStream) -> Self {
        Self {
            url,
            mode,
            progress,
            stream,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn bytes_received(&self) -> u64 {
        self.progress.received()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.progress.content_length()
    }

    pub fn reconnects(&self) -> u32 {
        self.progress.reconnects()
    }

    /// Handle to the session counters that outlives the session.
    pub fn progress(&self) -> Arc<SessionProgress> {
        Arc::clone(&self.progress)
    }
}

impl fmt::Debug for DeliverySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliverySession")
            .field("url", &self.url)
            .field("mode", &self.mode)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl Stream for DeliverySession {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

/// Open a delivery session for `rendition` with a client built from `options.request`.
pub async fn open_stream(
    rendition: &RenditionDescriptor,
    options: &StreamOptions,
) -> Result<DeliverySession, Error> {
    DeliveryEngine::new(options.clone())?.open(rendition).await
}

/// Opens delivery sessions with a reusable HTTP client.
#[derive(Clone)]
pub struct DeliveryEngine {
    client: Client,
    options: StreamOptions,
}

impl DeliveryEngine {
    pub fn new(options: StreamOptions) -> Result<Self, Error> {
        let client = options.request.build_client()?;
        Ok(Self { client, options })
    }

    pub fn with_client(client: Client, options: StreamOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    #[instrument(skip_all, fields(itag = rendition.itag))]
    pub async fn open(&self, rendition: &RenditionDescriptor) -> Result<DeliverySession, Error> {
        let url = rendition
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(Error::Unresolved {
                itag: rendition.itag,
            })?;

        if is_dash_content_url(url) || is_hls_content_url(url) {
            return self.open_segmented(url).await;
        }

        let progress = Arc::new(SessionProgress::default());
        let expected = rendition.content_length_bytes();

        if expected == Some(0) {
            debug!("Empty rendition, nothing to fetch");
            progress.set_content_length(Some(0));
            return Ok(DeliverySession::new(
                url.to_owned(),
                TransportMode::RangeFetch,
                progress,
                stream::empty().boxed(),
            ));
        }

        let Some(policy) = self.options.resume.clone() else {
            return self.open_passthrough(url, expected, progress).await;
        };

        info!(url, expected = ?expected, "Opening range fetch");
        let fetch = RangeFetch::new(
            self.client.clone(),
            self.options.request.clone(),
            url.to_owned(),
            expected,
            policy,
            Arc::clone(&progress),
        )
        .start()
        .await?;

        Ok(DeliverySession::new(
            url.to_owned(),
            TransportMode::RangeFetch,
            progress,
            fetch.into_stream(),
        ))
    }

    async fn open_segmented(&self, url: &str) -> Result<DeliverySession, Error> {
        let Some(streamer) = &self.options.segmented else {
            return Err(Error::SegmentedUnavailable {
                url: url.to_owned(),
            });
        };

        let begin = self
            .options
            .begin
            .or_else(|| is_live_content_url(url).then(Begin::now));
        info!(url, begin = ?begin, "Delegating to segmented streamer");

        let inner = streamer.open(url, begin, &self.options.request).await?;
        let progress = Arc::new(SessionProgress::default());
        let counter = Arc::clone(&progress);
        let stream = inner
            .inspect(move |item| {
                if let Ok(chunk) = item {
                    counter.add_received(chunk.len() as u64);
                }
            })
            .boxed();

        Ok(DeliverySession::new(
            url.to_owned(),
            TransportMode::Segmented,
            progress,
            stream,
        ))
    }

    async fn open_passthrough(
        &self,
        url: &str,
        expected: Option<u64>,
        progress: Arc<SessionProgress>,
    ) -> Result<DeliverySession, Error> {
        info!(url, "Opening passthrough stream");
        let response = self
            .options
            .request
            .apply(self.client.get(url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(status, url, "passthrough fetch"));
        }

        progress.set_content_length(response.content_length().or(expected));
        let counter = Arc::clone(&progress);
        let stream = response
            .bytes_stream()
            .map(move |item| -> Result<Bytes, Error> {
                let chunk = item?;
                counter.add_received(chunk.len() as u64);
                Ok(chunk)
            })
            .boxed();

        Ok(DeliverySession::new(
            url.to_owned(),
            TransportMode::Passthrough,
            progress,
            stream,
        ))
    }
}

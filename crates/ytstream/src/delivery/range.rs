//! Resumable range fetch.
//!
//! One logical download is a sequence of `Range` requests. When a response
//! body ends before the expected length, the next request asks for the
//! remaining bytes and the output simply continues, so the consumer sees one
//! contiguous body.

use std::{pin::Pin, sync::Arc};

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use reqwest::{
    Client, Response, StatusCode,
    header::{CONTENT_RANGE, RANGE},
};
use tracing::{debug, info, warn};

use super::{
    SessionProgress,
    retry::{ResumePolicy, is_retryable_reqwest_error},
    segmented::ByteStream,
};
use crate::{config::RequestOptions, error::Error};

type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// State carried between polls of a range-fetch stream.
pub(crate) struct RangeFetch {
    client: Client,
    request: RequestOptions,
    url: String,
    policy: ResumePolicy,
    progress: Arc<SessionProgress>,
    expected: Option<u64>,
    received: u64,
    body: Option<BodyStream>,
    // Bytes of the current body already delivered on an earlier connection
    skip: u64,
    connects: u32,
    received_at_connect: u64,
    stalls: u32,
    done: bool,
}

impl RangeFetch {
    pub(crate) fn new(
        client: Client,
        request: RequestOptions,
        url: String,
        expected: Option<u64>,
        policy: ResumePolicy,
        progress: Arc<SessionProgress>,
    ) -> Self {
        progress.set_content_length(expected);
        Self {
            client,
            request,
            url,
            policy,
            progress,
            expected,
            received: 0,
            body: None,
            skip: 0,
            connects: 0,
            received_at_connect: 0,
            stalls: 0,
            done: false,
        }
    }

    /// Open the first connection, surfacing its errors to the caller.
    pub(crate) async fn start(mut self) -> Result<Self, Error> {
        if !self.is_complete() {
            self.connect().await?;
        }
        Ok(self)
    }

    pub(crate) fn into_stream(self) -> ByteStream {
        stream::unfold(self, |mut state| async move {
            let item = state.next_chunk().await?;
            Some((item, state))
        })
        .boxed()
    }

    fn is_complete(&self) -> bool {
        self.expected.is_some_and(|expected| self.received >= expected)
    }

    fn range_header(&self) -> String {
        match self.expected {
            Some(expected) => format!("bytes={}-{}", self.received, expected.saturating_sub(1)),
            None => format!("bytes={}-", self.received),
        }
    }

    async fn next_chunk(&mut self) -> Option<Result<Bytes, Error>> {
        loop {
            if self.done {
                return None;
            }
            if self.is_complete() {
                info!(url = %self.url, bytes = self.received, "Download complete");
                self.body = None;
                self.done = true;
                return None;
            }

            if self.body.is_none() {
                if let Err(e) = self.reconnect().await {
                    self.done = true;
                    return Some(Err(e));
                }
                continue;
            }

            let Some(body) = self.body.as_mut() else {
                continue;
            };
            match body.next().await {
                Some(Ok(chunk)) => {
                    let chunk = self.accept(chunk);
                    if !chunk.is_empty() {
                        return Some(Ok(chunk));
                    }
                }
                Some(Err(e)) => {
                    self.body = None;
                    if self.expected.is_none() {
                        self.done = true;
                        return Some(Err(e.into()));
                    }
                    warn!(
                        received = self.received,
                        expected = ?self.expected,
                        error = %e,
                        "Connection failed mid-body, resuming"
                    );
                }
                None => {
                    self.body = None;
                    if self.expected.is_none() {
                        // No length to check against, a clean close is the end
                        info!(url = %self.url, bytes = self.received, "Download complete");
                        self.done = true;
                        return None;
                    }
                    if !self.is_complete() {
                        warn!(
                            received = self.received,
                            expected = ?self.expected,
                            "Connection closed early, resuming"
                        );
                    }
                }
            }
        }
    }

    /// Reconnect after an early end, applying the stall limit and backoff.
    async fn reconnect(&mut self) -> Result<(), Error> {
        self.progress.add_reconnect();

        if self.received == self.received_at_connect {
            self.stalls += 1;
        } else {
            self.stalls = 0;
        }

        if self.stalls > self.policy.max_stalled_reconnects {
            return Err(Error::Stalled {
                received: self.received,
                expected: self.expected.unwrap_or_default(),
                attempts: self.stalls - 1,
            });
        }

        if self.stalls > 0 {
            let delay = self.policy.backoff(self.stalls);
            debug!(
                stalls = self.stalls,
                delay_ms = delay.as_millis() as u64,
                "No progress since last connection, backing off"
            );
            tokio::time::sleep(delay).await;
        }

        match self.connect().await {
            Ok(()) => Ok(()),
            Err(Error::Network { source }) if is_retryable_reqwest_error(&source) => {
                warn!(error = %source, "Resume request failed, will retry");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn connect(&mut self) -> Result<(), Error> {
        self.connects += 1;
        self.received_at_connect = self.received;

        let range = self.range_header();
        debug!(url = %self.url, range = %range, attempt = self.connects, "Requesting range");

        let response = self
            .request
            .apply(self.client.get(&self.url))
            .header(RANGE, range)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(status, &self.url, "range fetch"));
        }

        if self.expected.is_none() {
            self.expected = self.learn_length(&response);
            self.progress.set_content_length(self.expected);
            debug!(expected = ?self.expected, "Learned content length");
        }

        // A server ignoring `Range` restarts from zero
        self.skip = if status == StatusCode::PARTIAL_CONTENT {
            0
        } else {
            self.received
        };
        if self.skip > 0 {
            debug!(skip = self.skip, "Range ignored, skipping delivered prefix");
        }

        self.body = Some(Box::pin(response.bytes_stream()));
        Ok(())
    }

    fn learn_length(&self, response: &Response) -> Option<u64> {
        if response.status() == StatusCode::PARTIAL_CONTENT {
            let total = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(content_range_total);
            total.or_else(|| response.content_length().map(|len| len + self.received))
        } else {
            response.content_length()
        }
    }

    /// Drop already-delivered and out-of-range bytes, then account for the rest.
    fn accept(&mut self, mut chunk: Bytes) -> Bytes {
        if self.skip > 0 {
            let n = (self.skip as usize).min(chunk.len());
            self.skip -= n as u64;
            chunk = chunk.slice(n..);
        }

        if let Some(expected) = self.expected {
            let remaining = expected.saturating_sub(self.received);
            if chunk.len() as u64 > remaining {
                chunk.truncate(remaining as usize);
            }
        }

        self.received += chunk.len() as u64;
        self.progress.add_received(chunk.len() as u64);
        chunk
    }
}

/// Total length from a `Content-Range` value such as `bytes 0-999/1000`.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

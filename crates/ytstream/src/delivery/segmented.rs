use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::{config::RequestOptions, error::Error};

/// A boxed byte stream as handed to consumers.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Where a segmented stream starts playing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Begin {
    /// Offset from the start of the presentation.
    Offset(Duration),
    /// Absolute wall-clock time, used to follow the live edge.
    WallClock(DateTime<Utc>),
}

impl Begin {
    /// The current wall-clock time.
    pub fn now() -> Self {
        Self::WallClock(Utc::now())
    }
}

/// External component that downloads DASH/HLS content segment by segment.
///
/// The returned stream carries the same contract as a range fetch: ordered,
/// gap-free bytes, with errors yielded as the final item.
#[async_trait]
pub trait SegmentedStreamer: Send + Sync {
    async fn open(
        &self,
        url: &str,
        begin: Option<Begin>,
        request: &RequestOptions,
    ) -> Result<ByteStream, Error>;
}

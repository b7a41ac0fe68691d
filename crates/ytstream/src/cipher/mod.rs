//! Signature cipher decoding.
//!
//! Cipher-protected renditions carry an obfuscated signature that only the
//! site's player bundle knows how to transform. This module cuts the
//! transform (and the helper object it calls) out of the bundle and turns it
//! into a [`CipherDecoder`] through one of several evaluator backends:
//!
//! - `isolate`: a dedicated QuickJS runtime with a memory ceiling, kept alive
//!   until the decoder is disposed
//! - `context`: a fresh QuickJS runtime per decode
//! - `native`: a small interpreter for the helper's array primitives
//!
//! A caller can also plug in its own [`CustomEvaluator`].

pub mod error;
pub mod evaluator;
pub mod extract;
pub mod native;
#[cfg(feature = "quickjs")]
pub mod quickjs;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

pub use error::CipherError;
pub use evaluator::{Evaluator, EvaluatorBackend};
pub use extract::DecoderProgram;

use crate::{config::RequestOptions, error::Error, js_engine::DEFAULT_MEMORY_LIMIT};

/// A decode function produced from a player bundle.
///
/// Decoders are scoped to a single resolution call. Holders must call
/// [`dispose`](CipherDecoder::dispose) when done; backends without a
/// persistent resource report themselves as already disposed.
pub trait CipherDecoder: Send + Sync {
    /// Transform an obfuscated signature. Pure: the same input always yields
    /// the same output.
    fn decode(&self, signature: &str) -> Result<String, CipherError>;

    fn is_disposed(&self) -> bool;

    /// Release any sandbox resources. Idempotent.
    fn dispose(&mut self);
}

/// Caller-supplied evaluator for decoder programs.
///
/// The program text is a helper object definition followed by a
/// parenthesised single-argument function; its completion value is the
/// decode function.
#[async_trait]
pub trait CustomEvaluator: Send + Sync {
    async fn evaluate(&self, program: &str) -> Result<Box<dyn CipherDecoder>, CipherError>;
}

/// Options for building a decoder.
#[derive(Debug, Clone)]
pub struct CipherOptions {
    pub evaluator: Evaluator,
    /// Sandbox heap ceiling in bytes, `None` for unlimited.
    pub memory_limit: Option<usize>,
}

impl Default for CipherOptions {
    fn default() -> Self {
        Self {
            evaluator: Evaluator::Auto,
            memory_limit: Some(DEFAULT_MEMORY_LIMIT),
        }
    }
}

impl CipherOptions {
    pub fn with_evaluator(mut self, evaluator: impl Into<Evaluator>) -> Self {
        self.evaluator = evaluator.into();
        self
    }

    pub fn with_memory_limit(mut self, limit: Option<usize>) -> Self {
        self.memory_limit = limit;
        self
    }
}

/// Fetch the player bundle at `player_url` and build a decoder from it.
pub async fn get_cipher_function(
    player_url: &str,
    options: &CipherOptions,
    request: &RequestOptions,
) -> Result<Box<dyn CipherDecoder>, Error> {
    let client = request.build_client()?;
    Ok(fetch_cipher_function(&client, player_url, options, request).await?)
}

#[instrument(skip(client, options, request), level = "debug")]
pub(crate) async fn fetch_cipher_function(
    client: &Client,
    player_url: &str,
    options: &CipherOptions,
    request: &RequestOptions,
) -> Result<Box<dyn CipherDecoder>, CipherError> {
    debug!("Fetching player bundle");
    let response = request.apply(client.get(player_url)).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CipherError::HttpStatus {
            status,
            url: player_url.to_owned(),
        });
    }
    let bundle = response.text().await?;
    debug!(bytes = bundle.len(), "Player bundle fetched");

    let program = DecoderProgram::extract(&bundle)?;
    debug!(helper = %program.helper_name, "Located signature transform");

    options
        .evaluator
        .evaluate(&program, options.memory_limit)
        .await
}

//! Format resolution: turning a [`StreamManifest`] into fetchable renditions.

pub mod hls;

use std::{fmt, sync::Arc};

use reqwest::Client;
use tracing::{debug, info, instrument};

pub use hls::expand_hls_manifest;

use crate::{
    cipher::{CipherDecoder, CipherOptions, fetch_cipher_function},
    config::RequestOptions,
    error::Error,
    media::{RenditionDescriptor, StreamManifest},
    utils::parse_query_string,
};

/// Signature parameter name used when the cipher omits `sp`.
const DEFAULT_SIGNATURE_PARAM: &str = "signature";

/// Predicate selecting which renditions to keep.
pub type RenditionFilter = Arc<dyn Fn(&RenditionDescriptor) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ResolveOptions {
    /// Applied before any decoding; rejected renditions are never decoded.
    pub filter: Option<RenditionFilter>,
    pub request: RequestOptions,
    pub cipher: CipherOptions,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RenditionDescriptor) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    pub fn with_cipher(mut self, cipher: CipherOptions) -> Self {
        self.cipher = cipher;
        self
    }
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("filter", &self.filter.as_ref().map(|_| ".."))
            .field("request", &self.request)
            .field("cipher", &self.cipher)
            .finish()
    }
}

/// Resolve `manifest` with a client built from `options.request`.
pub async fn resolve(
    manifest: &StreamManifest,
    options: &ResolveOptions,
) -> Result<Vec<RenditionDescriptor>, Error> {
    FormatResolver::new(options.clone())?.resolve(manifest).await
}

/// Resolves manifests with a reusable HTTP client.
#[derive(Debug, Clone)]
pub struct FormatResolver {
    client: Client,
    options: ResolveOptions,
}

impl FormatResolver {
    pub fn new(options: ResolveOptions) -> Result<Self, Error> {
        let client = options.request.build_client()?;
        Ok(Self { client, options })
    }

    pub fn with_client(client: Client, options: ResolveOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Filter, order and decode the manifest's renditions, then append the
    /// variants of its HLS master playlist, if any.
    ///
    /// Direct renditions come back sorted by [`RenditionDescriptor::score`],
    /// each with a usable `url`, `decoded` set and `signature_cipher` cleared.
    /// The decoder created for cipher-protected renditions is disposed before
    /// this returns, whether resolution succeeds or fails.
    #[instrument(
        skip_all,
        fields(
            formats = manifest.formats.len(),
            adaptive_formats = manifest.adaptive_formats.len(),
            live = manifest.is_live()
        )
    )]
    pub async fn resolve(
        &self,
        manifest: &StreamManifest,
    ) -> Result<Vec<RenditionDescriptor>, Error> {
        let mut candidates: Vec<RenditionDescriptor> = manifest.renditions().cloned().collect();
        candidates.sort_by_key(RenditionDescriptor::score);
        if let Some(filter) = &self.options.filter {
            candidates.retain(|rendition| filter(rendition));
        }
        debug!(candidates = candidates.len(), "Resolving renditions");

        let mut decoder: Option<Box<dyn CipherDecoder>> = None;
        let result = self
            .resolve_direct(manifest, candidates, &mut decoder)
            .await;

        if let Some(mut decoder) = decoder {
            if result.is_ok() || !decoder.is_disposed() {
                decoder.dispose();
            }
        }
        let mut resolved = result?;

        if let Some(hls_url) = &manifest.hls_manifest_url {
            let variants = self.fetch_hls_renditions(hls_url).await?;
            resolved.extend(variants);
        }

        info!(renditions = resolved.len(), "Resolved manifest");
        Ok(resolved)
    }

    async fn resolve_direct(
        &self,
        manifest: &StreamManifest,
        candidates: Vec<RenditionDescriptor>,
        decoder: &mut Option<Box<dyn CipherDecoder>>,
    ) -> Result<Vec<RenditionDescriptor>, Error> {
        let is_live = manifest.is_live();
        let mut resolved = Vec::with_capacity(candidates.len());

        for mut rendition in candidates {
            let itag = rendition.itag;

            if let Some(cipher) = rendition.signature_cipher.take() {
                let player_url = manifest
                    .player_url()
                    .ok_or(Error::MissingPlayerUrl { itag })?;

                let params = parse_query_string(&cipher);
                let base_url = params
                    .get("url")
                    .ok_or_else(|| Error::malformed_cipher(itag, "missing `url`"))?;
                let signature = params
                    .get("s")
                    .ok_or_else(|| Error::malformed_cipher(itag, "missing `s`"))?;
                let param = params
                    .get("sp")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_SIGNATURE_PARAM);

                let active = match decoder {
                    Some(active) => active,
                    None => decoder.insert(
                        fetch_cipher_function(
                            &self.client,
                            player_url,
                            &self.options.cipher,
                            &self.options.request,
                        )
                        .await?,
                    ),
                };

                let decoded = active.decode(signature)?;
                rendition.url = Some(format!("{base_url}&{param}={decoded}"));
                debug!(itag, "Decoded rendition signature");
            } else if !rendition.has_url() {
                return Err(Error::MissingUrl { itag });
            }

            rendition.decoded = true;
            rendition.is_live = is_live;
            resolved.push(rendition);
        }

        Ok(resolved)
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_hls_renditions(&self, hls_url: &str) -> Result<Vec<RenditionDescriptor>, Error> {
        let response = self
            .options
            .request
            .apply(self.client.get(hls_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(status, hls_url, "HLS manifest fetch"));
        }

        if let Some(cookies) = &self.options.request.cookies {
            cookies.store_response_cookies(response.headers());
        }

        let base_url = response.url().to_string();
        let playlist = response.text().await?;
        let variants = expand_hls_manifest(&playlist, &base_url);
        debug!(variants = variants.len(), "Expanded HLS manifest");
        Ok(variants)
    }
}

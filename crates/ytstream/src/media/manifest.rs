use serde::{Deserialize, Serialize};

use super::rendition::RenditionDescriptor;

/// Reference to the player bundle carrying the current signature transform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
/// The set of candidate renditions for one video, as produced by a scraping
/// collaborator.
///
/// The shape mirrors the site's `streamingData` object with an added
/// `player` reference, so it can be deserialized from that JSON directly.
///
/// # Examples
///
/// ```rust
/// use ytstream::media::{RenditionDescriptor, StreamManifest};
///
/// let manifest = StreamManifest::builder()
///     .format(RenditionDescriptor::new(18).with_url("https://x.test/18"))
///     .adaptive_format(RenditionDescriptor::new(140).with_signature_cipher("s=AB&url=x"))
///     .player_url("https://x.test/player/base.js")
///     .build();
///
/// assert!(manifest.requires_player());
/// ```
pub struct StreamManifest {
    // Progressive renditions (audio+video)
    #[serde(default)]
    pub formats: Vec<RenditionDescriptor>,
    // Adaptive renditions (single track)
    #[serde(default)]
    pub adaptive_formats: Vec<RenditionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls_manifest_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_manifest_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<String>,
}

impl StreamManifest {
    pub fn builder() -> StreamManifestBuilder {
        StreamManifestBuilder::default()
    }

    pub fn player_url(&self) -> Option<&str> {
        self.player.as_ref().map(|p| p.url.as_str())
    }

    /// A manifest with an HLS master playlist describes a live stream.
    pub fn is_live(&self) -> bool {
        self.hls_manifest_url.is_some()
    }

    /// Whether any rendition needs the player bundle to be decoded.
    pub fn requires_player(&self) -> bool {
        self.renditions().any(RenditionDescriptor::is_cipher_protected)
    }

    /// Progressive renditions followed by adaptive ones, in manifest order.
    pub fn renditions(&self) -> impl Iterator<Item = &RenditionDescriptor> {
        self.formats.iter().chain(self.adaptive_formats.iter())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamManifestBuilder {
    manifest: StreamManifest,
}

impl StreamManifestBuilder {
    pub fn format(mut self, rendition: RenditionDescriptor) -> Self {
        self.manifest.formats.push(rendition);
        self
    }

    pub fn formats(mut self, renditions: Vec<RenditionDescriptor>) -> Self {
        self.manifest.formats = renditions;
        self
    }

    pub fn adaptive_format(mut self, rendition: RenditionDescriptor) -> Self {
        self.manifest.adaptive_formats.push(rendition);
        self
    }

    pub fn adaptive_formats(mut self, renditions: Vec<RenditionDescriptor>) -> Self {
        self.manifest.adaptive_formats = renditions;
        self
    }

    pub fn hls_manifest_url(mut self, url: impl Into<String>) -> Self {
        self.manifest.hls_manifest_url = Some(url.into());
        self
    }

    pub fn dash_manifest_url(mut self, url: impl Into<String>) -> Self {
        self.manifest.dash_manifest_url = Some(url.into());
        self
    }

    pub fn player_url(mut self, url: impl Into<String>) -> Self {
        self.manifest.player = Some(PlayerRef { url: url.into() });
        self
    }

    pub fn player_url_opt(mut self, url: Option<String>) -> Self {
        self.manifest.player = url.map(|url| PlayerRef { url });
        self
    }

    pub fn build(self) -> StreamManifest {
        self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_streaming_data() {
        let json = r#"{
            "expiresInSeconds": "21540",
            "formats": [{ "itag": 18, "url": "https://x.test/18", "bitrate": 500 }],
            "adaptiveFormats": [{ "itag": 140, "signatureCipher": "s=AB&url=x" }],
            "hlsManifestUrl": "https://x.test/hls_variant/index.m3u8",
            "player": { "url": "https://x.test/s/player/base.js" }
        }"#;

        let manifest = StreamManifest::from_json(json).unwrap();
        assert_eq!(manifest.formats.len(), 1);
        assert_eq!(manifest.adaptive_formats.len(), 1);
        assert!(manifest.is_live());
        assert!(manifest.requires_player());
        assert_eq!(manifest.player_url(), Some("https://x.test/s/player/base.js"));
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let manifest = StreamManifest::from_json("{}").unwrap();
        assert_eq!(manifest.renditions().count(), 0);
        assert!(!manifest.is_live());
        assert!(!manifest.requires_player());
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// One candidate audio/video stream advertised by the site.
///
/// Field names follow the site's streaming JSON (camelCase), so a
/// `formats`/`adaptiveFormats` entry deserializes straight into this type.
/// Numeric values the site sends as strings (`contentLength`,
/// `audioSampleRate`) stay strings here; use the accessor helpers to read them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenditionDescriptor {
    // Format profile identifier
    pub itag: u32,
    // Fetch URL, absent until decoded when the rendition is cipher-protected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_sample_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_channels: Option<u32>,
    // Size in bytes as a decimal string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approx_duration_ms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Opaque query-string blob (`s`, `sp`, `url`) that must be decoded
    /// before the rendition can be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_cipher: Option<String>,
    /// Set once `url` is known to be usable.
    #[serde(default)]
    pub decoded: bool,
    #[serde(default)]
    pub is_live: bool,
}

impl RenditionDescriptor {
    pub fn new(itag: u32) -> Self {
        Self {
            itag,
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_signature_cipher(mut self, cipher: impl Into<String>) -> Self {
        self.signature_cipher = Some(cipher.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_audio_sample_rate(mut self, rate: impl Into<String>) -> Self {
        self.audio_sample_rate = Some(rate.into());
        self
    }

    pub fn with_content_length(mut self, length: impl Into<String>) -> Self {
        self.content_length = Some(length.into());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Audio sample rate in Hz, `0` when missing or unparsable.
    pub fn audio_sample_rate_hz(&self) -> u64 {
        self.audio_sample_rate
            .as_deref()
            .and_then(|rate| rate.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Content length in bytes, if advertised and parsable.
    pub fn content_length_bytes(&self) -> Option<u64> {
        self.content_length
            .as_deref()
            .and_then(|len| len.trim().parse().ok())
    }

    /// Ranking key used when ordering renditions: `bitrate + audioSampleRate`.
    ///
    /// This blends the two so audio-only renditions land next to video of a
    /// comparable bitrate, matching the site's own ordering.
    pub fn score(&self) -> u64 {
        self.bitrate
            .unwrap_or(0)
            .saturating_add(self.audio_sample_rate_hz())
    }

    pub fn is_cipher_protected(&self) -> bool {
        self.signature_cipher.is_some()
    }

    /// A non-empty URL is present.
    pub fn has_url(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
    }

    pub fn is_audio(&self) -> bool {
        crate::utils::is_audio_codec(&self.mime_type)
    }

    pub fn is_video(&self) -> bool {
        crate::utils::is_video_codec(&self.mime_type)
    }
}

impl fmt::Display for RenditionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "itag {}", self.itag)?;
        if let Some(label) = &self.quality_label {
            write!(f, " {label}")?;
        } else if let (Some(w), Some(h)) = (self.width, self.height) {
            write!(f, " {w}x{h}")?;
        }
        if !self.mime_type.is_empty() {
            write!(f, " ({})", self.mime_type)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_adds_sample_rate_to_bitrate() {
        let video = RenditionDescriptor::new(18).with_bitrate(500);
        let audio = RenditionDescriptor::new(140)
            .with_bitrate(128)
            .with_audio_sample_rate("44100");

        assert_eq!(video.score(), 500);
        assert_eq!(audio.score(), 44228);
    }

    #[test]
    fn missing_numbers_score_zero() {
        let r = RenditionDescriptor::new(1).with_audio_sample_rate("n/a");
        assert_eq!(r.score(), 0);
        assert_eq!(r.content_length_bytes(), None);
    }

    #[test]
    fn deserializes_site_json() {
        let json = r#"{
            "itag": 140,
            "mimeType": "audio/mp4; codecs=\"mp4a.40.2\"",
            "bitrate": 130685,
            "contentLength": "3433514",
            "audioSampleRate": "44100",
            "audioChannels": 2,
            "signatureCipher": "s=AB&sp=sig&url=https%3A%2F%2Fx.test%2Fv"
        }"#;

        let r: RenditionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(r.itag, 140);
        assert!(r.is_audio());
        assert!(r.is_cipher_protected());
        assert!(!r.has_url());
        assert!(!r.decoded);
        assert_eq!(r.content_length_bytes(), Some(3_433_514));
    }
}

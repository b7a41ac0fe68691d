//! Expansion of an HLS master playlist into per-variant renditions.

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::warn;
use url::Url;

use crate::{media::RenditionDescriptor, utils::capture_group_1};

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF:";

static ITAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/itag/(\d+)/").unwrap());

const AUDIO_CODEC_PREFIXES: &[&str] = &["mp4a", "opus", "ac-3", "ec-3", "flac", "vorbis"];

/// Expand `playlist` (fetched from `manifest_url`) into one live rendition per
/// `#EXT-X-STREAM-INF` variant, in playlist order.
///
/// Variants without a URI line, or whose URI does not resolve to an absolute
/// URL, are skipped.
pub fn expand_hls_manifest(playlist: &str, manifest_url: &str) -> Vec<RenditionDescriptor> {
    let base_url = Url::parse(manifest_url).ok();
    let lines: Vec<&str> = playlist.lines().map(str::trim).collect();
    let mut renditions = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(attr_list) = lines[i].strip_prefix(STREAM_INF_TAG) else {
            i += 1;
            continue;
        };

        // Skip tags and blanks up to the URI line
        let mut j = i + 1;
        while j < lines.len()
            && (lines[j].is_empty() || lines[j].starts_with('#'))
            && !lines[j].starts_with(STREAM_INF_TAG)
        {
            j += 1;
        }

        if j >= lines.len() || lines[j].starts_with(STREAM_INF_TAG) {
            warn!(line = i + 1, "HLS variant has no URI, skipping");
            i = j;
            continue;
        }

        match resolve_uri(base_url.as_ref(), lines[j]) {
            Some(uri) => renditions.push(variant_rendition(&parse_attribute_list(attr_list), uri)),
            None => warn!(uri = lines[j], "Unresolvable HLS variant URI, skipping"),
        }
        i = j + 1;
    }

    renditions
}

fn resolve_uri(base_url: Option<&Url>, uri: &str) -> Option<String> {
    if let Ok(url) = Url::parse(uri) {
        return Some(url.into());
    }
    base_url
        .and_then(|base| base.join(uri).ok())
        .map(String::from)
}

fn variant_rendition(attrs: &FxHashMap<String, String>, uri: String) -> RenditionDescriptor {
    let itag = capture_group_1(&ITAG_REGEX, &uri)
        .and_then(|itag| itag.parse().ok())
        .unwrap_or(0);

    let (width, height) = attrs
        .get("RESOLUTION")
        .and_then(|r| r.split_once('x'))
        .map(|(w, h)| (w.trim().parse().ok(), h.trim().parse().ok()))
        .unwrap_or((None, None));

    let fps = attrs
        .get("FRAME-RATE")
        .and_then(|r| r.parse::<f64>().ok())
        .filter(|r| r.is_finite() && *r >= 0.0)
        .map(|r| r.round() as u32)
        .unwrap_or(0);

    let bandwidth = attrs
        .get("BANDWIDTH")
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    RenditionDescriptor {
        itag,
        url: Some(uri),
        mime_type: attrs.get("CODECS").map(|c| mime_type_for_codecs(c)).unwrap_or_default(),
        bitrate: Some(bandwidth),
        width,
        height,
        fps: Some(fps),
        content_length: Some(bandwidth.to_string()),
        decoded: true,
        is_live: true,
        ..Default::default()
    }
}

/// `audio/mp4` when every listed codec is an audio codec, `video/mp4` otherwise.
fn mime_type_for_codecs(codecs: &str) -> String {
    let all_audio = codecs
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .all(|c| AUDIO_CODEC_PREFIXES.iter().any(|p| c.starts_with(p)));
    let container = if all_audio && !codecs.trim().is_empty() {
        "audio/mp4"
    } else {
        "video/mp4"
    };
    format!("{container}; codecs=\"{codecs}\"")
}

/// Split an attribute list on commas outside quotes. Quoted values are unquoted.
fn parse_attribute_list(list: &str) -> FxHashMap<String, String> {
    let mut attrs = FxHashMap::default();
    let mut start = 0;
    let mut in_quotes = false;

    for (idx, ch) in list.char_indices().chain(std::iter::once((list.len(), ','))) {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                if let Some((key, value)) = list[start..idx].split_once('=') {
                    let value = value.trim();
                    let value = value
                        .strip_prefix('"')
                        .and_then(|v| v.strip_suffix('"'))
                        .unwrap_or(value);
                    attrs.insert(key.trim().to_ascii_uppercase(), value.to_owned());
                }
                start = idx + 1;
            }
            _ => {}
        }
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_variant() {
        let playlist = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=831029,RESOLUTION=1280x720,FRAME-RATE=30,CODECS=\"avc1.4d401f\"\n\
            https://x.test/itag/96/file.m3u8\n";

        let renditions = expand_hls_manifest(playlist, "https://x.test/master.m3u8");
        assert_eq!(renditions.len(), 1);
        let r = &renditions[0];
        assert_eq!(r.itag, 96);
        assert_eq!(r.width, Some(1280));
        assert_eq!(r.height, Some(720));
        assert_eq!(r.fps, Some(30));
        assert_eq!(r.content_length.as_deref(), Some("831029"));
        assert_eq!(r.bitrate, Some(831029));
        assert_eq!(r.mime_type, "video/mp4; codecs=\"avc1.4d401f\"");
        assert!(r.decoded);
        assert!(r.is_live);
    }

    #[test]
    fn quoted_codecs_keep_commas() {
        let attrs = parse_attribute_list(r#"CODECS="avc1.4d401f,mp4a.40.2",BANDWIDTH=10"#);
        assert_eq!(attrs["CODECS"], "avc1.4d401f,mp4a.40.2");
        assert_eq!(attrs["BANDWIDTH"], "10");
    }

    #[test]
    fn audio_only_codecs() {
        assert_eq!(mime_type_for_codecs("mp4a.40.5"), "audio/mp4; codecs=\"mp4a.40.5\"");
        assert_eq!(
            mime_type_for_codecs("avc1.4d401f,mp4a.40.2"),
            "video/mp4; codecs=\"avc1.4d401f,mp4a.40.2\""
        );
    }

    #[test]
    fn defaults_and_relative_uris() {
        let playlist = "#EXTM3U\n\
            #EXT-X-STREAM-INF:RESOLUTION=256x144,FRAME-RATE=29.97\n\
            #EXT-X-SOMETHING\n\
            \n\
            variant/low.m3u8\n";

        let renditions = expand_hls_manifest(playlist, "https://x.test/hls/master.m3u8");
        assert_eq!(renditions.len(), 1);
        let r = &renditions[0];
        assert_eq!(r.url.as_deref(), Some("https://x.test/hls/variant/low.m3u8"));
        assert_eq!(r.itag, 0);
        assert_eq!(r.fps, Some(30));
        assert_eq!(r.content_length.as_deref(), Some("0"));
        assert_eq!(r.mime_type, "");
    }

    #[test]
    fn skips_incomplete_blocks() {
        let playlist = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=1\n\
            #EXT-X-STREAM-INF:BANDWIDTH=2\n\
            https://x.test/itag/91/a.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=3\n";

        let renditions = expand_hls_manifest(playlist, "https://x.test/master.m3u8");
        assert_eq!(renditions.len(), 1);
        assert_eq!(renditions[0].itag, 91);
        assert_eq!(renditions[0].bitrate, Some(2));
    }

    #[test]
    fn relative_uri_without_base_is_skipped() {
        let playlist = "#EXT-X-STREAM-INF:BANDWIDTH=1\nlow.m3u8\n";
        assert!(expand_hls_manifest(playlist, "not a url").is_empty());
    }
}

use regex::Regex;
use rustc_hash::FxHashMap;

const LIVE_BROADCAST_PATH: &str = "/yt_live_broadcast/";
const DASH_PATH: &str = "/dash/";
const HLS_PLAYLIST_PATH: &str = "/hls_playlist/";

/// URL of a live broadcast (a growing archive rather than a finished file).
#[inline]
pub fn is_live_content_url(url: &str) -> bool {
    url.contains(LIVE_BROADCAST_PATH)
}

#[inline]
pub fn is_dash_content_url(url: &str) -> bool {
    url.contains(DASH_PATH)
}

#[inline]
pub fn is_hls_content_url(url: &str) -> bool {
    url.contains(HLS_PLAYLIST_PATH)
}

#[inline]
pub fn is_audio_codec(mime_type: &str) -> bool {
    mime_type.starts_with("audio/")
}

#[inline]
pub fn is_video_codec(mime_type: &str) -> bool {
    mime_type.starts_with("video/")
}

/// Text between the first occurrence of `start` and the next `end` after it.
pub fn content_between<'a>(data: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = data.find(start)? + start.len();
    let rest = &data[from..];
    let to = rest.find(end)?;
    Some(&rest[..to])
}

#[inline]
pub fn capture_group_1<'a>(re: &Regex, input: &'a str) -> Option<&'a str> {
    re.captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Split `key=value&...` pairs and percent-decode each side into a map.
///
/// A literal `+` stays a `+`: signatures are base64-like and only ever
/// percent-encoded. Later duplicates win.
pub fn parse_query_string(data: &str) -> FxHashMap<String, String> {
    let data = data.replace('+', "%2B");
    url::form_urlencoded::parse(data.as_bytes())
        .into_owned()
        .collect()
}

//! In-memory cookie store shared between requests.
//!
//! Session bookkeeping proper belongs to the caller; the jar only turns what
//! it holds into a `Cookie` header and remembers `Set-Cookie` values seen on
//! responses the core itself makes.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Attributes that may follow the name/value pair in a `Set-Cookie` header.
const SET_COOKIE_ATTRIBUTES: &[&str] = &[
    "expires", "max-age", "secure", "httponly", "samesite", "path", "domain",
];

/// A cheaply clonable handle to a shared cookie map.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Arc<Mutex<FxHashMap<String, String>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a jar from a cookie string (format: "name1=value1; name2=value2").
    pub fn from_cookie_string(cookie_string: &str) -> Self {
        let jar = Self::new();
        jar.set_cookies_from_string(cookie_string);
        jar
    }

    pub fn add_cookie<N: Into<String>, V: Into<String>>(&self, name: N, value: V) {
        self.cookies.lock().insert(name.into(), value.into());
    }

    /// Merge cookies parsed from a cookie string.
    ///
    /// Accepts `;` separators from Cookie headers and `\n` from copy/paste.
    pub fn set_cookies_from_string(&self, cookie_string: &str) {
        let mut cookies = self.cookies.lock();
        for part in cookie_string.split(&[';', '\n'][..]).map(str::trim) {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            cookies.insert(name.to_owned(), value.to_owned());
        }
    }

    pub fn get_cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().get(name).cloned()
    }

    pub fn remove_cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().remove(name)
    }

    pub fn clear(&self) {
        self.cookies.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().is_empty()
    }

    /// Value for a `Cookie` request header, `None` when the jar is empty.
    pub fn cookie_header_value(&self) -> Option<String> {
        let cookies = self.cookies.lock();
        if cookies.is_empty() {
            return None;
        }

        let mut header = String::with_capacity(
            cookies
                .iter()
                .map(|(k, v)| k.len() + 1 + v.len() + 2)
                .sum(),
        );
        for (name, value) in cookies.iter() {
            if !header.is_empty() {
                header.push_str("; ");
            }
            header.push_str(name);
            header.push('=');
            header.push_str(value);
        }
        Some(header)
    }

    /// Insert the jar's `Cookie` header into `headers`, if any cookies are held.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let Some(value) = self.cookie_header_value() else {
            return;
        };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(reqwest::header::COOKIE, value);
            }
            Err(e) => {
                debug!(error = %e, "Failed to build Cookie header");
            }
        }
    }

    /// Store cookies from the `Set-Cookie` headers of a response.
    pub fn store_response_cookies(&self, headers: &HeaderMap) {
        let mut cookies = self.cookies.lock();
        for value in headers.get_all(SET_COOKIE).iter() {
            let Ok(cookie_str) = value.to_str() else {
                continue;
            };
            let Some((name, value)) = cookie_str
                .split(';')
                .next()
                .and_then(|pair| pair.split_once('='))
            else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty()
                || value.is_empty()
                || SET_COOKIE_ATTRIBUTES.contains(&name.to_ascii_lowercase().as_str())
            {
                continue;
            }
            debug!("Storing cookie: {}={}", name, value);
            cookies.insert(name.to_owned(), value.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cookie_string() {
        let jar = CookieJar::from_cookie_string("VISITOR_INFO1_LIVE=abc; PREF=hl=en\n ; =x; y=");
        assert_eq!(jar.get_cookie("VISITOR_INFO1_LIVE").as_deref(), Some("abc"));
        assert_eq!(jar.get_cookie("PREF").as_deref(), Some("hl=en"));
        assert_eq!(jar.get_cookie("y"), None);
    }

    #[test]
    fn stores_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("YSC=xyz; Path=/; Secure; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("GPS=1; Max-Age=1800"));

        let jar = CookieJar::new();
        jar.store_response_cookies(&headers);
        assert_eq!(jar.get_cookie("YSC").as_deref(), Some("xyz"));
        assert_eq!(jar.get_cookie("GPS").as_deref(), Some("1"));
        assert_eq!(jar.get_cookie("Path"), None);
    }

    #[test]
    fn clones_share_storage() {
        let jar = CookieJar::new();
        let other = jar.clone();
        other.add_cookie("a", "1");

        let mut headers = HeaderMap::new();
        jar.apply(&mut headers);
        assert_eq!(headers.get(reqwest::header::COOKIE).unwrap(), "a=1");
    }
}

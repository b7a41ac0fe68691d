use std::time::Duration;

use reqwest::{
    Client, RequestBuilder,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use tracing::{debug, info};

use crate::{
    cookies::CookieJar,
    error::Error,
    proxy::{ProxyConfig, build_proxy},
};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Options passed through to every HTTP request the crate makes.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// User agent string
    pub user_agent: String,

    /// Extra HTTP headers, merged over the defaults
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings when no explicit proxy is set
    pub use_system_proxy: bool,

    /// Overall timeout for a request, including reading the body.
    ///
    /// Leave unset for media downloads: a long transfer would otherwise be
    /// cut at the deadline.
    pub timeout: Option<Duration>,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Option<Duration>,

    /// Cookies sent as the `Cookie` header
    pub cookies: Option<CookieJar>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: RequestOptions::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
            timeout: None,
            connect_timeout: Some(Duration::from_secs(30)),
            cookies: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a header. Custom headers take precedence over defaults for the same field.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merge `headers` over the current set.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.use_system_proxy = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_cookies(mut self, cookies: CookieJar) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers
    }

    /// Create a reqwest `Client` carrying these options.
    pub fn build_client(&self) -> Result<Client, Error> {
        let mut client_builder = Client::builder()
            .pool_max_idle_per_host(5)
            .user_agent(&self.user_agent)
            .default_headers(self.headers.clone());

        if let Some(timeout) = self.timeout.filter(|t| !t.is_zero()) {
            client_builder = client_builder.timeout(timeout);
        }

        if let Some(timeout) = self.connect_timeout.filter(|t| !t.is_zero()) {
            client_builder = client_builder.connect_timeout(timeout);
        }

        if let Some(proxy_config) = &self.proxy {
            // Explicit proxy configuration takes precedence
            client_builder = client_builder.proxy(build_proxy(proxy_config)?);
            info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy");
        } else if !self.use_system_proxy {
            client_builder = client_builder.no_proxy();
            debug!("Proxy disabled");
        }

        client_builder.build().map_err(Error::from)
    }

    /// Attach per-request state (the current cookies) to a request.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let Some(cookies) = &self.cookies else {
            return request;
        };
        let mut headers = HeaderMap::new();
        cookies.apply(&mut headers);
        request.headers(headers)
    }
}

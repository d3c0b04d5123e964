use crate::http_client::{HttpClient, HyperHttpClient};
use std::{sync::Arc, time::Duration};

pub const DEFAULT_PROTOCOL_MARKER: &str = "ws/rest";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_ATTEMPTS: u32 = 20;
const DEFAULT_SNIPPET_CAP: usize = 1000;

/// Request names starting with one of these are utility/setup entries and
/// are excluded from comparison entirely.
const UTILITY_PREFIXES: [&str; 2] = ["_", "["];

/// How the mirrored request authenticates against the candidate backend.
/// Anything other than `Same` replaces whatever authorization header was
/// copied from the reference request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOverride {
    Same,
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { header: String, key: String },
}

/// Settings for one batch run. Built once, read-only afterwards.
#[derive(Debug)]
pub struct BatchConfiguration {
    source_base_url: String,
    target_base_url: String,
    protocol_marker: String,
    auth_override: AuthOverride,
    exempted_fields: Vec<String>,
    poll_interval: Duration,
    max_attempts: u32,
    snippet_cap: usize,
    skip_payload_logging: bool,
    preserved_keys: Vec<String>,
    http_client: Option<Arc<dyn HttpClient + Send + Sync>>,
}

impl BatchConfiguration {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        source_base_url: S1,
        target_base_url: S2,
    ) -> Self {
        Self {
            source_base_url: source_base_url.into(),
            target_base_url: target_base_url.into(),
            protocol_marker: String::from(DEFAULT_PROTOCOL_MARKER),
            auth_override: AuthOverride::Same,
            exempted_fields: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            snippet_cap: DEFAULT_SNIPPET_CAP,
            skip_payload_logging: false,
            preserved_keys: Vec::new(),
            http_client: None,
        }
    }

    pub fn source_base_url(&self) -> &str {
        &self.source_base_url
    }

    pub fn target_base_url(&self) -> &str {
        &self.target_base_url
    }

    /// The shared, protocol-identifying path segment that survives URL
    /// rewriting while the source-specific routing prefix before it is
    /// dropped.
    pub fn set_protocol_marker<S: Into<String>>(&mut self, marker: S) {
        self.protocol_marker = marker.into();
    }

    pub fn protocol_marker(&self) -> &str {
        &self.protocol_marker
    }

    pub fn set_auth_override(&mut self, auth_override: AuthOverride) {
        self.auth_override = auth_override;
    }

    pub fn auth_override(&self) -> &AuthOverride {
        &self.auth_override
    }

    pub fn set_exempted_fields<S: Into<String>, I: IntoIterator<Item = S>>(&mut self, fields: I) {
        self.exempted_fields = fields.into_iter().map(Into::into).collect();
    }

    pub fn exempted_fields(&self) -> &[String] {
        &self.exempted_fields
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn set_max_attempts(&mut self, attempts: u32) {
        self.max_attempts = attempts;
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Ceiling for the bounded reference wait: interval times attempt count
    /// (10 seconds with the defaults).
    pub fn wait_bound(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }

    pub fn set_snippet_cap(&mut self, cap: usize) {
        self.snippet_cap = cap;
    }

    pub fn snippet_cap(&self) -> usize {
        self.snippet_cap
    }

    pub fn set_skip_payload_logging(&mut self, value: bool) {
        self.skip_payload_logging = value;
    }

    pub fn skip_payload_logging(&self) -> bool {
        self.skip_payload_logging
    }

    /// Keys in the run store that survive `RunContext::reset`, typically the
    /// base URLs, credentials and exemption list shared across runs.
    pub fn set_preserved_keys<S: Into<String>, I: IntoIterator<Item = S>>(&mut self, keys: I) {
        self.preserved_keys = keys.into_iter().map(Into::into).collect();
    }

    pub fn preserved_keys(&self) -> &[String] {
        &self.preserved_keys
    }

    pub fn set_http_client(&mut self, http_client: Arc<dyn HttpClient + Send + Sync>) {
        self.http_client = Some(http_client);
    }

    pub fn http_client(&self) -> Arc<dyn HttpClient + Send + Sync> {
        self.http_client
            .clone()
            .unwrap_or_else(|| Arc::new(HyperHttpClient::new()))
    }

    pub fn is_utility_request(&self, name: &str) -> bool {
        UTILITY_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
    }
}

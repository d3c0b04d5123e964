//! Builds the candidate-backend twin of a reference-backend request.
//!
//! The URL is rewritten by stripping the source base, dropping the
//! source-specific routing segment in front of the protocol marker, and
//! appending the remainder to the target base. The query string is
//! preserved verbatim.

use crate::{
    config::{AuthOverride, BatchConfiguration},
    data::{MirroredRequest, OutboundRequest, RequestBody},
    error::Error,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

/// Hop-by-hop and script-host headers never copied onto the mirrored
/// request.
const EXCLUDED_HEADERS: [&str; 5] = [
    "host",
    "content-length",
    "connection",
    "user-agent",
    "postman-token",
];

#[derive(Debug)]
pub struct RequestMirror {
    source_base: String,
    target_base: String,
    protocol_marker: String,
    routing_prefix: Regex,
    auth_override: AuthOverride,
}

impl RequestMirror {
    pub fn from_config(config: &BatchConfiguration) -> Result<Self, Error> {
        let marker = config.protocol_marker().trim_matches('/').to_string();
        let routing_prefix = Regex::new(&format!("/[^/]+/{}/", regex::escape(&marker)))
            .map_err(|e| Error::Transform(format!("invalid protocol marker: {}", e)))?;

        Ok(Self {
            source_base: config.source_base_url().to_string(),
            target_base: config.target_base_url().to_string(),
            protocol_marker: marker,
            routing_prefix,
            auth_override: config.auth_override().clone(),
        })
    }

    /// Produces the equivalent candidate-backend request. Fails with
    /// `Error::Transform` when the source base cannot be found in the URL;
    /// the caller must then abort this request's comparison without issuing
    /// a call to either backend.
    pub fn mirror(&self, request: &OutboundRequest) -> Result<MirroredRequest, Error> {
        let url = self.rewrite_url(&request.url)?;
        let mut headers = self.copy_headers(request);

        let body = match request.method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => RequestBody::None,
            _ => request.enabled_body(),
        };

        if !contains_header(&headers, "content-type") {
            let inferred = match &body {
                RequestBody::Raw(text) => infer_content_type(text),
                RequestBody::StructuredQuery { .. } => Some("application/json"),
                _ => None,
            };
            if let Some(content_type) = inferred {
                headers.insert(String::from("Content-Type"), String::from(content_type));
            }
        }

        debug!(method = %request.method, url = %url, "mirrored request built");

        Ok(MirroredRequest {
            method: request.method.clone(),
            url,
            headers,
            body,
        })
    }

    fn rewrite_url(&self, url: &str) -> Result<String, Error> {
        let base_index = url.find(&self.source_base).ok_or_else(|| {
            Error::Transform(format!(
                "source base '{}' not found in url '{}'",
                self.source_base, url
            ))
        })?;

        let remainder = &url[base_index + self.source_base.len()..];
        let remainder = self
            .routing_prefix
            .replace(remainder, format!("/{}/", self.protocol_marker).as_str());

        Ok(format!("{}{}", self.target_base, remainder))
    }

    fn copy_headers(&self, request: &OutboundRequest) -> IndexMap<String, String> {
        let mut copied: IndexMap<String, String> = request
            .headers
            .iter()
            .filter(|(key, _)| {
                !request.is_header_disabled(key)
                    && !EXCLUDED_HEADERS
                        .iter()
                        .any(|excluded| key.eq_ignore_ascii_case(excluded))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        // Explicit configuration wins over whatever was copied.
        match &self.auth_override {
            AuthOverride::Same => {}
            AuthOverride::Basic { username, password } => {
                remove_header(&mut copied, "authorization");
                copied.insert(
                    String::from("Authorization"),
                    format!(
                        "Basic {}",
                        STANDARD.encode(format!("{}:{}", username, password))
                    ),
                );
            }
            AuthOverride::Bearer { token } => {
                remove_header(&mut copied, "authorization");
                copied.insert(String::from("Authorization"), format!("Bearer {}", token));
            }
            AuthOverride::ApiKey { header, key } => {
                remove_header(&mut copied, "authorization");
                remove_header(&mut copied, header);
                copied.insert(header.clone(), key.clone());
            }
        }

        copied
    }
}

fn contains_header(headers: &IndexMap<String, String>, name: &str) -> bool {
    headers.keys().any(|key| key.eq_ignore_ascii_case(name))
}

fn remove_header(headers: &mut IndexMap<String, String>, name: &str) {
    let keys: Vec<String> = headers
        .keys()
        .filter(|key| key.eq_ignore_ascii_case(name))
        .cloned()
        .collect();

    for key in keys {
        headers.shift_remove(&key);
    }
}

fn infer_content_type(raw_body: &str) -> Option<&'static str> {
    match raw_body.trim_start().chars().next() {
        Some('{') | Some('[') => Some("application/json"),
        Some('<') => Some("application/xml"),
        _ => None,
    }
}

fn escape_single_quotes(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Renders a curl-style reproduction of the mirrored call for the report.
pub fn replay_command(request: &MirroredRequest) -> String {
    let mut command = format!("curl --location '{}'", request.url);

    if request.method != "GET" {
        command.push_str(&format!(" \\\n--request {}", request.method));
    }

    for (key, value) in &request.headers {
        command.push_str(&format!(
            " \\\n--header '{}: {}'",
            key,
            escape_single_quotes(value)
        ));
    }

    let data = match &request.body {
        RequestBody::Raw(text) => Some(text.clone()),
        RequestBody::StructuredQuery { query, variables } => {
            Some(RequestBody::render_structured_query(query, variables))
        }
        _ => None,
    };

    if let Some(text) = data {
        let escaped = escape_single_quotes(&text.replace('\\', "\\\\"));
        command.push_str(&format!(" \\\n--data-raw '{}'", escaped));
    }

    command
}

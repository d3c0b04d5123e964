use crate::{
    data::{MirroredRequest, RequestBody},
    error::Error,
};
use async_trait::async_trait;
use hyper::{
    body,
    header::{HeaderName, HeaderValue},
    Body, HeaderMap, Request,
};
use hyper_tls::HttpsConnector;
use indexmap::IndexMap;
use std::{fmt::Debug, time::Duration};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status_code: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpClient: Debug {
    async fn make_request(&self, request: &MirroredRequest) -> Result<HttpReply, Error>;
}

#[derive(Debug)]
pub struct HyperHttpClient {
    timeout: Duration,
}

impl HyperHttpClient {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn encode_form(fields: &IndexMap<String, String>) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());

        for (key, value) in fields {
            serializer.append_pair(key, value);
        }

        serializer.finish()
    }
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn make_request(&self, request_data: &MirroredRequest) -> Result<HttpReply, Error> {
        let mut request_builder = Request::builder()
            .uri(request_data.url.as_str())
            .method(request_data.method.as_str());

        if let Some(headers_mut) = request_builder.headers_mut() {
            put_headers(
                headers_mut,
                request_data
                    .headers
                    .iter()
                    .filter(|(header_name, _)| !header_name.eq_ignore_ascii_case("host")),
            )?;

            let body_content_type = match &request_data.body {
                RequestBody::FormData(_) | RequestBody::UrlEncoded(_)
                    if request_data.header("content-type").is_none() =>
                {
                    Some("application/x-www-form-urlencoded")
                }
                RequestBody::StructuredQuery { .. }
                    if request_data.header("content-type").is_none() =>
                {
                    Some("application/json")
                }
                _ => None,
            };

            if let Some(content_type) = body_content_type {
                headers_mut.append(
                    HeaderName::from_static("content-type"),
                    HeaderValue::from_static(content_type),
                );
            }
        }

        let body = match &request_data.body {
            RequestBody::None => Body::empty(),
            RequestBody::Raw(text) => Body::from(text.clone()),
            RequestBody::FormData(fields) | RequestBody::UrlEncoded(fields) => {
                Body::from(Self::encode_form(fields))
            }
            RequestBody::StructuredQuery { query, variables } => {
                Body::from(RequestBody::render_structured_query(query, variables))
            }
        };

        let request: Request<Body> = request_builder.body(body)?;

        let client = hyper::Client::builder().build(HttpsConnector::new());

        let response = tokio::time::timeout(self.timeout, client.request(request))
            .await
            .map_err(|_| Error::RequestTimeout)??;

        let status_code = response.status().as_u16();
        let body = body::to_bytes(response.into_body()).await?;
        let body: String = String::from_utf8_lossy(&body).into();

        Ok(HttpReply { status_code, body })
    }
}

impl Default for HyperHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn put_headers<'a, I: IntoIterator<Item = (&'a String, &'a String)>>(
    header_map: &mut HeaderMap<HeaderValue>,
    headers: I,
) -> Result<(), Error> {
    for (key, value) in headers {
        let header_name = HeaderName::from_lowercase(key.to_lowercase().as_bytes())?;
        let header_value = HeaderValue::from_str(value)?;
        header_map.append(header_name, header_value);
    }

    Ok(())
}

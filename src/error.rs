use hyper::http;
use std::fmt::Display;

#[derive(Debug)]
pub enum Error {
    Transform(String),
    RequestTimeout,
    InvalidHeaderName,
    InvalidHeaderValue,
    InvalidBody,
    HyperError(hyper::Error),
    HttpError(http::Error),
    EntryEncoding(serde_json::Error),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transform(message) => write!(f, "Request transform failed: {}", message),
            Error::RequestTimeout => write!(f, "The request did not complete within the timeout"),
            Error::InvalidHeaderName => write!(f, "Invalid header name"),
            Error::InvalidHeaderValue => write!(f, "Invalid header value"),
            Error::InvalidBody => write!(f, "Invalid body"),
            Error::HyperError(e) => write!(f, "Hyper error: {}", e),
            Error::HttpError(e) => write!(f, "Http Error: {}", e),
            Error::EntryEncoding(e) => write!(f, "Report entry encoding error: {}", e),
        }
    }
}

impl From<hyper::header::InvalidHeaderName> for Error {
    fn from(_: hyper::header::InvalidHeaderName) -> Self {
        Error::InvalidHeaderName
    }
}

impl From<hyper::header::InvalidHeaderValue> for Error {
    fn from(_: hyper::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeaderValue
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Self {
        Error::HyperError(e)
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Error::HttpError(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::EntryEncoding(e)
    }
}

//! # Metrics module
//!
//! This module renders the registered prometheus metrics in the text
//! exposition format

use hyper::{
    header::{self, HeaderValue, InvalidHeaderValue},
    Body, Response, StatusCode,
};
use prometheus::{gather, Encoder, TextEncoder};

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to encode metrics, {0}")]
    Encode(prometheus::Error),
    #[error("failed to parse content type given by prometheus, {0}")]
    ContentType(InvalidHeaderValue),
}

// -----------------------------------------------------------------------------
// Helper methods

/// returns the metrics gathered from the default registry
pub fn handler() -> Result<Response<Body>, Error> {
    let encoder = TextEncoder::new();
    let mut buf = vec![];
    encoder
        .encode(&gather(), &mut buf)
        .map_err(Error::Encode)?;

    let mut res = Response::new(Body::from(buf));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(encoder.format_type()).map_err(Error::ContentType)?,
    );

    *res.status_mut() = StatusCode::OK;
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_text_encoded() {
        let res = handler().unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}

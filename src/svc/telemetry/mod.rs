//! # Telemetry module
//!
//! This module expose the health and metrics endpoints of the operator
//! through a small http server

use std::{collections::BTreeMap, convert::Infallible, net::SocketAddr, time::Instant};

use hyper::{
    header::{self, HeaderValue},
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use tracing::info;

#[cfg(feature = "metrics")]
pub mod metrics;

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static SERVER_REQUEST_SUCCESS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "ords_operator_server_request_success",
            "number of successful request handled by the server",
        ),
        &["method", "path", "status"]
    )
    .expect("metrics 'ords_operator_server_request_success' to not be already registered")
});

#[cfg(feature = "metrics")]
static SERVER_REQUEST_FAILURE: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "ords_operator_server_request_failure",
            "number of failed request handled by the server",
        ),
        &["method", "path", "status"]
    )
    .expect("metrics 'ords_operator_server_request_failure' to not be already registered")
});

#[cfg(feature = "metrics")]
static SERVER_REQUEST_DURATION: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "ords_operator_server_request_duration",
            "duration of request handled by the server",
        ),
        &["method", "path", "status", "unit"]
    )
    .expect("metrics 'ords_operator_server_request_duration' to not be already registered")
});

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "metrics")]
    #[error("{0}")]
    Metrics(metrics::Error),
    #[error("failed to bind server on '{0}', {1}")]
    Bind(SocketAddr, hyper::Error),
    #[error("failed to serve requests, {0}")]
    Serve(hyper::Error),
}

// -----------------------------------------------------------------------------
// Helper methods

/// listen on the given address and serve requests until the future is
/// dropped
pub async fn serve(addr: SocketAddr) -> Result<(), Error> {
    let server = Server::try_bind(&addr)
        .map_err(|err| Error::Bind(addr, err))?
        .serve(make_service_fn(|_conn| async {
            Ok::<_, Infallible>(service_fn(router))
        }));

    info!(
        listen = addr.to_string(),
        "Start to listen for http requests",
    );

    server.await.map_err(Error::Serve)
}

fn record(req: &Request<Body>, res: &Response<Body>, duration: u128, success: bool) {
    info!(
        method = req.method().as_str(),
        path = req.uri().path(),
        status = res.status().as_u16(),
        duration = duration,
        "Receive request"
    );

    #[cfg(feature = "metrics")]
    {
        let status = res.status().as_u16().to_string();
        let labels = [req.method().as_str(), req.uri().path(), status.as_str()];
        if success {
            SERVER_REQUEST_SUCCESS.with_label_values(&labels).inc();
        } else {
            SERVER_REQUEST_FAILURE.with_label_values(&labels).inc();
        }

        SERVER_REQUEST_DURATION
            .with_label_values(&[labels[0], labels[1], labels[2], "us"])
            .inc_by(duration as f64);
    }

    #[cfg(not(feature = "metrics"))]
    let _ = success;
}

/// dispatch the request, a failing handler is answered with its error as a
/// json document
pub async fn router(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let begin = Instant::now();

    let result = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => Ok(healthz()),
        #[cfg(feature = "metrics")]
        (&Method::GET, "/metrics") => metrics::handler().map_err(Error::Metrics),
        _ => Ok(not_found()),
    };

    let duration = Instant::now().duration_since(begin).as_micros();
    let res = match result {
        Ok(res) => {
            record(&req, &res, duration, true);
            res
        }
        Err(err) => {
            let map = BTreeMap::from([("error".to_string(), err.to_string())]);
            let mut res = Response::new(Body::from(
                serde_json::to_string_pretty(&map).unwrap_or_default(),
            ));

            res.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );

            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            record(&req, &res, duration, false);
            res
        }
    };

    Ok(res)
}

pub fn healthz() -> Response<Body> {
    let mut res = Response::default();
    *res.status_mut() = StatusCode::NO_CONTENT;
    res
}

pub fn not_found() -> Response<Body> {
    let mut res = Response::default();
    *res.status_mut() = StatusCode::NOT_FOUND;
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_has_no_content() {
        let res = router(get("/healthz")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let res = router(get("/unknown")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = router(
            Request::builder()
                .method(Method::POST)
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn metrics_are_served() {
        let res = router(get("/metrics")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

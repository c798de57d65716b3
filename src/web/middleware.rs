//! Request logging middleware
//!
//! Logs method, path, status, latency and client address of every request.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    response::Response,
};
use futures::future::BoxFuture;
use std::{
    net::SocketAddr,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};

/// Get the real client IP address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
fn get_real_ip(headers: &HeaderMap, fallback_ip: &str) -> String {
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    // May contain a chain of IPs, the first is the original client
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    fallback_ip.to_string()
}

/// Layer for HTTP request logging
#[derive(Clone, Default)]
pub struct RequestLoggingLayer;

impl RequestLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingMiddleware { inner }
    }
}

/// Middleware service for HTTP request logging
#[derive(Clone)]
pub struct RequestLoggingMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestLoggingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let fallback_ip = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let ip = get_real_ip(request.headers(), &fallback_ip);
            let started = Instant::now();

            let response = inner.call(request).await?;

            let status = response.status();
            let elapsed_ms = started.elapsed().as_millis();
            if status.is_server_error() {
                tracing::warn!("{} {} -> {} in {}ms from {}", method, path, status, elapsed_ms, ip);
            } else {
                tracing::info!("{} {} -> {} in {}ms from {}", method, path, status, elapsed_ms, ip);
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_headers_take_priority() {
        let mut headers = HeaderMap::new();
        assert_eq!(get_real_ip(&headers, "10.0.0.1"), "10.0.0.1");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.2".parse().unwrap());
        assert_eq!(get_real_ip(&headers, "10.0.0.1"), "203.0.113.7");

        headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(get_real_ip(&headers, "10.0.0.1"), "198.51.100.4");
    }
}

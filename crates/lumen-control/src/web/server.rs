//! Axum HTTP server

use axum::http::{header, HeaderValue};
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use lumen_core::{BroadcastBuffer, Director, ShowDefaults};

use super::routes::build_router;
use crate::govee::GoveeLan;
use crate::{error::ControlError, Result};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub director: Arc<Director>,
    pub buffer: Arc<BroadcastBuffer>,
    /// LAN light discovery; `None` lists no devices
    pub govee: Option<Arc<GoveeLan>>,
    pub defaults: ShowDefaults,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
    /// Host the speaker should fetch the stream from; detected when unset
    pub advertised_host: Option<String>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            // Speakers on the LAN have to reach the stream
            host: "0.0.0.0".to_string(),
            port: 8080,
            advertised_host: None,
        }
    }
}

impl WebServerConfig {
    /// Create a new web server config
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the host address
    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    /// Set the host advertised in the stream URL
    pub fn with_advertised_host(mut self, host: String) -> Self {
        self.advertised_host = Some(host);
        self
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ControlError::HttpError(format!("Invalid address: {}", e)))
    }

    /// URL a speaker on the LAN can fetch the stream from
    pub fn stream_url(&self) -> String {
        let host = match &self.advertised_host {
            Some(host) => host.clone(),
            None => match self.host.parse::<IpAddr>() {
                Ok(ip) if !ip.is_unspecified() => ip.to_string(),
                Ok(_) => local_ip().map_or_else(|| "127.0.0.1".to_string(), |ip| ip.to_string()),
                Err(_) => self.host.clone(),
            },
        };
        format!("http://{}:{}/stream.wav", host, self.port)
    }
}

/// Address of the interface that routes to the LAN.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Router with every route, middleware and state applied
pub fn app(state: AppState) -> Router {
    build_router()
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// Web server for the REST API and the audio stream
pub struct WebServer {
    config: WebServerConfig,
    state: AppState,
}

impl WebServer {
    /// Create a new web server
    pub fn new(config: WebServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Run the web server until the task is dropped or aborted
    pub async fn run(self) -> Result<()> {
        let addr = self.config.bind_addr()?;
        let app = app(self.state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ControlError::HttpError(format!("Failed to bind {}: {}", addr, e)))?;
        tracing::info!(
            "Web server listening on {} (stream at {})",
            addr,
            self.config.stream_url()
        );

        axum::serve(listener, app.into_make_service())
            .await
            .map_err(|e| ControlError::HttpError(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Spawn the server in a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Security headers middleware
async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Prevent MIME sniffing
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    // Prevent clickjacking
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_server_config() {
        let config = WebServerConfig::new(9000).with_host("127.0.0.1".to_string());
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.bind_addr().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_bind_address() {
        let config = WebServerConfig::new(8080).with_host("not a host".to_string());
        assert!(matches!(
            config.bind_addr(),
            Err(ControlError::HttpError(_))
        ));
    }

    #[test]
    fn test_stream_url() {
        let config = WebServerConfig::new(8080).with_advertised_host("10.0.0.74".to_string());
        assert_eq!(config.stream_url(), "http://10.0.0.74:8080/stream.wav");

        let config = WebServerConfig::new(8081).with_host("192.168.1.5".to_string());
        assert_eq!(config.stream_url(), "http://192.168.1.5:8081/stream.wav");

        // Unspecified bind address falls back to a routable local address
        let url = WebServerConfig::default().stream_url();
        assert!(url.starts_with("http://"));
        assert!(!url.contains("0.0.0.0"));
    }

    #[tokio::test]
    async fn test_security_headers() {
        use axum::body::Body;
        use tower::Service; // for call

        let mut app = axum::Router::new()
            .route("/", axum::routing::get(|| async { "Hello" }))
            .layer(middleware::from_fn(security_headers));

        let response = app
            .call(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers
                .get("X-Content-Type-Options")
                .and_then(|h| h.to_str().ok()),
            Some("nosniff")
        );
        assert_eq!(
            headers.get("X-Frame-Options").and_then(|h| h.to_str().ok()),
            Some("DENY")
        );
        assert_eq!(
            headers.get("Referrer-Policy").and_then(|h| h.to_str().ok()),
            Some("no-referrer")
        );
    }
}

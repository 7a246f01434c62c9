//! HTTP surface: the WAV stream for the speaker and the light-show REST API

pub mod handlers;
pub mod routes;
pub mod server;
pub mod stream;

pub use handlers::ApiResponse;
pub use server::{app, AppState, WebServer, WebServerConfig};

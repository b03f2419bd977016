//! # Claude Gateway
//!
//! HTTP front end for [`claude_gateway_core`]: runs the `claude` CLI agent on
//! request and streams its stream-json output back as Server-Sent Events.
//!
//! *   `POST /chat` starts an invocation. The response is an SSE stream of
//!     `message` events (one per agent line) ending in `done`, `error` or
//!     `cancelled`; the `X-Process-ID` header names the invocation.
//! *   `DELETE /chat/{process_id}` cancels it.
//! *   `GET /processes` lists what is running.
//! *   `GET /health` reports the agent binary and its version.
//!
//! Everything except `/`, `/docs` and `/health` requires HTTP Basic auth.
//!
//! ## Example
//!
//! ```rust,no_run
//! use claude_gateway::{AgentBinary, Credentials, ServerConfig, start_server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let agent = AgentBinary::detect(None).await?;
//!     start_server(ServerConfig {
//!         bind_addr: "127.0.0.1:9876".into(),
//!         credentials: Credentials::new("admin", "change-me"),
//!         agent,
//!         max_line_bytes: 100 * 1024 * 1024,
//!     })
//!     .await
//! }
//! ```

pub mod auth;
pub mod binary;
pub mod bridge;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;

pub use auth::Credentials;
pub use binary::AgentBinary;
pub use bridge::{AppState, ServerConfig, build_router, start_server};
pub use config::Settings;
pub use error::{ApiError, ConfigError};

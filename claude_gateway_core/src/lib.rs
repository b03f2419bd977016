//! # Claude Gateway Core
//!
//! Process supervision for the `claude` CLI agent: each invocation becomes one
//! child process whose stream-json stdout is handed back line by line.
//!
//! *   **[`command`]**: turns an [`InvocationRequest`] into the agent's argument vector.
//! *   **[`runner`]**: spawns the process, and terminates it with SIGTERM then SIGKILL.
//! *   **[`registry`]**: the table of in-flight invocations, keyed by a UUID.
//! *   **[`stream`]**: pumps output to the consumer and cleans up however it ends.
//!
//! ## Example
//!
//! ```rust,no_run
//! use claude_gateway_core::{Gateway, GatewayConfig, InvocationRequest, OutputEvent};
//! use futures::StreamExt;
//!
//! # async fn run() -> claude_gateway_core::Result<()> {
//! let gateway = Gateway::new(GatewayConfig::new("/usr/local/bin/claude"));
//! let request = InvocationRequest::new("Summarise README.md", "/srv/project");
//!
//! let (id, mut output) = gateway.start_invocation(&request).await?;
//! while let Some(event) = output.next().await {
//!     match event {
//!         OutputEvent::Line(line) => println!("{line}"),
//!         other => println!("{id} ended: {other:?}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod registry;
pub mod request;
pub mod runner;
pub mod stream;

pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayConfig};
pub use lifecycle::InvocationState;
pub use registry::{InvocationInfo, ProcessRegistry};
pub use request::{DebugMode, InvocationRequest};
pub use stream::{OutputEvent, OutputStream};

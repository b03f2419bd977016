//! The three boundary operations: start, cancel, list.

use crate::codec::DEFAULT_MAX_LINE_BYTES;
use crate::command;
use crate::error::Result;
use crate::registry::{InvocationInfo, ProcessRegistry};
use crate::request::InvocationRequest;
use crate::runner::{self, DEFAULT_GRACE_PERIOD};
use crate::stream::{OutputStream, StreamAdapter};
use std::{path::PathBuf, time::Duration};
use tracing::{error, info};

/// Lines buffered between the agent and a slow consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for a [`Gateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Absolute path of the agent executable.
    pub agent_path: PathBuf,
    /// Longest accepted stdout line.
    pub max_line_bytes: usize,
    /// SIGTERM-to-SIGKILL grace period.
    pub termination_grace: Duration,
    pub channel_capacity: usize,
}

impl GatewayConfig {
    pub fn new(agent_path: impl Into<PathBuf>) -> Self {
        Self {
            agent_path: agent_path.into(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            termination_grace: DEFAULT_GRACE_PERIOD,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Supervises agent invocations. Cheap to clone; clones share one registry.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: GatewayConfig,
    registry: ProcessRegistry,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let registry = ProcessRegistry::new(config.termination_grace);
        Self { config, registry }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Launch the agent for `request` and return its id plus the output stream.
    ///
    /// The id is already registered when this returns. If the launch fails the
    /// entry is removed again and nothing is left running.
    pub async fn start_invocation(
        &self,
        request: &InvocationRequest,
    ) -> Result<(String, OutputStream)> {
        let registration = self.registry.register(request);
        let id = registration.id.clone();

        let args = command::build_args(request);
        info!(
            process_id = %id,
            cwd = %request.cwd.display(),
            "Starting agent: {} {}",
            self.config.agent_path.display(),
            command::redacted(&args)
        );

        let (process, lines) = match runner::spawn(
            &self.config.agent_path,
            &args,
            &request.cwd,
            self.config.max_line_bytes,
        ) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(process_id = %id, "Failed to start agent: {}", e);
                registration.lifecycle.mark_terminated();
                self.registry.remove(&id);
                return Err(e);
            }
        };

        let _ = registration.lifecycle.mark_running(process.pid());

        let adapter = StreamAdapter {
            id: id.clone(),
            registry: self.registry.clone(),
            lifecycle: registration.lifecycle,
            cancel_token: registration.cancel_token,
            grace_period: self.config.termination_grace,
        };
        let output = adapter.spawn(process, lines, self.config.channel_capacity);
        Ok((id, output))
    }

    /// See [`ProcessRegistry::cancel`].
    pub async fn cancel_invocation(&self, id: &str) -> bool {
        self.registry.cancel(id).await
    }

    pub fn list_invocations(&self) -> Vec<InvocationInfo> {
        self.registry.list()
    }

    /// Cancel every live invocation and wait for them to be reaped.
    pub async fn shutdown(&self) -> usize {
        let count = self.registry.cancel_all().await;
        if count > 0 {
            info!(count, "Cancelled running invocations on shutdown");
        }
        count
    }
}

//! Client configuration.

use std::time::Duration;

use parley_core::{ConnectionConfig, ReconcilerConfig};

/// Default period of the runtime timer.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default limit on one HTTP call before it counts as failed.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the command and transport-event queues.
pub const DEFAULT_COMMAND_BUFFER: usize = 64;

/// Runtime loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How often timers (keep-alive, reconnect) are polled
    pub tick_interval: Duration,
    /// Capacity of the command and transport-event queues
    pub command_buffer: usize,
    /// Limit on each history, room list, member list and send call
    pub request_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Everything needed to start a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint, keep-alive and reconnect
    pub connection: ConnectionConfig,
    /// History paging
    pub reconciler: ReconcilerConfig,
    /// Event loop
    pub runtime: RuntimeConfig,
}

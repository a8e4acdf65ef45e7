use std::time::Duration;

use cadence_common::agenda::Agenda;

/// What to do with outbound frames while the transport is between
/// connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// Buffer frames and flush them once reconnected.
    Queue,
    /// Fail the send immediately with `ClientError::Reconnecting`.
    Reject,
}

/// Caller-supplied client configuration. Built with plain setters rather
/// than environment variables: the client is a library embedded in a host
/// application, which owns its own configuration surface.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base of the hub, e.g. `http://127.0.0.1:4040`.
    pub hub_url: String,
    /// Local timer tick cadence.
    pub tick_interval: Duration,
    /// First reconnect delay; doubles on each failed attempt.
    pub backoff_min: Duration,
    /// Ceiling for the reconnect delay.
    pub backoff_max: Duration,
    /// Reconnect attempts before the transport gives up and reports Gone.
    pub max_reconnect_attempts: u32,
    pub send_policy: SendPolicy,
    /// Agenda for this meeting type; drives the advisory pace indicator.
    pub agenda: Agenda,
}

impl ClientConfig {
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            tick_interval: Duration::from_secs(1),
            backoff_min: Duration::from_millis(250),
            backoff_max: Duration::from_secs(8),
            max_reconnect_attempts: 10,
            send_policy: SendPolicy::Queue,
            agenda: Agenda::default(),
        }
    }

    pub fn agenda(mut self, agenda: Agenda) -> Self {
        self.agenda = agenda;
        self
    }

    pub fn send_policy(mut self, policy: SendPolicy) -> Self {
        self.send_policy = policy;
        self
    }

    pub fn backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// WebSocket URL of the gateway, derived from `hub_url`.
    pub fn gateway_url(&self) -> String {
        let ws_base = if let Some(rest) = self.hub_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.hub_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.hub_url.clone()
        };
        format!("{}/gateway", ws_base.trim_end_matches('/'))
    }

    /// REST base of the hub's versioned API.
    pub fn api_url(&self) -> String {
        format!("{}/api/v1", self.hub_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_url_swaps_scheme() {
        let config = ClientConfig::new("http://127.0.0.1:4040");
        assert_eq!(config.gateway_url(), "ws://127.0.0.1:4040/gateway");
        assert_eq!(config.api_url(), "http://127.0.0.1:4040/api/v1");

        let config = ClientConfig::new("https://hub.example.com/");
        assert_eq!(config.gateway_url(), "wss://hub.example.com/gateway");
    }
}

//! Worker configuration that the client, the worker and the CLI share.

use serde::{Deserialize, Serialize};

/// How commands travel from the client proxies to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Commands (and their buffers) move into the worker without copying.
    #[default]
    Shared,
    /// Every command is encoded to JSON and decoded again inside the worker.
    Serialized,
}

impl Transport {
    pub fn parse(s: &str) -> Option<Transport> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Some(Transport::Shared),
            "serialized" => Some(Transport::Serialized),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Interval between engine polls for changed contexts.
    pub poll_interval_ms: u64,

    pub transport: Transport,

    /// Name given to the OS thread hosting the worker.
    pub worker_thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            transport: Transport::Shared,
            worker_thread_name: "pivotcast-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `PIVOTCAST_POLL_INTERVAL_MS`: poll interval in milliseconds
    /// - `PIVOTCAST_TRANSPORT`: `shared` or `serialized`
    /// - `PIVOTCAST_WORKER_THREAD`: worker thread name
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("PIVOTCAST_POLL_INTERVAL_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.poll_interval_ms = v.max(1);
            }
        }

        if let Ok(s) = std::env::var("PIVOTCAST_TRANSPORT") {
            if let Some(t) = Transport::parse(&s) {
                cfg.transport = t;
            }
        }

        if let Ok(s) = std::env::var("PIVOTCAST_WORKER_THREAD") {
            if !s.trim().is_empty() {
                cfg.worker_thread_name = s;
            }
        }

        cfg
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_interval_is_500ms() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.poll_interval_ms, 500);
        assert_eq!(cfg.transport, Transport::Shared);
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let cfg: WorkerConfig = serde_json::from_str(r#"{"transport":"serialized"}"#).unwrap();
        assert_eq!(cfg.transport, Transport::Serialized);
        assert_eq!(cfg.poll_interval_ms, 500);
    }

    #[test]
    fn transport_tokens() {
        assert_eq!(Transport::parse("Serialized"), Some(Transport::Serialized));
        assert_eq!(Transport::parse("pigeon"), None);
    }
}

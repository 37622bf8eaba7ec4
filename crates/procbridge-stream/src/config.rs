use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StreamError};

/// Task configuration key holding the number of broadcast variables.
pub const BROADCAST_COUNT_KEY: &str = "PLANBINDER_BCVAR_COUNT";

/// Prefix of the keys naming each broadcast variable (`<prefix><index>`).
pub const BROADCAST_NAME_PREFIX: &str = "PLANBINDER_BCVAR_";

const HANDSHAKE_TIMEOUT_KEY: &str = "procbridge.handshake-timeout-ms";
const STREAM_TIMEOUT_KEY: &str = "procbridge.stream-timeout-ms";
const ERROR_GRACE_KEY: &str = "procbridge.error-grace-ms";
const BUFFER_SIZE_KEY: &str = "procbridge.buffer-size";

/// Default maximum chunk size: 64 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Timeouts and sizes used by a [`Streamer`](crate::Streamer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamerConfig {
    /// Read timeout while waiting for the port handshake.
    pub handshake_timeout: Duration,
    /// Read timeout for every receive after the handshake.
    pub stream_timeout: Duration,
    /// Delay before failing on an error signal, so the process can finish
    /// writing its diagnostic to the side channel.
    pub error_grace: Duration,
    /// Maximum number of bytes per outgoing chunk.
    pub buffer_size: usize,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(300),
            error_grace: Duration::from_secs(2),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl StreamerConfig {
    /// Build from task configuration, falling back to defaults for absent keys.
    pub fn from_task_config(config: &TaskConfig) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            handshake_timeout: config.get_millis(HANDSHAKE_TIMEOUT_KEY, defaults.handshake_timeout)?,
            stream_timeout: config.get_millis(STREAM_TIMEOUT_KEY, defaults.stream_timeout)?,
            error_grace: config.get_millis(ERROR_GRACE_KEY, defaults.error_grace)?,
            buffer_size: config.get_usize(BUFFER_SIZE_KEY, defaults.buffer_size)?,
        })
    }
}

/// String-keyed task configuration handed over by the host framework.
///
/// Values are JSON scalars; integers may also be given as numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskConfig {
    entries: BTreeMap<String, Value>,
}

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// String value of `key`, if present and a string.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Integer value of `key`, or `default` when absent.
    pub fn get_integer(&self, key: &str, default: i64) -> Result<i64> {
        match self.entries.get(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| StreamError::Config(format!("{key}: {n} is not an integer"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| StreamError::Config(format!("{key}: '{s}' is not an integer"))),
            Some(other) => Err(StreamError::Config(format!(
                "{key}: expected integer, got {other}"
            ))),
        }
    }

    /// Number of broadcast variables announced for this task.
    pub fn broadcast_count(&self) -> Result<usize> {
        let count = self.get_integer(BROADCAST_COUNT_KEY, 0)?;
        usize::try_from(count).map_err(|_| {
            StreamError::Config(format!("{BROADCAST_COUNT_KEY}: negative count {count}"))
        })
    }

    /// Names of all broadcast variables, in index order.
    pub fn broadcast_names(&self) -> Result<Vec<String>> {
        (0..self.broadcast_count()?)
            .map(|index| {
                let key = format!("{BROADCAST_NAME_PREFIX}{index}");
                self.get_string(&key)
                    .map(str::to_string)
                    .ok_or_else(|| StreamError::Config(format!("missing broadcast name {key}")))
            })
            .collect()
    }

    fn get_millis(&self, key: &str, default: Duration) -> Result<Duration> {
        let millis = self.get_integer(key, default.as_millis() as i64)?;
        let millis = u64::try_from(millis)
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| StreamError::Config(format!("{key}: must be positive, got {millis}")))?;
        Ok(Duration::from_millis(millis))
    }

    fn get_usize(&self, key: &str, default: usize) -> Result<usize> {
        let value = self.get_integer(key, default as i64)?;
        usize::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| StreamError::Config(format!("{key}: must be positive, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timeouts() {
        let cfg = StreamerConfig::default();
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(10));
        assert_eq!(cfg.stream_timeout, Duration::from_secs(300));
        assert_eq!(cfg.error_grace, Duration::from_secs(2));
    }

    #[test]
    fn broadcast_names_in_index_order() {
        let cfg = TaskConfig::from_json(
            r#"{"PLANBINDER_BCVAR_COUNT": 2, "PLANBINDER_BCVAR_1": "b", "PLANBINDER_BCVAR_0": "a"}"#,
        )
        .unwrap();
        assert_eq!(cfg.broadcast_count().unwrap(), 2);
        assert_eq!(cfg.broadcast_names().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn broadcast_count_defaults_to_zero() {
        let cfg = TaskConfig::new();
        assert_eq!(cfg.broadcast_count().unwrap(), 0);
        assert!(cfg.broadcast_names().unwrap().is_empty());
    }

    #[test]
    fn missing_broadcast_name_is_config_error() {
        let mut cfg = TaskConfig::new();
        cfg.set(BROADCAST_COUNT_KEY, 1);
        assert!(matches!(
            cfg.broadcast_names(),
            Err(StreamError::Config(_))
        ));
    }

    #[test]
    fn integer_accepts_numeric_string() {
        let mut cfg = TaskConfig::new();
        cfg.set("n", " 42 ").set("bad", "x").set("flag", true);
        assert_eq!(cfg.get_integer("n", 0).unwrap(), 42);
        assert!(cfg.get_integer("bad", 0).is_err());
        assert!(cfg.get_integer("flag", 0).is_err());
        assert_eq!(cfg.get_integer("absent", 7).unwrap(), 7);
    }

    #[test]
    fn negative_count_rejected() {
        let mut cfg = TaskConfig::new();
        cfg.set(BROADCAST_COUNT_KEY, -1);
        assert!(matches!(
            cfg.broadcast_count(),
            Err(StreamError::Config(_))
        ));
    }

    #[test]
    fn streamer_config_from_task_config() {
        let cfg = TaskConfig::from_json(
            r#"{"procbridge.stream-timeout-ms": 1500, "procbridge.error-grace-ms": "10",
                "procbridge.buffer-size": 4096}"#,
        )
        .unwrap();
        let streamer = StreamerConfig::from_task_config(&cfg).unwrap();
        assert_eq!(streamer.stream_timeout, Duration::from_millis(1500));
        assert_eq!(streamer.error_grace, Duration::from_millis(10));
        assert_eq!(streamer.buffer_size, 4096);
        assert_eq!(streamer.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut cfg = TaskConfig::new();
        cfg.set(HANDSHAKE_TIMEOUT_KEY, 0);
        assert!(StreamerConfig::from_task_config(&cfg).is_err());
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(matches!(
            TaskConfig::from_json("{not json"),
            Err(StreamError::Json(_))
        ));
    }
}

//! Server settings: an optional JSON file, then command-line overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use framelink_conn::{ConnConfig, RegistryConfig};
use serde::Deserialize;

use crate::cmd::ServeArgs;
use crate::exit::{conn_error, io_error, CliError, CliResult, DATA_INVALID, USAGE};

/// Settings for `framelink serve`. Absent fields keep the library defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub queue_capacity: Option<usize>,
    /// Duration string, e.g. `"60s"`.
    pub heartbeat: Option<String>,
    pub workers: Option<usize>,
    pub worker_queue_capacity: Option<usize>,
    pub max_connections: Option<usize>,
    pub max_message_size: Option<usize>,
    /// Duration string, e.g. `"10s"`.
    pub handshake_timeout: Option<String>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        Self::from_json(&text).map_err(|err| {
            CliError::new(err.code, format!("{}: {}", path.display(), err.message))
        })
    }

    pub fn from_json(text: &str) -> CliResult<Self> {
        serde_json::from_str(text)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid server config: {err}")))
    }

    /// Flags given on the command line win over the file.
    pub fn apply_overrides(&mut self, args: &ServeArgs) {
        if let Some(capacity) = args.queue_capacity {
            self.queue_capacity = Some(capacity);
        }
        if let Some(heartbeat) = &args.heartbeat {
            self.heartbeat = Some(heartbeat.clone());
        }
        if let Some(workers) = args.workers {
            self.workers = Some(workers);
        }
        if let Some(max) = args.max_connections {
            self.max_connections = Some(max);
        }
    }

    pub fn conn_config(&self) -> CliResult<ConnConfig> {
        let mut config = ConnConfig::default();
        if let Some(capacity) = self.queue_capacity {
            config = config.with_outbound_queue_capacity(capacity);
        }
        if let Some(heartbeat) = &self.heartbeat {
            config = config.with_heartbeat_interval(parse_duration(heartbeat)?);
        }
        if let Some(workers) = self.workers {
            let queue_capacity = self
                .worker_queue_capacity
                .unwrap_or(config.worker_queue_capacity);
            config = config.with_worker_pool(workers, queue_capacity);
        } else if let Some(queue_capacity) = self.worker_queue_capacity {
            config.worker_queue_capacity = queue_capacity;
        }
        if let Some(size) = self.max_message_size {
            config = config.with_max_message_size(size);
        }
        if let Some(timeout) = &self.handshake_timeout {
            config = config.with_handshake_timeout(parse_duration(timeout)?);
        }

        config
            .validate()
            .map_err(|err| conn_error("invalid server config", err))?;
        Ok(config)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_connections: self.max_connections.unwrap_or_default(),
        }
    }
}

/// Parse `"500ms"`, `"5s"` or a bare number of seconds. Zero is rejected.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

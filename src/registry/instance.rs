//! Registry data model.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Instance lifecycle status as reported by the instance itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    #[default]
    Up,
    Down,
    Starting,
    OutOfService,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
        };
        f.write_str(s)
    }
}

/// A registered service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub service_name: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
    /// Milliseconds since the Unix epoch of the last registration or heartbeat.
    pub last_heartbeat: u64,
}

impl Instance {
    pub fn new(
        service_name: impl Into<String>,
        instance_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_name: service_name.into().to_lowercase(),
            instance_id: instance_id.into(),
            host: host.into(),
            port,
            status: InstanceStatus::Up,
            last_heartbeat: epoch_millis(),
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when host, port and status are identical.
    pub fn same_metadata(&self, other: &Instance) -> bool {
        self.host == other.host && self.port == other.port && self.status == other.status
    }
}

/// Time-bounded validity of a registry entry, renewed by heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub service_name: String,
    pub instance_id: String,
    pub duration_secs: u64,
    /// Suggested heartbeat interval.
    pub renewal_interval_secs: u64,
}

/// Body of a registration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub status: Option<InstanceStatus>,
}

/// Optional body of a heartbeat call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub status: Option<InstanceStatus>,
}

/// Per-service summary for the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    pub instances: usize,
    pub up: usize,
}

pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&InstanceStatus::OutOfService).unwrap();
        assert_eq!(json, "\"OUT_OF_SERVICE\"");
        let status: InstanceStatus = serde_json::from_str("\"UP\"").unwrap();
        assert_eq!(status, InstanceStatus::Up);
    }

    #[test]
    fn test_service_name_normalized() {
        let instance = Instance::new("Currency-Exchange", "a", "h1", 8000);
        assert_eq!(instance.service_name, "currency-exchange");
        assert_eq!(instance.address(), "h1:8000");
    }
}

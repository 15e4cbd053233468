//! Mock Telemetry Endpoints
//!
//! Canned metrics for the alert scenario. Every endpoint is a stateless
//! function of its arguments; only `query_link_status` is randomized.

use rand::Rng;
use schemars::{schema_for, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid arguments for {endpoint}: {source}")]
    InvalidArguments {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown telemetry endpoint: {0}")]
    UnknownEndpoint(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// --- Arguments ---

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FreeQuery {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServiceWindow {
    pub service_id: String,
    /// Window length in minutes
    pub time_window: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServiceRef {
    pub service_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeploymentRef {
    pub deployment_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeploymentWindow {
    pub deployment_id: String,
    /// Window length in minutes
    pub time_window: i64,
}

// --- Results ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SystemLoad {
    /// Key spelling is part of the wire contract.
    pub sytem_load_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SystemLatency {
    pub system_latency_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LinkStatus {
    pub link_status: LinkState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HighLatencyPercentage {
    pub high_latency_requests_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestLatencies {
    pub storage_latency_ms: u32,
    pub server_latency_ms: u32,
    pub end_to_end_latency_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceInfo {
    pub service_type: String,
    pub account_id: String,
    pub deployment_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeploymentInfo {
    pub vm_type: String,
    pub role_instances_count: u32,
    pub subscription_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CpuLoad {
    pub average_cpu_load_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestRate {
    pub average_requests_per_second: u32,
}

pub const ACCOUNT_ID: &str = "a1d4c6f7-3e2b-4b9a-bc8f-9f6e2a1d7c3e";
pub const DEPLOYMENT_ID: &str = "f3c9a7e2-8b4d-4f6a-9c2e-7d1b3a6e5c9f";
pub const SUBSCRIPTION_ID: &str = "c7e2b9f1-4d3a-4a8e-9f6c-2b1d7e3f9a4c";

// --- Endpoints ---

pub fn query_system_load(_args: &FreeQuery) -> SystemLoad {
    SystemLoad {
        sytem_load_percent: 99,
    }
}

pub fn query_system_latency(_args: &FreeQuery) -> SystemLatency {
    SystemLatency {
        system_latency_ms: 100,
    }
}

/// Connected with roughly even odds, independently per call.
pub fn query_link_status(_args: &FreeQuery) -> LinkStatus {
    let roll: u32 = rand::thread_rng().gen_range(1..=100);
    let link_status = if roll < 50 {
        LinkState::Connected
    } else {
        LinkState::Disconnected
    };
    LinkStatus { link_status }
}

pub fn query_high_latency_request_percentage(_args: &ServiceWindow) -> HighLatencyPercentage {
    HighLatencyPercentage {
        high_latency_requests_percent: 98,
    }
}

pub fn query_average_request_latencies(_args: &ServiceWindow) -> RequestLatencies {
    RequestLatencies {
        storage_latency_ms: 10,
        server_latency_ms: 500,
        end_to_end_latency_ms: 2000,
    }
}

pub fn query_service_info(_args: &ServiceRef) -> ServiceInfo {
    ServiceInfo {
        service_type: "shared origin".to_string(),
        account_id: ACCOUNT_ID.to_string(),
        deployment_id: DEPLOYMENT_ID.to_string(),
    }
}

pub fn query_deployment_info(_args: &DeploymentRef) -> DeploymentInfo {
    DeploymentInfo {
        vm_type: "Standard_D16_v5".to_string(),
        role_instances_count: 2,
        subscription_id: SUBSCRIPTION_ID.to_string(),
    }
}

pub fn query_average_cpu_load(_args: &DeploymentWindow) -> CpuLoad {
    CpuLoad {
        average_cpu_load_percent: 98,
    }
}

pub fn query_average_requests_per_sec(_args: &DeploymentWindow) -> RequestRate {
    RequestRate {
        average_requests_per_second: 500,
    }
}

/// The closed set of telemetry endpoints, resolved by name at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryEndpoint {
    SystemLoad,
    SystemLatency,
    LinkStatus,
    HighLatencyRequestPercentage,
    AverageRequestLatencies,
    ServiceInfo,
    DeploymentInfo,
    AverageCpuLoad,
    AverageRequestsPerSec,
}

impl TelemetryEndpoint {
    pub const ALL: [TelemetryEndpoint; 9] = [
        Self::SystemLoad,
        Self::SystemLatency,
        Self::LinkStatus,
        Self::HighLatencyRequestPercentage,
        Self::AverageRequestLatencies,
        Self::ServiceInfo,
        Self::DeploymentInfo,
        Self::AverageCpuLoad,
        Self::AverageRequestsPerSec,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SystemLoad => "query_system_load",
            Self::SystemLatency => "query_system_latency",
            Self::LinkStatus => "query_link_status",
            Self::HighLatencyRequestPercentage => "query_high_latency_request_percentage",
            Self::AverageRequestLatencies => "query_average_request_latencies",
            Self::ServiceInfo => "query_service_info",
            Self::DeploymentInfo => "query_deployment_info",
            Self::AverageCpuLoad => "query_average_cpu_load",
            Self::AverageRequestsPerSec => "query_average_requests_per_sec",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SystemLoad => "Returns the current system load percentage.",
            Self::SystemLatency => "Returns the current system latency in milliseconds.",
            Self::LinkStatus => "Returns the link status: connected or disconnected.",
            Self::HighLatencyRequestPercentage => {
                "Returns the percentage of requests with high latency for a service over a time window in minutes."
            }
            Self::AverageRequestLatencies => {
                "Returns average storage, server and end-to-end request latencies in milliseconds for a service over a time window in minutes."
            }
            Self::ServiceInfo => {
                "Returns the service type, account id and deployment id for a service."
            }
            Self::DeploymentInfo => {
                "Returns the VM type, number of role instances and subscription id for a deployment."
            }
            Self::AverageCpuLoad => {
                "Returns the average CPU load percentage of a deployment over a time window in minutes."
            }
            Self::AverageRequestsPerSec => {
                "Returns the average number of requests per second for a deployment over a time window in minutes."
            }
        }
    }

    pub fn input_schema(&self) -> Value {
        let schema = match self {
            Self::SystemLoad | Self::SystemLatency | Self::LinkStatus => schema_for!(FreeQuery),
            Self::HighLatencyRequestPercentage | Self::AverageRequestLatencies => {
                schema_for!(ServiceWindow)
            }
            Self::ServiceInfo => schema_for!(ServiceRef),
            Self::DeploymentInfo => schema_for!(DeploymentRef),
            Self::AverageCpuLoad | Self::AverageRequestsPerSec => schema_for!(DeploymentWindow),
        };
        serde_json::to_value(schema).unwrap_or(Value::Null)
    }

    pub fn output_schema(&self) -> Value {
        let schema = match self {
            Self::SystemLoad => schema_for!(SystemLoad),
            Self::SystemLatency => schema_for!(SystemLatency),
            Self::LinkStatus => schema_for!(LinkStatus),
            Self::HighLatencyRequestPercentage => schema_for!(HighLatencyPercentage),
            Self::AverageRequestLatencies => schema_for!(RequestLatencies),
            Self::ServiceInfo => schema_for!(ServiceInfo),
            Self::DeploymentInfo => schema_for!(DeploymentInfo),
            Self::AverageCpuLoad => schema_for!(CpuLoad),
            Self::AverageRequestsPerSec => schema_for!(RequestRate),
        };
        serde_json::to_value(schema).unwrap_or(Value::Null)
    }

    /// Decode `args`, run the endpoint and encode its result.
    pub fn invoke(&self, args: Value) -> Result<Value, TelemetryError> {
        let endpoint = self.name();
        let value = match self {
            Self::SystemLoad => serde_json::to_value(query_system_load(&decode(endpoint, args)?))?,
            Self::SystemLatency => {
                serde_json::to_value(query_system_latency(&decode(endpoint, args)?))?
            }
            Self::LinkStatus => serde_json::to_value(query_link_status(&decode(endpoint, args)?))?,
            Self::HighLatencyRequestPercentage => serde_json::to_value(
                query_high_latency_request_percentage(&decode(endpoint, args)?),
            )?,
            Self::AverageRequestLatencies => {
                serde_json::to_value(query_average_request_latencies(&decode(endpoint, args)?))?
            }
            Self::ServiceInfo => serde_json::to_value(query_service_info(&decode(endpoint, args)?))?,
            Self::DeploymentInfo => {
                serde_json::to_value(query_deployment_info(&decode(endpoint, args)?))?
            }
            Self::AverageCpuLoad => {
                serde_json::to_value(query_average_cpu_load(&decode(endpoint, args)?))?
            }
            Self::AverageRequestsPerSec => {
                serde_json::to_value(query_average_requests_per_sec(&decode(endpoint, args)?))?
            }
        };
        Ok(value)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &'static str, args: Value) -> Result<T, TelemetryError> {
    // Models sometimes send `null` for tools whose only argument is optional text.
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|source| TelemetryError::InvalidArguments { endpoint, source })
}

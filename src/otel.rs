// ABOUTME: OpenTelemetry binding: config validation and the process-wide once-only init
// ABOUTME: W3C span-context formats are enforced before anything reaches the native layer

use crate::bridge::EngineBridge;
use std::sync::Mutex;
use thiserror::Error;

/// Default fraction of requests to sample, in percent.
pub const DEFAULT_SAMPLE_PERCENTAGE: u32 = 1;
/// Default exporter flush interval.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;

/// Exporter endpoints and sampling policy handed to the native engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenTelemetryConfig {
    pub traces_endpoint: Option<String>,
    pub metrics_endpoint: Option<String>,
    /// Percentage of requests to sample, 0–100.
    pub sample_percentage: u32,
    /// Exporter flush interval in milliseconds; must be positive.
    pub flush_interval_ms: u64,
}

impl Default for OpenTelemetryConfig {
    fn default() -> Self {
        OpenTelemetryConfig {
            traces_endpoint: None,
            metrics_endpoint: None,
            sample_percentage: DEFAULT_SAMPLE_PERCENTAGE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

impl OpenTelemetryConfig {
    pub fn with_traces_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.traces_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_metrics_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metrics_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_sample_percentage(mut self, percentage: u32) -> Self {
        self.sample_percentage = percentage;
        self
    }

    pub fn with_flush_interval_ms(mut self, interval_ms: u64) -> Self {
        self.flush_interval_ms = interval_ms;
        self
    }

    /// Validate every field before any native call sees the configuration.
    pub fn validate(&self) -> Result<(), OtelError> {
        if self.sample_percentage > 100 {
            return Err(OtelError::InvalidSamplePercentage(self.sample_percentage));
        }
        if self.flush_interval_ms == 0 {
            return Err(OtelError::InvalidFlushInterval);
        }
        if let Some(endpoint) = &self.traces_endpoint {
            validate_endpoint(endpoint)?;
        }
        if let Some(endpoint) = &self.metrics_endpoint {
            validate_endpoint(endpoint)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum OtelError {
    #[error("sample percentage {0} is out of range (0-100)")]
    InvalidSamplePercentage(u32),

    #[error("flush interval must be a positive number of milliseconds")]
    InvalidFlushInterval,

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        endpoint: String,
        reason: &'static str,
    },

    #[error("native initialisation failed: {0}")]
    Init(String),
}

fn validate_endpoint(endpoint: &str) -> Result<(), OtelError> {
    let Some((scheme, rest)) = endpoint.split_once("://") else {
        return Err(OtelError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "missing scheme",
        });
    };
    match scheme {
        "http" | "https" | "grpc" => {
            if rest.is_empty() {
                return Err(OtelError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: "missing host",
                });
            }
        }
        "file" => {
            if !rest.starts_with('/') {
                return Err(OtelError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: "file URL must carry an absolute path",
                });
            }
        }
        _ => {
            return Err(OtelError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "unsupported scheme",
            });
        }
    }
    Ok(())
}

static INITIALISED: Mutex<bool> = Mutex::new(false);

/// Whether [`init`] has already completed successfully in this process.
pub fn is_initialised() -> bool {
    *INITIALISED.lock().expect("otel init state poisoned")
}

/// Initialise the native OpenTelemetry exporter.
///
/// OpenTelemetry is a process-wide resource, so this is once-only: a repeat
/// call is ignored with a warning rather than re-binding the exporter.
pub fn init(bridge: &dyn EngineBridge, config: &OpenTelemetryConfig) -> Result<(), OtelError> {
    config.validate()?;
    let mut initialised = INITIALISED.lock().expect("otel init state poisoned");
    if *initialised {
        tracing::warn!("opentelemetry already initialised; ignoring repeated init");
        return Ok(());
    }
    bridge
        .init_otel(config)
        .map_err(|e| OtelError::Init(e.to_string()))?;
    *initialised = true;
    Ok(())
}

/// Check a W3C trace id: 32 lowercase hex digits, not all zero.
pub fn is_valid_trace_id(trace_id: &str) -> bool {
    trace_id.len() == 32
        && trace_id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        && trace_id.bytes().any(|b| b != b'0')
}

/// Check a W3C span id: 16 lowercase hex digits, not all zero.
pub fn is_valid_span_id(span_id: &str) -> bool {
    span_id.len() == 16
        && span_id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        && span_id.bytes().any(|b| b != b'0')
}

/// Check W3C trace flags: a single octet.
pub fn is_valid_trace_flags(flags: u32) -> bool {
    flags <= 0xff
}

/// Check a W3C `tracestate` header value (trace-context §3.3): up to 32
/// comma-separated `key=value` members with the restricted key and value
/// character sets.
pub fn is_valid_tracestate(tracestate: &str) -> bool {
    if tracestate.is_empty() {
        return false;
    }
    let members: Vec<&str> = tracestate.split(',').map(str::trim_start).collect();
    if members.len() > 32 {
        return false;
    }
    members.iter().all(|member| {
        let Some((key, value)) = member.split_once('=') else {
            return false;
        };
        is_valid_tracestate_key(key) && is_valid_tracestate_value(value)
    })
}

fn is_valid_tracestate_key(key: &str) -> bool {
    fn is_simple_key(key: &str) -> bool {
        let mut bytes = key.bytes();
        match bytes.next() {
            Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => {}
            _ => return false,
        }
        key.len() <= 256
            && key.bytes().all(|b| {
                b.is_ascii_lowercase()
                    || b.is_ascii_digit()
                    || b == b'_'
                    || b == b'-'
                    || b == b'*'
                    || b == b'/'
            })
    }
    match key.split_once('@') {
        // multi-tenant form: tenant@system
        Some((tenant, system)) => {
            is_simple_key(tenant) && is_simple_key(system) && system.len() <= 14
        }
        None => is_simple_key(key),
    }
}

fn is_valid_tracestate_value(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 256
        && !value.ends_with(' ')
        && value
            .bytes()
            .all(|b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
}

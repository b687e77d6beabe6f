//! Health command implementation

use crate::backend::InferenceBackend;
use crate::cli::HealthArgs;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use std::time::{Duration, Instant};

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub backend_url: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Format health status as pretty text
fn format_health_pretty(status: &HealthStatus) -> Result<String, std::fmt::Error> {
    let mut output = String::new();

    let status_display = if status.status == "healthy" {
        "Healthy".green()
    } else {
        "Unreachable".red()
    };

    writeln!(output, "Status: {}", status_display)?;
    writeln!(output, "Version: {}", status.version)?;
    writeln!(output, "Backend: {} ({}ms)", status.backend_url, status.latency_ms)?;

    if let Some(error) = &status.error {
        writeln!(output, "Error: {}", error)?;
    }
    if let Some(Value::Object(fields)) = &status.backend {
        writeln!(output)?;
        writeln!(output, "Backend Details:")?;
        for (key, value) in fields {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            writeln!(output, "  {}: {}", key, value)?;
        }
    }

    Ok(output)
}

/// Handle `relay health`
///
/// An unreachable backend is reported in the output rather than as an error.
pub async fn handle_health(
    args: &HealthArgs,
    backend: &dyn InferenceBackend,
    backend_url: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let result = backend.health().await;
    let latency = start.elapsed();

    let status = build_status(result, backend_url, latency);
    if args.json {
        Ok(serde_json::to_string_pretty(&status)?)
    } else {
        Ok(format_health_pretty(&status)?)
    }
}

fn build_status(
    result: Result<Value, crate::backend::BackendError>,
    backend_url: &str,
    latency: Duration,
) -> HealthStatus {
    let (status, backend, error) = match result {
        Ok(body) => ("healthy", Some(body), None),
        Err(e) => ("unreachable", None, Some(e.to_string())),
    };
    HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend_url: backend_url.to_string(),
        latency_ms: latency.as_millis() as u64,
        backend,
        error,
    }
}

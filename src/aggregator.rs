//! Normalization of raw metric payloads into canonical readings.
//!
//! Remote hosts do not agree on a single CPU payload shape. Two variants are
//! in the wild:
//!
//! - one or more named properties (sampling windows), each an array of
//!   `{"core": <index>, "usage": <percent>}`
//! - `{"average": <percent>, "cpu_usage": [{"usage": <percent>}, ...]}` where
//!   the core index is the array position
//!
//! Both decode into `CpuReading`: a dense per-core vector where each entry is
//! the mean of every observation for that core, and an overall average taken
//! over the per-core values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::FetchError;
use crate::host::RamInfo;

/// Highest core index accepted before an entry is treated as malformed.
pub const MAX_CORE_INDEX: u64 = 65_535;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuReading {
    pub average: f64,
    /// Index is the core number.
    pub per_core: Vec<f64>,
}

impl CpuReading {
    pub fn cores(&self) -> usize {
        self.per_core.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RamReading {
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub free: f64,
    /// 0..=100
    pub usage_percent: f64,
    /// First element of `/metrics/v1/ram/usage`, if that call succeeded.
    pub reported_usage_percent: Option<f64>,
}

impl RamReading {
    pub fn info(&self) -> RamInfo {
        RamInfo {
            total: self.total,
            used: self.used,
            available: self.available,
            free: self.free,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlCount {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentError {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, alias = "ip")]
    pub source_ip: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status_code: u16,
}

/// Remote log statistics, passed through as reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSummary {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    #[serde(alias = "status_codes")]
    pub status_code_histogram: BTreeMap<String, u64>,
    pub top_urls: Vec<UrlCount>,
    pub recent_errors: Vec<RecentError>,
}

/// Canonical metrics of one healthy host for one poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readings {
    pub cpu: CpuReading,
    pub ram: RamReading,
    pub logs: LogSummary,
}

impl Readings {
    /// Assembles readings from the families that were fetched. A `None`
    /// family falls back to its zero-valued default.
    pub fn assemble(
        cpu: Option<CpuReading>,
        ram_info: Option<RamInfo>,
        reported_usage: Option<f64>,
        logs: Option<LogSummary>,
    ) -> Self {
        let ram = match ram_info {
            Some(info) => RamReading {
                total: info.total,
                used: info.used,
                available: info.available,
                free: info.free,
                usage_percent: ram_usage_percent(info.total, info.used),
                reported_usage_percent: reported_usage,
            },
            None => RamReading {
                usage_percent: reported_usage.map(|u| u.clamp(0.0, 100.0)).unwrap_or(0.0),
                reported_usage_percent: reported_usage,
                ..RamReading::default()
            },
        };

        Self {
            cpu: cpu.unwrap_or_default(),
            ram,
            logs: logs.unwrap_or_default(),
        }
    }
}

fn malformed(family: &'static str, reason: impl Into<String>) -> FetchError {
    FetchError::MalformedPayload {
        family,
        reason: reason.into(),
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn as_core_index(v: &Value) -> Option<usize> {
    let idx = match v {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (idx <= MAX_CORE_INDEX).then_some(idx as usize)
}

/// Decodes a CPU usage payload of either known shape.
///
/// Entries with a non-numeric core index or usage are skipped. The payload
/// itself is malformed only when it is not an object or carries neither a
/// per-core array nor a numeric `average`.
pub fn decode_cpu(payload: &Value) -> Result<CpuReading, FetchError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| malformed("cpu", "expected a JSON object"))?;

    let mut observations: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    let mut saw_array = false;

    for entries in obj.values().filter_map(Value::as_array) {
        saw_array = true;
        for (position, entry) in entries.iter().enumerate() {
            let Some(entry) = entry.as_object() else {
                continue;
            };
            let core = match entry.get("core") {
                Some(v) => as_core_index(v),
                None => Some(position),
            };
            let usage = entry.get("usage").and_then(as_number);
            if let (Some(core), Some(usage)) = (core, usage) {
                observations.entry(core).or_default().push(usage);
            }
        }
    }

    let reported_average = obj.get("average").and_then(as_number);
    if !saw_array && reported_average.is_none() {
        return Err(malformed("cpu", "no per-core arrays and no average"));
    }

    Ok(aggregate_cores(&observations, reported_average))
}

/// Per-core mean over all observations, dense up to the highest seen index.
pub fn aggregate_cores(
    observations: &BTreeMap<usize, Vec<f64>>,
    fallback_average: Option<f64>,
) -> CpuReading {
    let Some((&max_core, _)) = observations.last_key_value() else {
        return CpuReading {
            average: fallback_average.unwrap_or(0.0),
            per_core: Vec::new(),
        };
    };

    let mut per_core = vec![0.0; max_core + 1];
    for (&core, values) in observations {
        if !values.is_empty() {
            per_core[core] = values.iter().sum::<f64>() / values.len() as f64;
        }
    }
    let average = per_core.iter().sum::<f64>() / per_core.len() as f64;

    CpuReading { average, per_core }
}

/// Decodes `/metrics/v1/ram/info`. `total` and `used` are required.
pub fn decode_ram_info(payload: &Value) -> Result<RamInfo, FetchError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| malformed("ram_info", "expected a JSON object"))?;

    let field = |name: &'static str, required: bool| -> Result<f64, FetchError> {
        match obj.get(name) {
            None | Some(Value::Null) if !required => Ok(0.0),
            None | Some(Value::Null) => Err(malformed("ram_info", format!("missing '{}'", name))),
            Some(v) => match as_number(v) {
                Some(n) if n >= 0.0 => Ok(n),
                _ => Err(malformed("ram_info", format!("'{}' is not a non-negative number", name))),
            },
        }
    };

    Ok(RamInfo {
        total: field("total", true)?,
        used: field("used", true)?,
        available: field("available", false)?,
        free: field("free", false)?,
    })
}

/// Decodes `/metrics/v1/ram/usage`: the first element's `usage` field.
pub fn decode_ram_usage(payload: &Value) -> Result<f64, FetchError> {
    let first = payload
        .as_array()
        .ok_or_else(|| malformed("ram_usage", "expected a JSON array"))?
        .first()
        .ok_or_else(|| malformed("ram_usage", "empty array"))?;

    first
        .get("usage")
        .and_then(as_number)
        .ok_or_else(|| malformed("ram_usage", "first element has no numeric 'usage'"))
}

pub fn decode_logs(payload: Value) -> Result<LogSummary, FetchError> {
    if !payload.is_object() {
        return Err(malformed("logs", "expected a JSON object"));
    }
    serde_json::from_value(payload).map_err(|e| malformed("logs", e.to_string()))
}

/// `used / total * 100`, or 0 when total is not positive.
pub fn ram_usage_percent(total: f64, used: f64) -> f64 {
    if total > 0.0 {
        (used / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Presentation form of a MB figure: `("4096 MB", "(4.00 GB)")`.
pub fn format_memory(mb: f64) -> (String, String) {
    (format!("{:.0} MB", mb), format!("({:.2} GB)", mb / 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_two_windows_average_per_core() {
        let payload = json!({
            "1s": [{"core": 0, "usage": 40.0}, {"core": 1, "usage": 10.0}],
            "5s": [{"core": 0, "usage": 60.0}]
        });
        let cpu = decode_cpu(&payload).unwrap();

        assert_eq!(cpu.per_core, vec![50.0, 10.0]);
        // Mean of per-core values, not of per-window averages (which would be 37.5).
        assert_eq!(cpu.average, 30.0);
    }

    #[test]
    fn test_unobserved_core_reports_zero() {
        let payload = json!({"now": [{"core": 0, "usage": 20.0}, {"core": 2, "usage": 40.0}]});
        let cpu = decode_cpu(&payload).unwrap();

        assert_eq!(cpu.per_core, vec![20.0, 0.0, 40.0]);
        assert_eq!(cpu.average, 20.0);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let payload = json!({
            "now": [
                {"core": "x", "usage": 99.0},
                {"core": 0, "usage": "n/a"},
                {"core": 0, "usage": 30.0},
                {"core": "1", "usage": "70"},
                {"core": 70000, "usage": 5.0},
                "garbage"
            ]
        });
        let cpu = decode_cpu(&payload).unwrap();

        assert_eq!(cpu.per_core, vec![30.0, 70.0]);
    }

    #[test]
    fn test_average_variant_uses_positions() {
        let payload = json!({"average": 12.5, "cpu_usage": [{"usage": 10.0}, {"usage": 30.0}]});
        let cpu = decode_cpu(&payload).unwrap();

        assert_eq!(cpu.per_core, vec![10.0, 30.0]);
        assert_eq!(cpu.average, 20.0);
    }

    #[test]
    fn test_average_only_falls_back() {
        let cpu = decode_cpu(&json!({"average": 42.0, "cpu_usage": []})).unwrap();
        assert_eq!(cpu.average, 42.0);
        assert!(cpu.per_core.is_empty());
    }

    #[test]
    fn test_unknown_cpu_shape_is_malformed() {
        assert!(matches!(
            decode_cpu(&json!({"status": "ok"})),
            Err(FetchError::MalformedPayload { family: "cpu", .. })
        ));
        assert!(decode_cpu(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_ram_usage_percent() {
        assert_eq!(ram_usage_percent(8192.0, 4096.0), 50.0);
        assert_eq!(ram_usage_percent(0.0, 4096.0), 0.0);
        assert_eq!(ram_usage_percent(8192.0, 9000.0), 100.0);
    }

    #[test]
    fn test_overcommitted_ram_info_stays_in_range() {
        let info = RamInfo {
            total: 4000.0,
            used: 5000.0,
            available: 0.0,
            free: 0.0,
        };
        let readings = Readings::assemble(None, Some(info), None, None);
        assert_eq!(readings.ram.usage_percent, 100.0);
        assert_eq!(readings.ram.used, 5000.0);
    }

    #[test]
    fn test_ram_info_requires_total_and_used() {
        let info = decode_ram_info(&json!({"total": 8192, "used": 4096})).unwrap();
        assert_eq!(info.available, 0.0);
        assert!(decode_ram_info(&json!({"used": 1})).is_err());
        assert!(decode_ram_info(&json!({"total": -1, "used": 1})).is_err());
    }

    #[test]
    fn test_ram_usage_takes_first_element() {
        assert_eq!(
            decode_ram_usage(&json!([{"usage": 61.5}, {"usage": 10.0}])).unwrap(),
            61.5
        );
        assert!(decode_ram_usage(&json!([])).is_err());
    }

    #[test]
    fn test_assemble_prefers_ram_info() {
        let info = RamInfo {
            total: 8192.0,
            used: 2048.0,
            available: 6144.0,
            free: 4096.0,
        };
        let readings = Readings::assemble(None, Some(info), Some(80.0), None);
        assert_eq!(readings.ram.usage_percent, 25.0);
        assert_eq!(readings.ram.reported_usage_percent, Some(80.0));

        let readings = Readings::assemble(None, None, Some(80.0), None);
        assert_eq!(readings.ram.usage_percent, 80.0);
        assert_eq!(readings.ram.total, 0.0);
        assert_eq!(readings.logs, LogSummary::default());
    }

    #[test]
    fn test_log_summary_accepts_remote_names() {
        let payload = json!({
            "total_requests": 10,
            "success_count": 8,
            "error_count": 2,
            "status_codes": {"200": 8, "500": 2},
            "top_urls": [{"url": "/", "count": 7}],
            "recent_errors": [
                {"timestamp": "2024-05-01T12:00:00", "ip": "1.2.3.4", "url": "/x", "status_code": 500}
            ]
        });
        let logs = decode_logs(payload).unwrap();

        assert_eq!(logs.status_code_histogram.get("500"), Some(&2));
        assert_eq!(logs.recent_errors[0].source_ip, "1.2.3.4");
        assert_eq!(logs.top_urls[0].count, 7);
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(
            format_memory(4096.0),
            ("4096 MB".to_string(), "(4.00 GB)".to_string())
        );
    }
}

//! The canonical alert model and the two accepted wire shapes (§4.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::fingerprint;

pub const ALERTNAME_LABEL: &str = "alertname";
pub const SEVERITY_LABEL: &str = "severity";
pub const DESCRIPTION_LABEL: &str = "description";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Firing,
    Resolved,
    Acked,
}

/// Raw severity as reported by the source. Coerced into `Severity` for
/// fingerprinting and routing, but kept around as `display_severity` for
/// presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    P0,
    P1,
    Info,
    Warning,
    Critical,
    Success,
}

impl Severity {
    /// §4.1: `critical -> P0`; everything else -> `P1`. `info` and
    /// `warning` both collapsing into `P1` is intentional — preserved from
    /// the source, not a bug we should "fix".
    pub fn coerce(&self) -> Severity {
        match self {
            Severity::Critical => Severity::P0,
            _ => Severity::P1,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Severity::P0 => "P0",
            Severity::P1 => "P1",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Success => "success",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub username: String,
    pub comment: String,
    pub time: DateTime<Utc>,
}

/// The canonical, normalized alert. Both wire shapes in §4.1 are
/// normalized into this before reaching C5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Assigned on first insert into the history store; empty until then.
    #[serde(default)]
    pub id: String,
    pub fingerprint: String,
    pub status: AlertStatus,
    pub description: String,
    pub alertname: String,
    /// Coerced severity (`P0`/`P1`), used for fingerprinting and routing.
    pub severity: Severity,
    /// Severity as originally reported, used only for presentation.
    pub display_severity: Severity,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub generator_url: String,
    pub labels: HashMap<String, String>,
    pub need_handle: bool,
    #[serde(default)]
    pub is_emergent: bool,
    #[serde(default)]
    pub acks: Vec<Ack>,
    #[serde(default)]
    pub analyzer_tags: Vec<String>,
}

/// Wire shape "default" (§4.1).
#[derive(Debug, Clone, Deserialize)]
pub struct AlertForDefault {
    pub alertname: String,
    pub desc: String,
    pub status: AlertStatus,
    pub severity: Severity,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generator_url: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub need_handle: bool,
}

/// Wire shape "prom" (§4.1). `needHandle` is always true for this shape;
/// `alertname`/`severity` are embedded in `labels`, `description` in
/// `annotations`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertForProm {
    pub status: AlertStatus,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generator_url: String,
}

impl Alert {
    /// Normalize the "default" shape into a canonical `Alert`. Fingerprint
    /// is computed over `alertname` + coerced severity + the (already
    /// alertname/severity-free) labels map.
    pub fn from_default(a: AlertForDefault) -> Alert {
        let coerced = a.severity.coerce();
        let fp = fingerprint(&a.alertname, &coerced, &a.labels);
        Alert {
            id: String::new(),
            fingerprint: fp,
            status: a.status,
            description: a.desc,
            alertname: a.alertname,
            severity: coerced,
            display_severity: a.severity,
            starts_at: a.starts_at,
            ends_at: a.ends_at,
            generator_url: a.generator_url,
            labels: a.labels,
            need_handle: a.need_handle,
            is_emergent: false,
            acks: Vec::new(),
            analyzer_tags: Vec::new(),
        }
    }

    /// Normalize the "prom" shape. `alertname`/`severity` are lifted out of
    /// `labels` before fingerprinting, so the fingerprint is identical to
    /// what the same conceptual alert would produce via the "default"
    /// shape (§8 scenario 7).
    pub fn from_prom(mut a: AlertForProm) -> Alert {
        let alertname = a.labels.remove(ALERTNAME_LABEL).unwrap_or_default();
        let raw_severity = a
            .labels
            .remove(SEVERITY_LABEL)
            .map(|s| parse_severity(&s))
            .unwrap_or(Severity::Warning);
        let description = a
            .annotations
            .remove(DESCRIPTION_LABEL)
            .unwrap_or_default();

        let coerced = raw_severity.coerce();
        let fp = fingerprint(&alertname, &coerced, &a.labels);

        Alert {
            id: String::new(),
            fingerprint: fp,
            status: a.status,
            description,
            alertname,
            severity: coerced,
            display_severity: raw_severity,
            starts_at: a.starts_at,
            ends_at: a.ends_at,
            generator_url: a.generator_url,
            labels: a.labels,
            need_handle: true,
            is_emergent: false,
            acks: Vec::new(),
            analyzer_tags: Vec::new(),
        }
    }
}

fn parse_severity(s: &str) -> Severity {
    match s {
        "critical" => Severity::Critical,
        "warning" => Severity::Warning,
        "info" => Severity::Info,
        "P0" => Severity::P0,
        "P1" => Severity::P1,
        "success" => Severity::Success,
        _ => Severity::Warning,
    }
}

/// The unit handed to the notifier fan-out (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub correlation_id: String,
    pub alerts: Vec<Alert>,
}

impl Message {
    pub fn new(correlation_id: impl Into<String>, alerts: Vec<Alert>) -> Self {
        Message {
            correlation_id: correlation_id.into(),
            alerts,
        }
    }

    pub fn single(correlation_id: impl Into<String>, alert: Alert) -> Self {
        Message::new(correlation_id, vec![alert])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn severity_coercion_matches_spec_table() {
        assert_eq!(Severity::Critical.coerce().as_label(), "P0");
        assert_eq!(Severity::Warning.coerce().as_label(), "P1");
        assert_eq!(Severity::Info.coerce().as_label(), "P1");
        assert_eq!(Severity::P1.coerce().as_label(), "P1");
    }

    #[test]
    fn default_and_prom_shapes_yield_identical_fingerprints() {
        let default_alert = Alert::from_default(AlertForDefault {
            alertname: "high_latency".to_string(),
            desc: "p99 too high".to_string(),
            status: AlertStatus::Firing,
            severity: Severity::Warning,
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: String::new(),
            labels: labels(&[("region", "us"), ("service", "api")]),
            need_handle: false,
        });

        let mut prom_labels = labels(&[("region", "us"), ("service", "api")]);
        prom_labels.insert(ALERTNAME_LABEL.to_string(), "high_latency".to_string());
        prom_labels.insert(SEVERITY_LABEL.to_string(), "warning".to_string());
        let mut annotations = HashMap::new();
        annotations.insert(DESCRIPTION_LABEL.to_string(), "p99 too high".to_string());

        let prom_alert = Alert::from_prom(AlertForProm {
            status: AlertStatus::Firing,
            labels: prom_labels,
            annotations,
            starts_at: default_alert.starts_at,
            ends_at: None,
            generator_url: String::new(),
        });

        assert_eq!(default_alert.fingerprint, prom_alert.fingerprint);
        assert!(prom_alert.need_handle);
        assert!(!default_alert.need_handle);
    }
}

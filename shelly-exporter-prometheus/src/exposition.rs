//! Prometheus text exposition building blocks.
//!
//! An [`Exposition`] accumulates the lines for one device: every sample is
//! labeled with the device `target`, labels are written in lexicographic
//! order, and each family's `# HELP`/`# TYPE` preamble is written once,
//! right before the family's first sample.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

/// Prometheus metric type of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// A named group of samples sharing type and help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricFamily {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

impl MetricFamily {
    pub const fn gauge(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
        }
    }

    pub const fn counter(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Counter,
        }
    }
}

/// Value of a single sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl SampleValue {
    /// Convert a JSON scalar into a sample value.
    ///
    /// Returns None for values without a numeric meaning (strings, null,
    /// arrays, objects).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(SampleValue::Int(i))
                } else {
                    n.as_f64().map(SampleValue::Float)
                }
            }
            Value::Bool(b) => Some(SampleValue::Bool(*b)),
            Value::Null | Value::String(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            SampleValue::Int(v) => *v as f64,
            SampleValue::Float(v) => *v,
            SampleValue::Bool(v) => f64::from(u8::from(*v)),
        }
    }

    /// Render the value for the exposition format.
    pub fn render(&self) -> String {
        match self {
            SampleValue::Int(v) => v.to_string(),
            SampleValue::Float(v) => format_float(*v),
            SampleValue::Bool(v) => u8::from(*v).to_string(),
        }
    }
}

/// JSON truthiness: null, false, zero and empty values are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Label name to value, iterated in lexicographic order.
pub type LabelSet = BTreeMap<&'static str, String>;

/// Accumulates exposition lines for one device.
#[derive(Debug)]
pub struct Exposition {
    target: String,
    lines: Vec<String>,
    declared: HashSet<&'static str>,
}

impl Exposition {
    /// Start an exposition whose samples are labeled `target=<target>`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            lines: Vec::new(),
            declared: HashSet::new(),
        }
    }

    /// Append one sample, declaring its family first if needed.
    ///
    /// A `target` entry in `labels` is ignored in favor of the device target.
    pub fn sample(
        &mut self,
        family: &MetricFamily,
        labels: impl IntoIterator<Item = (&'static str, String)>,
        value: SampleValue,
    ) {
        if self.declared.insert(family.name) {
            self.lines
                .push(format!("# HELP {} {}", family.name, family.help));
            self.lines.push(format!(
                "# TYPE {} {}",
                family.name,
                family.kind.as_str()
            ));
        }

        let mut label_set: LabelSet = labels.into_iter().collect();
        label_set.insert("target", self.target.clone());

        self.lines.push(format!(
            "{}{} {}",
            family.name,
            format_labels(&label_set),
            value.render()
        ));
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value, always keeping a fractional part.
fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else {
        let rendered = value.to_string();
        if rendered.contains('.') {
            rendered
        } else {
            format!("{}.0", rendered)
        }
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &LabelSet) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const POWER: MetricFamily = MetricFamily::gauge("shelly_power_watts", "Power");
    const ENERGY: MetricFamily = MetricFamily::counter("shelly_energy", "Energy");

    #[test]
    fn test_metric_kind_as_str() {
        assert_eq!(MetricKind::Gauge.as_str(), "gauge");
        assert_eq!(MetricKind::Counter.as_str(), "counter");
    }

    #[test]
    fn test_sample_value_from_json() {
        assert_eq!(SampleValue::from_json(&json!(42)), Some(SampleValue::Int(42)));
        assert_eq!(SampleValue::from_json(&json!(-7)), Some(SampleValue::Int(-7)));
        assert_eq!(
            SampleValue::from_json(&json!(12.5)),
            Some(SampleValue::Float(12.5))
        );
        assert_eq!(
            SampleValue::from_json(&json!(true)),
            Some(SampleValue::Bool(true))
        );
        assert_eq!(SampleValue::from_json(&json!("12")), None);
        assert_eq!(SampleValue::from_json(&Value::Null), None);
        assert_eq!(SampleValue::from_json(&json!([1])), None);
    }

    #[test]
    fn test_render_values() {
        assert_eq!(SampleValue::Int(700).render(), "700");
        assert_eq!(SampleValue::Int(-200).render(), "-200");
        assert_eq!(SampleValue::Float(2.0).render(), "2.0");
        assert_eq!(SampleValue::Float(298.15).render(), "298.15");
        assert_eq!(SampleValue::Float(0.5).render(), "0.5");
        assert_eq!(SampleValue::Float(f64::NAN).render(), "NaN");
        assert_eq!(SampleValue::Float(f64::INFINITY).render(), "+Inf");
        assert_eq!(SampleValue::Float(f64::NEG_INFINITY).render(), "-Inf");
        assert_eq!(SampleValue::Bool(true).render(), "1");
        assert_eq!(SampleValue::Bool(false).render(), "0");
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_family_declared_once() {
        let mut out = Exposition::new("10.0.0.1");
        out.sample(&POWER, [("meter", "0".to_string())], SampleValue::Int(5));
        out.sample(&POWER, [("meter", "1".to_string())], SampleValue::Float(7.5));

        assert_eq!(
            out.into_lines(),
            vec![
                "# HELP shelly_power_watts Power",
                "# TYPE shelly_power_watts gauge",
                "shelly_power_watts{meter=\"0\",target=\"10.0.0.1\"} 5",
                "shelly_power_watts{meter=\"1\",target=\"10.0.0.1\"} 7.5",
            ]
        );
    }

    #[test]
    fn test_labels_sorted_and_target_enforced() {
        let mut out = Exposition::new("dev");
        out.sample(
            &ENERGY,
            [
                ("target", "spoofed".to_string()),
                ("minute", "2".to_string()),
                ("meter", "0".to_string()),
            ],
            SampleValue::Int(3),
        );

        let lines = out.into_lines();
        assert_eq!(lines[1], "# TYPE shelly_energy counter");
        assert_eq!(
            lines[2],
            "shelly_energy{meter=\"0\",minute=\"2\",target=\"dev\"} 3"
        );
    }
}

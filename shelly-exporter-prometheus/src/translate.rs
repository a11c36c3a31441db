//! Translation of Shelly status/settings documents into Prometheus samples.
//!
//! The translation is table driven: [`STEPS`] lists, in output order, which
//! part of the device documents feeds which metric family and how its value
//! and labels are derived. Anything a device does not report is skipped (or
//! defaulted where the table says so); translation never fails.

use serde_json::Value;
use shelly_common::{DeviceAddress, DeviceInfo, SettingsDocument, StatusDocument, label_text};

use crate::exposition::{Exposition, MetricFamily, SampleValue, is_truthy};

/// Metric families produced by the translator.
pub mod families {
    use crate::exposition::MetricFamily;

    pub const DEVICE_INFO: MetricFamily =
        MetricFamily::gauge("shelly_device_info", "Device information");
    pub const WIFI_RSSI: MetricFamily =
        MetricFamily::gauge("shelly_wifi_rssi", "WiFi RSSI signal strength");
    pub const WIFI_CONNECTED: MetricFamily = MetricFamily::gauge(
        "shelly_wifi_connected",
        "WiFi connection status (0=disconnected, 1=connected)",
    );
    pub const CLOUD_CONNECTED: MetricFamily = MetricFamily::gauge(
        "shelly_cloud_connected",
        "Cloud connection status (0=disconnected, 1=connected)",
    );
    pub const CLOUD_ENABLED: MetricFamily = MetricFamily::gauge(
        "shelly_cloud_enabled",
        "Cloud functionality enabled status (0=disabled, 1=enabled)",
    );
    pub const MQTT_CONNECTED: MetricFamily = MetricFamily::gauge(
        "shelly_mqtt_connected",
        "MQTT connection status (0=disconnected, 1=connected)",
    );
    pub const HAS_UPDATE: MetricFamily = MetricFamily::gauge(
        "shelly_has_update",
        "Firmware update availability (0=no update, 1=update available)",
    );
    pub const UPDATE_STATUS: MetricFamily =
        MetricFamily::gauge("shelly_update_status", "Update status information");
    pub const RAM_BYTES: MetricFamily =
        MetricFamily::gauge("shelly_ram_bytes", "RAM information in bytes");
    pub const FS_BYTES: MetricFamily =
        MetricFamily::gauge("shelly_fs_bytes", "Filesystem information in bytes");
    pub const TEMPERATURE_CELSIUS: MetricFamily = MetricFamily::gauge(
        "shelly_temperature_celsius",
        "Device temperature in Celsius",
    );
    pub const TEMPERATURE_KELVIN: MetricFamily =
        MetricFamily::gauge("shelly_temperature_kelvin", "Device temperature in Kelvin");
    pub const UPTIME: MetricFamily =
        MetricFamily::counter("shelly_uptime", "Device uptime in seconds");
    pub const RELAY_STATE: MetricFamily =
        MetricFamily::gauge("shelly_relay_state", "Relay state (0=off, 1=on)");
    pub const POWER_WATTS: MetricFamily = MetricFamily::gauge(
        "shelly_power_watts",
        "Current power consumption in watts",
    );
    pub const ENERGY_TOTAL_WATTMINUTES: MetricFamily = MetricFamily::counter(
        "shelly_energy_total_wattminutes",
        "Total energy consumption in watt-minutes",
    );
    pub const ENERGY_TOTAL_WATTHOURS: MetricFamily = MetricFamily::counter(
        "shelly_energy_total_watthours",
        "Total energy consumption in watt-hours (calculated from watt-minutes)",
    );
    pub const OVERPOWER_WATTS: MetricFamily = MetricFamily::gauge(
        "shelly_overpower_watts",
        "Overpower threshold value in watts",
    );
    pub const METER_VALID: MetricFamily = MetricFamily::gauge(
        "shelly_meter_valid",
        "Whether the meter provides valid measurements",
    );
    pub const METER_TIMESTAMP: MetricFamily = MetricFamily::gauge(
        "shelly_meter_timestamp",
        "Unix timestamp of the last meter measurement",
    );
    pub const ENERGY_WATTMINUTES: MetricFamily = MetricFamily::gauge(
        "shelly_energy_wattminutes",
        "Energy consumption per minute in watt-minutes",
    );
    pub const ENERGY_WATTHOURS: MetricFamily = MetricFamily::gauge(
        "shelly_energy_watthours",
        "Energy consumption per minute in watt-hours (calculated from watt-minutes)",
    );
    pub const MAX_POWER_WATTS: MetricFamily =
        MetricFamily::gauge("shelly_max_power_watts", "Maximum allowed power in watts");
}

use families::*;

const KELVIN_OFFSET: f64 = 273.15;
const MINUTES_PER_HOUR: f64 = 60.0;

/// Which device document a step reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    Status,
    Settings,
}

/// Unit conversion applied to a raw numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Convert {
    /// Keep the reported value and its integer/float type.
    Identity,
    /// Add a constant, yielding a float.
    Offset(f64),
    /// Divide by a constant, yielding a float.
    Divide(f64),
}

impl Convert {
    fn apply(self, value: SampleValue) -> SampleValue {
        match self {
            Convert::Identity => value,
            Convert::Offset(offset) => SampleValue::Float(value.as_f64() + offset),
            Convert::Divide(divisor) => SampleValue::Float(value.as_f64() / divisor),
        }
    }
}

/// How a sample value is derived from its source field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRule {
    /// Constant `1`; the information is carried in the labels.
    Info,
    /// Numeric value. Without a default, a missing field emits nothing.
    Number {
        convert: Convert,
        default: Option<i64>,
    },
    /// Boolean rendered as 0/1. Without a default, a missing field emits nothing.
    Flag { default: Option<bool> },
}

impl ValueRule {
    const RAW: ValueRule = ValueRule::Number {
        convert: Convert::Identity,
        default: None,
    };

    const PER_HOUR: ValueRule = ValueRule::Number {
        convert: Convert::Divide(MINUTES_PER_HOUR),
        default: None,
    };

    const FLAG_OR_FALSE: ValueRule = ValueRule::Flag {
        default: Some(false),
    };

    const FLAG: ValueRule = ValueRule::Flag { default: None };

    fn resolve(&self, raw: Option<&Value>) -> Option<SampleValue> {
        match *self {
            ValueRule::Info => Some(SampleValue::Int(1)),
            ValueRule::Number { convert, default } => match raw.filter(|v| !v.is_null()) {
                Some(value) => SampleValue::from_json(value).map(|v| convert.apply(v)),
                None => default.map(SampleValue::Int),
            },
            ValueRule::Flag { default } => match raw {
                Some(value) => Some(SampleValue::Bool(is_truthy(value))),
                None => default.map(SampleValue::Bool),
            },
        }
    }
}

/// A label whose value is read from a field next to the sample's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRule {
    pub label: &'static str,
    pub field: &'static str,
    pub default: &'static str,
}

/// Maps one field to one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRule {
    pub family: MetricFamily,
    /// Field of the enclosing object; `None` uses the enclosing value itself.
    pub field: Option<&'static str>,
    pub value: ValueRule,
    pub labels: &'static [LabelRule],
}

impl FieldRule {
    const fn field(family: MetricFamily, field: &'static str, value: ValueRule) -> Self {
        Self {
            family,
            field: Some(field),
            value,
            labels: &[],
        }
    }

    const fn value(family: MetricFamily, value: ValueRule) -> Self {
        Self {
            family,
            field: None,
            value,
            labels: &[],
        }
    }
}

/// A nested sequence inside each instance, e.g. per-minute meter counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Series {
    pub field: &'static str,
    pub index_label: &'static str,
    pub rules: &'static [FieldRule],
}

/// One step of the translation, executed in table order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// The always-present device identity sample.
    DeviceInfo,
    /// A status object; skipped unless `key` holds a JSON object.
    Section {
        key: &'static str,
        rules: &'static [FieldRule],
    },
    /// A top-level scalar; skipped unless `key` is present.
    Scalar {
        document: Document,
        key: &'static str,
        rules: &'static [FieldRule],
    },
    /// A total/free pair, emitted as `type=total|free|used`.
    Capacity {
        total: &'static str,
        free: &'static str,
        family: MetricFamily,
    },
    /// A sequence of sub-resources labeled by their zero-based index.
    Instances {
        key: &'static str,
        index_label: &'static str,
        rules: &'static [FieldRule],
        series: Option<Series>,
    },
}

/// Per-minute energy counters of a meter, most recent minute first.
const METER_COUNTERS: Series = Series {
    field: "counters",
    index_label: "minute",
    rules: &[
        FieldRule::value(ENERGY_WATTMINUTES, ValueRule::RAW),
        FieldRule::value(ENERGY_WATTHOURS, ValueRule::PER_HOUR),
    ],
};

/// The translation table, in output order.
pub const STEPS: &[Step] = &[
    Step::DeviceInfo,
    Step::Section {
        key: "wifi_sta",
        rules: &[
            FieldRule::field(
                WIFI_RSSI,
                "rssi",
                ValueRule::Number {
                    convert: Convert::Identity,
                    default: Some(0),
                },
            ),
            FieldRule {
                family: WIFI_CONNECTED,
                field: Some("connected"),
                value: ValueRule::FLAG_OR_FALSE,
                labels: &[LabelRule {
                    label: "ssid",
                    field: "ssid",
                    default: "",
                }],
            },
        ],
    },
    Step::Section {
        key: "cloud",
        rules: &[
            FieldRule::field(CLOUD_CONNECTED, "connected", ValueRule::FLAG_OR_FALSE),
            FieldRule::field(CLOUD_ENABLED, "enabled", ValueRule::FLAG_OR_FALSE),
        ],
    },
    Step::Section {
        key: "mqtt",
        rules: &[FieldRule::field(
            MQTT_CONNECTED,
            "connected",
            ValueRule::FLAG_OR_FALSE,
        )],
    },
    Step::Scalar {
        document: Document::Status,
        key: "has_update",
        rules: &[FieldRule::value(HAS_UPDATE, ValueRule::FLAG)],
    },
    Step::Section {
        key: "update",
        rules: &[FieldRule {
            family: UPDATE_STATUS,
            field: None,
            value: ValueRule::Info,
            labels: &[
                LabelRule {
                    label: "status",
                    field: "status",
                    default: "unknown",
                },
                LabelRule {
                    label: "current_version",
                    field: "old_version",
                    default: "",
                },
                LabelRule {
                    label: "new_version",
                    field: "new_version",
                    default: "",
                },
            ],
        }],
    },
    Step::Capacity {
        total: "ram_total",
        free: "ram_free",
        family: RAM_BYTES,
    },
    Step::Capacity {
        total: "fs_size",
        free: "fs_free",
        family: FS_BYTES,
    },
    Step::Scalar {
        document: Document::Status,
        key: "temperature",
        rules: &[
            FieldRule::value(TEMPERATURE_CELSIUS, ValueRule::RAW),
            FieldRule::value(
                TEMPERATURE_KELVIN,
                ValueRule::Number {
                    convert: Convert::Offset(KELVIN_OFFSET),
                    default: None,
                },
            ),
        ],
    },
    Step::Scalar {
        document: Document::Status,
        key: "uptime",
        rules: &[FieldRule::value(UPTIME, ValueRule::RAW)],
    },
    Step::Instances {
        key: "relays",
        index_label: "relay",
        rules: &[FieldRule::field(
            RELAY_STATE,
            "ison",
            ValueRule::FLAG_OR_FALSE,
        )],
        series: None,
    },
    Step::Instances {
        key: "meters",
        index_label: "meter",
        rules: &[
            FieldRule::field(POWER_WATTS, "power", ValueRule::RAW),
            FieldRule::field(ENERGY_TOTAL_WATTMINUTES, "total", ValueRule::RAW),
            FieldRule::field(ENERGY_TOTAL_WATTHOURS, "total", ValueRule::PER_HOUR),
            FieldRule::field(OVERPOWER_WATTS, "overpower", ValueRule::RAW),
            FieldRule::field(METER_VALID, "is_valid", ValueRule::FLAG),
            FieldRule::field(METER_TIMESTAMP, "timestamp", ValueRule::RAW),
        ],
        series: Some(METER_COUNTERS),
    },
    Step::Scalar {
        document: Document::Settings,
        key: "max_power",
        rules: &[FieldRule::value(MAX_POWER_WATTS, ValueRule::RAW)],
    },
];

/// Translate one device's documents into exposition lines.
///
/// Pure and deterministic: the same input always yields the same lines.
pub fn translate(
    status: &StatusDocument,
    settings: &SettingsDocument,
    address: &DeviceAddress,
) -> Vec<String> {
    let mut out = Exposition::new(address.hostname());

    for step in STEPS {
        run_step(&mut out, step, status, settings);
    }

    out.into_lines()
}

fn run_step(
    out: &mut Exposition,
    step: &Step,
    status: &StatusDocument,
    settings: &SettingsDocument,
) {
    match step {
        Step::DeviceInfo => {
            let info = DeviceInfo::from_settings(settings);
            out.sample(
                &DEVICE_INFO,
                [
                    ("type", info.device_type),
                    ("mac", info.mac),
                    ("hostname", info.hostname),
                    ("firmware", info.firmware),
                ],
                SampleValue::Int(1),
            );
        }
        Step::Section { key, rules } => {
            if let Some(section) = status.get(*key).filter(|v| v.is_object()) {
                emit_rules(out, rules, section, &[]);
            }
        }
        Step::Scalar {
            document,
            key,
            rules,
        } => {
            let doc = match document {
                Document::Status => status,
                Document::Settings => settings,
            };
            if let Some(value) = doc.get(*key) {
                emit_rules(out, rules, value, &[]);
            }
        }
        Step::Capacity {
            total,
            free,
            family,
        } => {
            let total = status.get(*total).and_then(SampleValue::from_json);
            let free = status.get(*free).and_then(SampleValue::from_json);
            if let (Some(total), Some(free)) = (total, free) {
                out.sample(family, [("type", "total".to_string())], total);
                out.sample(family, [("type", "free".to_string())], free);
                out.sample(family, [("type", "used".to_string())], used(total, free));
            }
        }
        Step::Instances {
            key,
            index_label,
            rules,
            series,
        } => {
            let Some(instances) = status.get(*key).and_then(Value::as_array) else {
                return;
            };

            for (idx, instance) in instances.iter().enumerate() {
                let base = [(*index_label, idx.to_string())];
                emit_rules(out, rules, instance, &base);

                let Some(series) = series else {
                    continue;
                };
                let Some(entries) = instance.get(series.field).and_then(Value::as_array) else {
                    continue;
                };
                for (position, entry) in entries.iter().enumerate() {
                    let labels = [
                        (*index_label, idx.to_string()),
                        (series.index_label, position.to_string()),
                    ];
                    emit_rules(out, series.rules, entry, &labels);
                }
            }
        }
    }
}

/// Evaluate field rules against `context` (an object or a scalar).
fn emit_rules(
    out: &mut Exposition,
    rules: &[FieldRule],
    context: &Value,
    base_labels: &[(&'static str, String)],
) {
    for rule in rules {
        let raw = match rule.field {
            Some(field) => context.get(field),
            None => Some(context),
        };
        let Some(value) = rule.value.resolve(raw) else {
            continue;
        };

        let mut labels = base_labels.to_vec();
        for label in rule.labels {
            let text = context
                .get(label.field)
                .and_then(label_text)
                .unwrap_or_else(|| label.default.to_string());
            labels.push((label.label, text));
        }

        out.sample(&rule.family, labels, value);
    }
}

/// `total - free`, kept integral when both sides are integers.
///
/// Not clamped: a device reporting more free than total space yields a
/// negative value.
fn used(total: SampleValue, free: SampleValue) -> SampleValue {
    match (total, free) {
        (SampleValue::Int(t), SampleValue::Int(f)) => t
            .checked_sub(f)
            .map_or_else(|| SampleValue::Float(t as f64 - f as f64), SampleValue::Int),
        _ => SampleValue::Float(total.as_f64() - free.as_f64()),
    }
}

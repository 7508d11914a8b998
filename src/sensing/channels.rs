//! Well-known sensor channel keys.
//!
//! The channel set is open: any numeric field on an incoming record becomes a
//! channel. These constants name the ones the dashboard and alerting know about.

pub const OUTSIDE_TEMP: &str = "outside_temp";
pub const TOP_TEMP: &str = "top_temp";
pub const MIDDLE_TEMP: &str = "middle_temp";
pub const BOTTOM_TEMP: &str = "bottom_temp";
pub const HUMIDITY: &str = "humidity";
pub const SMOKE_PPM: &str = "smoke_ppm";

pub const PROBE_1: &str = "probe1_temp";
pub const PROBE_2: &str = "probe2_temp";
pub const PROBE_3: &str = "probe3_temp";

pub const PROBES: [&str; 3] = [PROBE_1, PROBE_2, PROBE_3];

/// Older firmware reports the outside reading under this key.
pub const LEGACY_OUTSIDE_TEMP: &str = "internal_temp";

/// Fields of a raw record that never hold channel readings.
pub const RESERVED_FIELDS: [&str; 2] = ["session_id", "timestamp"];

/// Maps legacy aliases to their canonical key.
pub fn canonical_key(key: &str) -> &str {
    match key {
        LEGACY_OUTSIDE_TEMP => OUTSIDE_TEMP,
        other => other,
    }
}

pub fn is_temperature(key: &str) -> bool {
    key.ends_with("_temp")
}

/// "probe2_temp" -> "Probe 2". Unknown keys are returned as-is.
pub fn probe_label(probe_id: &str) -> String {
    probe_id
        .strip_prefix("probe")
        .and_then(|rest| rest.strip_suffix("_temp"))
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .map(|n| format!("Probe {n}"))
        .unwrap_or_else(|| probe_id.to_string())
}

//! Rendering helpers for display consumers.
//!
//! Probes report Fahrenheit. Gaps render as "N/A" and never as zero.

use serde::{Deserialize, Serialize};

use crate::sensing::channels::{
    self, BOTTOM_TEMP, HUMIDITY, MIDDLE_TEMP, OUTSIDE_TEMP, SMOKE_PPM, TOP_TEMP,
};
use crate::poller::{DisplaySnapshot, StatusFlag};
use crate::sensing::{Reading, SensorSample};
use crate::sessions::Liveness;

pub const NO_DATA: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "F")]
    Fahrenheit,
    #[serde(rename = "C")]
    Celsius,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
        }
    }

    pub fn convert(&self, fahrenheit: f64) -> i64 {
        let value = match self {
            TemperatureUnit::Fahrenheit => fahrenheit,
            TemperatureUnit::Celsius => (fahrenheit - 32.0) * 5.0 / 9.0,
        };
        value.round() as i64
    }
}

/// `212.0` -> "212", `250.5` -> "250.5".
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn format_temperature(reading: Reading, unit: TemperatureUnit) -> String {
    match reading {
        Reading::Value(v) => unit.convert(v).to_string(),
        Reading::NoData => NO_DATA.to_string(),
    }
}

pub fn format_plain(reading: Reading) -> String {
    match reading {
        Reading::Value(v) => format_number(v),
        Reading::NoData => NO_DATA.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPanel {
    pub timestamp: String,
    pub rows: Vec<(String, String)>,
}

impl StatusPanel {
    pub fn from_sample(sample: Option<&SensorSample>, unit: TemperatureUnit) -> Self {
        let reading = |key: &str| sample.map_or(Reading::NoData, |s| s.reading(key));
        let symbol = unit.symbol();

        let mut rows = vec![
            (format!("Outside {symbol}"), format_temperature(reading(OUTSIDE_TEMP), unit)),
            (format!("Top {symbol}"), format_temperature(reading(TOP_TEMP), unit)),
            (format!("Middle {symbol}"), format_temperature(reading(MIDDLE_TEMP), unit)),
            (format!("Bottom {symbol}"), format_temperature(reading(BOTTOM_TEMP), unit)),
            ("Humidity (%)".to_string(), format_plain(reading(HUMIDITY))),
            ("Smoke (ppm)".to_string(), format_plain(reading(SMOKE_PPM))),
        ];
        for probe in channels::PROBES {
            rows.push((
                format!("{} {symbol}", channels::probe_label(probe)),
                format_temperature(reading(probe), unit),
            ));
        }

        Self {
            timestamp: sample
                .map(|s| s.timestamp.raw.clone())
                .filter(|raw| !raw.is_empty())
                .unwrap_or_else(|| "--".to_string()),
            rows,
        }
    }

    pub fn render(&self) -> String {
        let body = self
            .rows
            .iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join(" | ");
        format!("[{}] {body}", self.timestamp)
    }
}

pub fn describe_snapshot(snapshot: &DisplaySnapshot, unit: TemperatureUnit) -> String {
    let session = snapshot
        .session
        .as_ref()
        .map_or("none", |session| session.session_id.as_str());
    let liveness = match snapshot.liveness {
        Some(Liveness::Active) => "active",
        Some(Liveness::Stale) => "stale",
        None => "unknown",
    };
    let panel = StatusPanel::from_sample(snapshot.latest(), unit).render();

    let mut line = format!("session {session} ({liveness}) {panel}");
    match &snapshot.status {
        StatusFlag::Ok => {}
        StatusFlag::Loading => line.push_str(" | loading"),
        StatusFlag::NoSession => line.push_str(" | no session yet"),
        StatusFlag::Unavailable(message) => {
            line.push_str(&format!(" | showing last readings: {message}"))
        }
    }
    if !snapshot.open_alerts.is_empty() {
        line.push_str(&format!(" | {} open alert(s)", snapshot.open_alerts.len()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::{normalize_raw, NormalizeContext, RawSample};
    use serde_json::json;

    #[test]
    fn celsius_conversion_rounds() {
        assert_eq!(TemperatureUnit::Celsius.convert(212.0), 100);
        assert_eq!(TemperatureUnit::Celsius.convert(225.0), 107);
        assert_eq!(TemperatureUnit::Fahrenheit.convert(225.4), 225);
    }

    #[test]
    fn gaps_render_as_na() {
        assert_eq!(format_temperature(Reading::NoData, TemperatureUnit::Celsius), "N/A");
        assert_eq!(format_plain(Reading::Value(41.5)), "41.5");
        assert_eq!(format_plain(Reading::Value(0.0)), "0");
    }

    #[test]
    fn panel_from_latest_sample() {
        let raw: RawSample = serde_json::from_value(json!({
            "timestamp": "20250101T120000Z",
            "top_temp": 225,
            "middle_temp": -999,
            "humidity": 40,
            "probe1_temp": 150.2
        }))
        .unwrap();
        let samples = normalize_raw(&[raw], &NormalizeContext::for_session("s", None));

        let panel = StatusPanel::from_sample(samples.first(), TemperatureUnit::Fahrenheit);
        let rendered = panel.render();

        assert!(rendered.starts_with("[20250101T120000Z]"));
        assert!(rendered.contains("Top °F: 225"));
        assert!(rendered.contains("Middle °F: N/A"));
        assert!(rendered.contains("Humidity (%): 40"));
        assert!(rendered.contains("Probe 1 °F: 150"));
        assert!(rendered.contains("Probe 3 °F: N/A"));
    }

    #[test]
    fn empty_panel() {
        let panel = StatusPanel::from_sample(None, TemperatureUnit::Celsius);
        assert_eq!(panel.timestamp, "--");
        assert!(panel.rows.iter().all(|(_, value)| value == NO_DATA));
    }

    #[test]
    fn unit_serde_uses_letters() {
        assert_eq!(serde_json::to_string(&TemperatureUnit::Celsius).unwrap(), "\"C\"");
        let unit: TemperatureUnit = serde_json::from_str("\"F\"").unwrap();
        assert_eq!(unit, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn describes_degraded_snapshot() {
        let snapshot = DisplaySnapshot {
            status: StatusFlag::Unavailable("sample fetch failed: timeout".into()),
            session: Some(crate::db::SessionRecord::pinned("20250101120000")),
            liveness: Some(Liveness::Stale),
            ..DisplaySnapshot::default()
        };

        let line = describe_snapshot(&snapshot, TemperatureUnit::Fahrenheit);

        assert!(line.starts_with("session 20250101120000 (stale) [--]"));
        assert!(line.ends_with("| showing last readings: sample fetch failed: timeout"));
    }
}

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::display::TemperatureUnit;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_SAMPLE_LIMIT: usize = 100;
const DEFAULT_SESSION_GAP_MINS: u64 = 30;
const DEFAULT_SESSION_END_MINS: u64 = 45;
const MAX_SAMPLE_LIMIT: usize = 1000;
const MAX_POLL_INTERVAL_SECS: u64 = 3600;
const MAX_SESSION_GAP_MINS: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_secs: u64,
    pub sample_limit: usize,
    pub session_gap_mins: u64,
    pub session_end_mins: u64,
    pub session_override: Option<String>,
    pub database_path: PathBuf,
    pub temperature_unit: TemperatureUnit,
    pub catalog_seed_path: Option<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            session_gap_mins: DEFAULT_SESSION_GAP_MINS,
            session_end_mins: DEFAULT_SESSION_END_MINS,
            session_override: None,
            database_path: PathBuf::from("smokegpt.sqlite3"),
            temperature_unit: TemperatureUnit::Fahrenheit,
            catalog_seed_path: None,
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn session_gap(&self) -> chrono::Duration {
        saturating_minutes(self.session_gap_mins)
    }

    pub fn session_end_after(&self) -> chrono::Duration {
        saturating_minutes(self.session_end_mins)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SMOKEGPT_POLL_SECS") {
            self.poll_interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("SMOKEGPT_POLL_SECS is not a number: {raw}"))?;
        }
        if let Some(raw) = lookup("SMOKEGPT_SAMPLE_LIMIT") {
            self.sample_limit = raw
                .trim()
                .parse()
                .with_context(|| format!("SMOKEGPT_SAMPLE_LIMIT is not a number: {raw}"))?;
        }
        if let Some(raw) = lookup("SMOKEGPT_SESSION_ID") {
            let trimmed = raw.trim();
            self.session_override = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        if let Some(raw) = lookup("SMOKEGPT_DB") {
            self.database_path = PathBuf::from(raw);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            bail!(
                "poll_interval_secs must be between 1 and {MAX_POLL_INTERVAL_SECS}, got {}",
                self.poll_interval_secs
            );
        }
        for (name, value) in [
            ("session_gap_mins", self.session_gap_mins),
            ("session_end_mins", self.session_end_mins),
        ] {
            if value == 0 || value > MAX_SESSION_GAP_MINS {
                bail!("{name} must be between 1 and {MAX_SESSION_GAP_MINS}, got {value}");
            }
        }
        if self.sample_limit == 0 || self.sample_limit > MAX_SAMPLE_LIMIT {
            bail!(
                "sample_limit must be between 1 and {MAX_SAMPLE_LIMIT}, got {}",
                self.sample_limit
            );
        }
        Ok(())
    }
}

/// Unvalidated values saturate instead of overflowing.
fn saturating_minutes(minutes: u64) -> chrono::Duration {
    i64::try_from(minutes)
        .ok()
        .and_then(chrono::Duration::try_minutes)
        .unwrap_or(chrono::Duration::MAX)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let mut data = read_settings(&path)?;
        data.apply_env(|key| std::env::var(key).ok())?;
        data.validate()?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> MonitorSettings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update_temperature_unit(&self, unit: TemperatureUnit) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.temperature_unit = unit;
        self.persist(&guard)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn read_settings(path: &Path) -> Result<MonitorSettings> {
    if !path.exists() {
        return Ok(MonitorSettings::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse settings in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: MonitorSettings =
            serde_json::from_str(r#"{"poll_interval_secs": 5}"#).unwrap();
        assert_eq!(settings.poll_interval_secs, 5);
        assert_eq!(settings.sample_limit, 100);
        assert_eq!(settings.session_gap_mins, 30);
        assert_eq!(settings.temperature_unit, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("SMOKEGPT_POLL_SECS", "5"),
            ("SMOKEGPT_SAMPLE_LIMIT", "10"),
            ("SMOKEGPT_SESSION_ID", " 20250101120000 "),
        ]
        .into_iter()
        .collect();

        let mut settings = MonitorSettings::default();
        settings
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.poll_interval_secs, 5);
        assert_eq!(settings.sample_limit, 10);
        assert_eq!(settings.session_override.as_deref(), Some("20250101120000"));
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let mut settings = MonitorSettings::default();
        let result = settings.apply_env(|key| {
            (key == "SMOKEGPT_POLL_SECS").then(|| "often".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_interval_and_huge_limit() {
        let mut settings = MonitorSettings::default();
        settings.poll_interval_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = MonitorSettings::default();
        settings.sample_limit = 5000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn oversized_gap_is_rejected_and_never_panics() {
        let settings: MonitorSettings =
            serde_json::from_str(r#"{"session_gap_mins": 1000000000000000}"#).unwrap();
        assert!(settings.validate().is_err());
        assert_eq!(settings.session_gap(), chrono::Duration::MAX);

        let settings = MonitorSettings {
            session_gap_mins: u64::MAX,
            ..MonitorSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(settings.session_gap() > chrono::Duration::zero());

        let settings = MonitorSettings {
            poll_interval_secs: 86_400,
            ..MonitorSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = MonitorSettings {
            session_end_mins: 0,
            ..MonitorSettings::default()
        };
        assert!(settings.validate().is_err());
        assert_eq!(MonitorSettings::default().session_end_after(), chrono::Duration::minutes(45));
        assert_eq!(MonitorSettings::default().session_gap(), chrono::Duration::minutes(30));
    }

    #[test]
    fn unit_change_is_persisted() {
        let dir = std::env::temp_dir().join(format!("smokegpt-settings-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("smokegpt.json");
        fs::write(&path, r#"{"sample_limit": 50}"#).unwrap();

        let store = SettingsStore::load(path.clone()).unwrap();
        assert_eq!(store.current().sample_limit, 50);

        store
            .update_temperature_unit(TemperatureUnit::Celsius)
            .unwrap();
        let reloaded = read_settings(&path).unwrap();
        assert_eq!(reloaded.temperature_unit, TemperatureUnit::Celsius);
        assert_eq!(reloaded.sample_limit, 50);

        fs::remove_dir_all(&dir).unwrap();
    }
}

//! Cooking advice for one probe, from a language model when one is wired
//! in and from simple rules over the recent readings otherwise.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;

use crate::display::{format_number, format_plain};
use crate::error::{MonitorError, MonitorResult};
use crate::sensing::channels::{
    probe_label, BOTTOM_TEMP, HUMIDITY, MIDDLE_TEMP, OUTSIDE_TEMP, SMOKE_PPM, TOP_TEMP,
};
use crate::sensing::{normalize_raw, NormalizeContext, SampleFetcher, SensorSample};
use crate::sessions::SessionStore;

const HISTORY_LIMIT: usize = 120;
const PROMPT_SAMPLES: usize = 12;
const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

const FLAT_SPREAD_F: f64 = 1.0;
const FLAT_MIN_READINGS: usize = 3;
const CHAMBER_SWING_F: f64 = 25.0;
const HUMIDITY_LOW: f64 = 30.0;
const HUMIDITY_HIGH: f64 = 85.0;

#[async_trait]
pub trait AdvisoryModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "model")]
pub enum AdviceSource {
    Model(String),
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Advice {
    pub text: String,
    pub source: AdviceSource,
}

impl Advice {
    pub fn is_fallback(&self) -> bool {
        self.source == AdviceSource::Fallback
    }
}

pub struct Advisor {
    fetcher: SampleFetcher,
    sessions: Option<Arc<dyn SessionStore>>,
    model: Option<Arc<dyn AdvisoryModel>>,
    model_timeout: Duration,
}

impl Advisor {
    pub fn new(fetcher: SampleFetcher) -> Self {
        Self {
            fetcher,
            sessions: None,
            model: None,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    /// Session records supply the start date that anchors bare `HHMMSS`
    /// timestamps.
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_model(mut self, model: Arc<dyn AdvisoryModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub async fn request_advice(&self, session_id: &str, probe_id: &str) -> MonitorResult<Advice> {
        let session_id = session_id.trim();
        let probe_id = probe_id.trim();
        if session_id.is_empty() || probe_id.is_empty() {
            return Err(MonitorError::InvalidArgument(
                "session id and probe id are required".into(),
            ));
        }

        let raw = self
            .fetcher
            .fetch_samples(session_id, HISTORY_LIMIT)
            .await
            .map_err(|err| MonitorError::AdvisoryUnavailable(err.to_string()))?;
        let samples = normalize_raw(&raw, &self.normalize_context(session_id).await);

        if let Some(model) = &self.model {
            match self.ask_model(model.as_ref(), &samples, probe_id).await {
                Ok(text) => {
                    return Ok(Advice {
                        text,
                        source: AdviceSource::Model(model.name().to_string()),
                    })
                }
                Err(err) => warn!("Advisory model {} failed, using rules: {err:#}", model.name()),
            }
        }

        fallback_advice(&samples, probe_id)
            .map(|text| Advice {
                text,
                source: AdviceSource::Fallback,
            })
            .ok_or_else(|| {
                MonitorError::AdvisoryUnavailable(format!("no readings recorded for {session_id}"))
            })
    }

    async fn normalize_context(&self, session_id: &str) -> NormalizeContext {
        let Some(sessions) = &self.sessions else {
            return NormalizeContext::for_session(session_id, None);
        };
        match tokio::time::timeout(SESSION_LOOKUP_TIMEOUT, sessions.list_sessions()).await {
            Ok(Ok(records)) => records
                .iter()
                .find(|record| record.session_id == session_id)
                .map(NormalizeContext::for_record)
                .unwrap_or_else(|| NormalizeContext::for_session(session_id, None)),
            Ok(Err(err)) => {
                warn!("Session lookup for {session_id} failed: {err:#}");
                NormalizeContext::for_session(session_id, None)
            }
            Err(_) => {
                warn!("Session lookup for {session_id} timed out");
                NormalizeContext::for_session(session_id, None)
            }
        }
    }

    async fn ask_model(
        &self,
        model: &dyn AdvisoryModel,
        samples: &[SensorSample],
        probe_id: &str,
    ) -> anyhow::Result<String> {
        let prompt = build_prompt(samples, probe_id);
        debug!("Advisory prompt for {probe_id}: {} chars", prompt.len());

        let text = tokio::time::timeout(self.model_timeout, model.complete(&prompt))
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {:?}", self.model_timeout))??;
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("empty response");
        }
        Ok(text.to_string())
    }
}

/// Prompt over the newest samples that carry data for `probe_id`.
/// `samples` must already be normalized (newest first).
pub fn build_prompt(samples: &[SensorSample], probe_id: &str) -> String {
    let lines: Vec<String> = samples
        .iter()
        .filter(|sample| sample.reading(probe_id).has_data())
        .take(PROMPT_SAMPLES)
        .map(|sample| {
            format!(
                "{}: {probe_id}={}F, top={}, mid={}, bot={}, out={}, hum={}, smoke={}",
                sample.timestamp.raw,
                format_plain(sample.reading(probe_id)),
                format_plain(sample.reading(TOP_TEMP)),
                format_plain(sample.reading(MIDDLE_TEMP)),
                format_plain(sample.reading(BOTTOM_TEMP)),
                format_plain(sample.reading(OUTSIDE_TEMP)),
                format_plain(sample.reading(HUMIDITY)),
                format_plain(sample.reading(SMOKE_PPM)),
            )
        })
        .collect();

    let series = if lines.is_empty() {
        "No recent readings for that probe.".to_string()
    } else {
        lines.join("\n")
    };

    format!(
        "You are assisting a pitmaster running a smokehouse.\n\
         Using the recent readings below, give 2 to 4 short, practical tips for the selected probe.\n\
         \n\
         Readings (newest first):\n\
         {series}\n\
         \n\
         Requirements:\n\
         - Actionable and brief.\n\
         - Flat or missing temperatures: say so and suggest checking cable seating and probe position.\n\
         - Swinging chamber temperatures: suggest vent or fire adjustments.\n\
         - Humidity or smoke out of range: suggest small corrections.\n\
         - No brand names and no emojis.\n\
         \n\
         Reply with the advice text only.\n"
    )
}

/// Rule-based tips. `None` when there is nothing at all to reason about.
pub fn fallback_advice(samples: &[SensorSample], probe_id: &str) -> Option<String> {
    if samples.is_empty() {
        return None;
    }
    let recent = &samples[..samples.len().min(PROMPT_SAMPLES)];
    let label = probe_label(probe_id);
    let mut tips = Vec::new();

    let probe_values: Vec<f64> = samples
        .iter()
        .filter_map(|sample| sample.value(probe_id))
        .take(PROMPT_SAMPLES)
        .collect();
    match spread(&probe_values) {
        None => tips.push(format!(
            "No recent readings for {label}. Check that the cable is seated and the tip sits in the thickest part of the meat."
        )),
        Some(range) if probe_values.len() >= FLAT_MIN_READINGS && range < FLAT_SPREAD_F => {
            tips.push(format!(
                "{label} has held near {}F for the last {} readings. If this is not the stall, check the probe position.",
                format_number(probe_values[0]),
                probe_values.len()
            ))
        }
        Some(_) => {}
    }

    for (zone, channel) in [("top", TOP_TEMP), ("middle", MIDDLE_TEMP), ("bottom", BOTTOM_TEMP)] {
        let values: Vec<f64> = recent.iter().filter_map(|s| s.value(channel)).collect();
        if let Some(range) = spread(&values).filter(|range| *range > CHAMBER_SWING_F) {
            tips.push(format!(
                "The {zone} of the chamber swung {}F recently. Make small vent or fire adjustments and let each one settle.",
                format_number(range.round())
            ));
            break;
        }
    }

    if let Some(humidity) = recent.iter().find_map(|s| s.value(HUMIDITY)) {
        let shown = format_number(humidity);
        if humidity < HUMIDITY_LOW {
            tips.push(format!(
                "Humidity is low at {shown}%. A water pan or a light spritz will keep the surface from drying out."
            ));
        } else if humidity > HUMIDITY_HIGH {
            tips.push(format!(
                "Humidity is high at {shown}%. Crack the exhaust a little to help the bark set."
            ));
        }
    }

    if tips.is_empty() {
        tips.push(format!(
            "Readings look steady. Hold the current fire and vent settings and keep watching {label}."
        ));
    }
    Some(tips.join("\n"))
}

fn spread(values: &[f64]) -> Option<f64> {
    let max = values.iter().copied().reduce(f64::max)?;
    let min = values.iter().copied().reduce(f64::min)?;
    Some(max - min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{RecordTime, SessionRecord};
    use crate::sensing::{RawSample, SampleStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSamples(Vec<RawSample>);

    #[async_trait]
    impl SampleStore for FixedSamples {
        async fn query_samples(&self, _session_id: &str, limit: usize) -> anyhow::Result<Vec<RawSample>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct ScriptedModel {
        reply: Option<&'static str>,
        prompts: AtomicUsize,
    }

    #[async_trait]
    impl AdvisoryModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("Readings (newest first)"));
            self.reply
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("quota exceeded"))
        }
    }

    fn raw(minute: u32, probe: Option<f64>, top: f64, humidity: f64) -> RawSample {
        serde_json::from_value(json!({
            "timestamp": format!("20250101T12{minute:02}00Z"),
            "probe1_temp": probe,
            "top_temp": top,
            "humidity": humidity
        }))
        .unwrap()
    }

    fn samples(raws: &[RawSample]) -> Vec<SensorSample> {
        normalize_raw(raws, &NormalizeContext::for_session("s1", None))
    }

    fn advisor(raws: Vec<RawSample>) -> Advisor {
        Advisor::new(SampleFetcher::new(Arc::new(FixedSamples(raws))))
    }

    #[test]
    fn prompt_uses_twelve_newest_with_data() {
        let mut raws: Vec<RawSample> = (0..20).map(|m| raw(m, Some(100.0 + m as f64), 225.0, 50.0)).collect();
        raws.push(raw(30, None, 225.0, 50.0));

        let prompt = build_prompt(&samples(&raws), "probe1_temp");

        assert_eq!(prompt.matches("probe1_temp=").count(), 12);
        assert!(prompt.contains("20250101T121900Z: probe1_temp=119F"));
        assert!(!prompt.contains("20250101T123000Z"));
        assert!(!prompt.contains("20250101T120700Z"));
    }

    #[test]
    fn prompt_without_probe_data() {
        let prompt = build_prompt(&samples(&[raw(0, None, 225.0, 50.0)]), "probe1_temp");
        assert!(prompt.contains("No recent readings for that probe."));
    }

    #[test]
    fn fallback_rules() {
        let flat: Vec<RawSample> = (0..5).map(|m| raw(m, Some(160.0), 200.0 + 10.0 * m as f64, 20.0)).collect();
        let text = fallback_advice(&samples(&flat), "probe1_temp").unwrap();
        assert!(text.contains("Probe 1 has held near 160F for the last 5 readings"));
        assert!(text.contains("top of the chamber swung 40F"));
        assert!(text.contains("Humidity is low at 20%"));

        let missing = vec![raw(0, None, 225.0, 50.0)];
        let text = fallback_advice(&samples(&missing), "probe1_temp").unwrap();
        assert!(text.starts_with("No recent readings for Probe 1"));

        let steady: Vec<RawSample> = (0..2).map(|m| raw(m, Some(150.0 + m as f64), 225.0, 50.0)).collect();
        let text = fallback_advice(&samples(&steady), "probe1_temp").unwrap();
        assert!(text.starts_with("Readings look steady"));

        assert_eq!(fallback_advice(&[], "probe1_temp"), None);
    }

    #[tokio::test]
    async fn model_answer_is_used() {
        let model = Arc::new(ScriptedModel {
            reply: Some("  Wrap at 165F.  "),
            prompts: AtomicUsize::new(0),
        });
        let advice = advisor(vec![raw(0, Some(150.0), 225.0, 50.0)])
            .with_model(model.clone())
            .request_advice("s1", "probe1_temp")
            .await
            .unwrap();

        assert_eq!(advice.text, "Wrap at 165F.");
        assert_eq!(advice.source, AdviceSource::Model("scripted".into()));
        assert_eq!(model.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_failure_falls_back() {
        let model = Arc::new(ScriptedModel {
            reply: None,
            prompts: AtomicUsize::new(0),
        });
        let advice = advisor(vec![raw(0, Some(150.0), 225.0, 50.0)])
            .with_model(model)
            .request_advice("s1", "probe1_temp")
            .await
            .unwrap();

        assert!(advice.is_fallback());
        assert!(!advice.text.is_empty());
    }

    struct FixedSessions(Vec<SessionRecord>);

    #[async_trait]
    impl SessionStore for FixedSessions {
        async fn list_sessions(&self) -> anyhow::Result<Vec<SessionRecord>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn session_start_anchors_bare_times() {
        let mut record = SessionRecord::pinned("pit-session");
        record.started_at = Some(RecordTime::Epoch(1_735_722_000));
        let raws: Vec<RawSample> = ["120000", "2025-01-01T12:00:00Z"]
            .iter()
            .map(|ts| serde_json::from_value(json!({ "timestamp": ts, "probe1_temp": 150 })).unwrap())
            .collect();

        let anchored = advisor(raws.clone()).with_sessions(Arc::new(FixedSessions(vec![record])));
        let ctx = anchored.normalize_context("pit-session").await;
        assert_eq!(ctx.anchor, chrono::NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(normalize_raw(&raws, &ctx).len(), 1);

        let unanchored = advisor(raws.clone()).normalize_context("pit-session").await;
        assert_eq!(unanchored.anchor, None);
        assert_eq!(normalize_raw(&raws, &unanchored).len(), 2);
    }

    #[tokio::test]
    async fn argument_and_availability_errors() {
        let empty_ids = advisor(Vec::new()).request_advice(" ", "probe1_temp").await;
        assert!(matches!(empty_ids, Err(MonitorError::InvalidArgument(_))));

        let no_data = advisor(Vec::new()).request_advice("s1", "probe1_temp").await;
        assert!(matches!(no_data, Err(MonitorError::AdvisoryUnavailable(_))));
    }
}

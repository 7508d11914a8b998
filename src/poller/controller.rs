use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{debug, info};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::state::{DisplaySnapshot, PollerState, PollerStatus, TickOutcome};
use super::worker::Poller;

#[derive(Clone)]
pub struct PollerController {
    poller: Arc<Poller>,
    state: Arc<Mutex<PollerState>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    period: Duration,
}

impl PollerController {
    pub fn new(poller: Arc<Poller>, period: Duration) -> Self {
        Self {
            poller,
            state: Arc::new(Mutex::new(PollerState::new())),
            ticker: Arc::new(Mutex::new(None)),
            period,
        }
    }

    pub async fn get_state(&self) -> PollerState {
        self.state.lock().await.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplaySnapshot> {
        self.poller.subscribe()
    }

    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match state.status {
                PollerStatus::Polling => bail!("poller already running"),
                PollerStatus::Stopped => bail!("poller has been stopped"),
                PollerStatus::Idle => state.begin(Utc::now()),
            }
        }

        let handle = tokio::spawn(poll_loop(
            self.poller.clone(),
            self.state.clone(),
            self.period,
            self.poller.cancellation_token(),
        ));
        *self.ticker.lock().await = Some(handle);

        info!("Poller started, every {:?}", self.period);
        Ok(())
    }

    pub async fn refresh(&self) -> TickOutcome {
        let outcome = self.poller.tick().await;
        self.state.lock().await.record_tick(outcome, Utc::now());
        outcome
    }

    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.status == PollerStatus::Stopped {
                return Ok(());
            }
            state.stop(Utc::now());
        }
        self.poller.cancel();

        if let Some(handle) = self.ticker.lock().await.take() {
            handle.await.context("poll loop task failed to join")?;
        }
        info!("Poller stopped");
        Ok(())
    }
}

async fn poll_loop(
    poller: Arc<Poller>,
    state: Arc<Mutex<PollerState>>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = poller.tick().await;
                debug!("poll tick: {outcome:?}");
                state.lock().await.record_tick(outcome, Utc::now());
            }
            _ = cancel_token.cancelled() => {
                info!("poll loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::state::StatusFlag;
    use crate::poller::worker::tests::{poller, raw, FakeStore, RecordingNotifier};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn runs_until_stopped() {
        let store = Arc::new(FakeStore::with_data("s1", vec![raw("20250101T120000Z", 150.0)]));
        let controller = PollerController::new(
            poller(&store, &Arc::new(RecordingNotifier::default())),
            Duration::from_millis(10),
        );
        let mut updates = controller.subscribe();

        controller.start().await.unwrap();
        assert!(controller.start().await.is_err());

        updates.changed().await.unwrap();
        assert_eq!(updates.borrow().status, StatusFlag::Ok);

        controller.stop().await.unwrap();
        let state = controller.get_state().await;
        assert_eq!(state.status, PollerStatus::Stopped);
        assert!(state.ticks >= 1);

        let calls = store.session_calls.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.session_calls.load(Ordering::SeqCst), calls);

        assert!(controller.start().await.is_err());
        assert_eq!(controller.refresh().await, TickOutcome::Discarded);
    }

    #[tokio::test]
    async fn stop_before_start_is_terminal() {
        let store = Arc::new(FakeStore::default());
        let controller = PollerController::new(
            poller(&store, &Arc::new(RecordingNotifier::default())),
            Duration::from_secs(15),
        );

        controller.stop().await.unwrap();
        assert!(controller.start().await.is_err());
        assert_eq!(store.session_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn manual_refresh_reports_no_session() {
        let store = Arc::new(FakeStore::default());
        let controller = PollerController::new(
            poller(&store, &Arc::new(RecordingNotifier::default())),
            Duration::from_secs(15),
        );

        assert_eq!(controller.refresh().await, TickOutcome::NoSession);
        let state = controller.get_state().await;
        assert_eq!(state.last_outcome, Some(TickOutcome::NoSession));
    }
}

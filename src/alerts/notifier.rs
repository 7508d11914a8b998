use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};

use super::evaluator::AlertEpisode;

/// Out-of-band delivery (SMS or similar).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()> {
        info!("notify {destination}: {message}");
        Ok(())
    }
}

/// Sends one message per episode, each bounded by `send_timeout`. Failures
/// are logged and do not stop the remaining deliveries. Returns how many
/// were delivered.
pub async fn dispatch_episodes(
    notifier: &dyn Notifier,
    episodes: &[AlertEpisode],
    send_timeout: Duration,
) -> usize {
    let mut delivered = 0;
    for episode in episodes {
        let message = episode.message();
        let Some(destination) = episode.destination.as_deref().filter(|d| !d.trim().is_empty())
        else {
            warn!("no contact number for {}; not sent: {message}", episode.probe_id);
            continue;
        };

        match tokio::time::timeout(send_timeout, notifier.send(destination, &message)).await {
            Ok(Ok(())) => delivered += 1,
            Ok(Err(err)) => error!(
                "failed to send alert for {} to {destination}: {err:#}",
                episode.probe_id
            ),
            Err(_) => error!(
                "alert for {} to {destination} timed out after {send_timeout:?}",
                episode.probe_id
            ),
        }
    }
    delivered
}

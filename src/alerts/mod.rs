mod evaluator;
mod notifier;

pub use evaluator::{AlertEpisode, AlertEvaluator, BreachKind, ProbeThresholds};
pub use notifier::{dispatch_episodes, LogNotifier, Notifier};

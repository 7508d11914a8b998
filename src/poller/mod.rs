mod controller;
mod state;
mod worker;

pub use controller::PollerController;
pub use state::{DisplaySnapshot, PollerState, PollerStatus, StatusFlag, TickOutcome};
pub use worker::{Poller, PollerDeps};

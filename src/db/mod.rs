mod connection;
mod helpers;
mod migrations;
mod repositories;

pub mod models;

pub use connection::{Database, DatabaseOptions};
pub use models::{ItemType, ProbeAssignment, RecordTime, SessionRecord, SessionStatus};

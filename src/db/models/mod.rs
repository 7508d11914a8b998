pub mod assignment;
pub mod item_type;
pub mod session;

pub use assignment::ProbeAssignment;
pub use item_type::ItemType;
pub use session::{RecordTime, SessionRecord, SessionStatus};

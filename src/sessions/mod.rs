mod resolver;

pub use resolver::{classify_liveness, select_latest, Liveness, SessionResolver, SessionStore};

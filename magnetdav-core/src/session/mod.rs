//! Live swarm sessions and the content lifecycle around them.

pub mod lifecycle;
pub mod registry;

pub use lifecycle::{LifecycleError, LifecycleManager, METADATA_TIMEOUT_REASON, ManagerStats};
pub use registry::{Registration, SessionRegistry};

pub mod events;
pub mod timestamp;

pub use events::{DisasterEvent, EventExtras, EventKind, UpstreamId};
pub use timestamp::UtcDateTime;

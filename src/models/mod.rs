//! Domain model for collection-route tracking.

pub mod schedule;
pub mod station;

pub use schedule::{Schedule, ScheduleSnapshot, ScheduleStatus};
pub use station::{Station, StationPatch, StationStatus};

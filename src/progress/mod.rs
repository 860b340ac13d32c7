//! Shared, side-effect-free state derivation used by every viewing surface.
//!
//! The driver tracker, the admin monitoring view and the resident view all
//! render from the same derivations here, so "which stop is the truck at"
//! and "what does a completed schedule look like" are decided once.

mod markers;
mod normalize;
mod selector;

pub use markers::{route_path, station_markers, status_color, MarkerDescriptor};
pub use normalize::{normalize, EMPTY_ROUTE_LABEL};
pub use selector::{is_last_station, select_active_station};

//! Synchronization primitives shared by the capture, tracking and render threads.
//!
//! - [`PriorityLock`]: exclusive lock with a high-priority facet for the render
//!   loop and a low-priority facet for event callbacks that mutate shared state.
//!
//! The lock deliberately does not allow concurrent readers. The view model it
//! guards is read and written in place, so the two facets only differ in how
//! they queue for the same exclusive access.

pub mod priority_lock;

pub use priority_lock::{HighFacet, HighGuard, LowFacet, LowGuard, PriorityLock};

//! Injectable abstractions for time and the shared cache tier

mod clock;
mod shared_tier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use shared_tier::{InMemorySharedTier, SharedTier, SharedValue};

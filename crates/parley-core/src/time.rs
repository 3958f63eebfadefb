//! Time abstraction for the state machines.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

/// Monotonic instant the state machines can compute deadlines with.
///
/// Implemented for any type with the right arithmetic, so both
/// `std::time::Instant` and `tokio::time::Instant` qualify.
///
/// # Invariants
///
/// - Callers MUST pass values that never decrease across calls on the same
///   state machine.
pub trait Instant:
    Copy + Ord + Send + Sync + Sub<Output = Duration> + Add<Duration, Output = Self>
{
}

impl<T> Instant for T where
    T: Copy + Ord + Send + Sync + Sub<Output = Duration> + Add<Duration, Output = T>
{
}

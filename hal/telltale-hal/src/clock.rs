//! Monotonic time source

/// Monotonic millisecond clock
///
/// The value wraps after roughly 49 days. Consumers compare instants with
/// `wrapping_sub`, so a wrap between two readings is harmless.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed point (usually boot)
    fn now_ms(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

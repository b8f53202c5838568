//! Wall-clock contract.

/// Monotonic millisecond counter supplied by the host.
///
/// Timestamps are opaque to the broker: they are recorded on store entries
/// at publish time and never interpreted.
pub trait Clock {
    fn timestamp(&self) -> u32;
}

use embassy_time::Instant;

/// What happened. Today only the data-ready interrupt exists; the enum is
/// non-exhaustive so new kinds are a forward-compatible no-op for the
/// worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum EventKind {
    /// The unit's INTN line fired: the device has data to read.
    Interrupt,
}

/// One interrupt notification, posted from interrupt context and consumed
/// by the transport task in strict arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    /// When the interrupt fired.
    pub at: Instant,
    pub kind: EventKind,
    pub unit: usize,
}

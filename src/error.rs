/// Errors returned by the public transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A unit index outside the configured unit count. Checked before any
    /// lock or hardware access.
    BadParam,
    /// A bus transaction failed. Covers both a synchronous issue failure
    /// and a fault reported by the completion path; callers cannot (and
    /// need not) tell them apart.
    Io,
}

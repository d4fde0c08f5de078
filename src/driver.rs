use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

/// Outcome of one bus transaction, reported by the driver's completion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferStatus {
    /// The transaction finished and the buffer contents are valid.
    Complete,
    /// The bus faulted mid-transaction.
    Faulted,
}

/// One-slot rendezvous between a transaction's completion interrupt and the
/// task blocked on that transaction.
///
/// Create one as a `static`, hand a reference to both the [`SharedBus`]
/// (via [`Transport::new`]) and to whatever glue runs in the bus
/// peripheral's completion/error interrupt. The interrupt side calls
/// [`finish`](Self::finish); the transacting task waits.
///
/// This is distinct from the bus lock on purpose: the lock decides whether
/// a transaction may *start*, the rendezvous reports that the started
/// transaction has *finished*.
///
/// [`SharedBus`]: crate::SharedBus
/// [`Transport::new`]: crate::Transport::new
pub struct BusCompletion<M: RawMutex> {
    done: Signal<M, TransferStatus>,
}

impl<M: RawMutex> BusCompletion<M> {
    pub const fn new() -> Self {
        Self { done: Signal::new() }
    }

    /// Report the outcome of the in-flight transaction. Interrupt-safe.
    pub fn finish(&self, status: TransferStatus) {
        self.done.signal(status);
    }

    /// Discard any stale outcome before issuing a new transaction.
    pub(crate) fn clear(&self) {
        self.done.reset();
    }

    pub(crate) async fn wait(&self) -> TransferStatus {
        self.done.wait().await
    }
}

impl<M: RawMutex> Default for BusCompletion<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Asynchronous (interrupt-driven) bus peripheral.
///
/// `start_read` / `start_write` only *issue* the transaction; the outcome
/// arrives later through the [`BusCompletion`] the driver was wired to.
/// Exactly one transaction is outstanding at a time — [`SharedBus`]
/// guarantees it, so implementations need no internal queueing.
///
/// A driver that DMAs into the read buffer must ensure the transfer has
/// stopped touching memory before it signals completion.
///
/// [`SharedBus`]: crate::SharedBus
pub trait BusDriver {
    /// Synchronous issue-failure error. Collapsed into [`Error::Io`];
    /// only its `Debug` form survives.
    ///
    /// [`Error::Io`]: crate::Error::Io
    type Error: core::fmt::Debug;

    /// Begin receiving `buf.len()` bytes from the device at `addr`
    /// (7-bit address).
    fn start_read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Begin transmitting `data` to the device at `addr`.
    fn start_write(&mut self, addr: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Tear down and reconfigure the bus peripheral.
    ///
    /// Called lazily before the first transaction after any unit reset;
    /// the device yanks the bus hard enough on reset that the peripheral's
    /// electrical state cannot be trusted afterwards.
    fn reinit(&mut self);
}

/// A physical control signal (reset or boot-select line) for one unit.
///
/// Implemented over a GPIO output in firmware; injected as a fake in tests.
/// Lines are active-low on the BNO08x, so `assert` means "drive the pin
/// low" there — implementations own that mapping.
pub trait ControlLine {
    fn assert(&mut self);
    fn deassert(&mut self);
}

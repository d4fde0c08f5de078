use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

use crate::driver::{BusCompletion, BusDriver, TransferStatus};
use crate::error::Error;

pub(crate) struct BusState<D> {
    driver: D,
    reinit_needed: bool,
}

impl<D: BusDriver> BusState<D> {
    /// Flag the bus peripheral for reinitialization before the next
    /// transaction. Set by the lifecycle controller after any unit reset.
    pub(crate) fn mark_reinit_needed(&mut self) {
        self.reinit_needed = true;
    }

    fn ensure_ready(&mut self) {
        if self.reinit_needed {
            self.driver.reinit();
            self.reinit_needed = false;
        }
    }
}

/// The blocking bus-transaction primitive.
///
/// Serializes all transactions system-wide behind one mutex, recovers the
/// bus peripheral lazily after unit resets, and turns the driver's
/// issue-then-interrupt shape into plain blocking calls. At most one
/// transaction is in flight at any time, which is what makes the single
/// shared [`BusCompletion`] sound: only the task that issued the
/// transaction can be waiting on it.
///
/// Lock waits are unbounded. Bus contention here is rare and bounded by
/// protocol design; a transaction that never completes hangs its caller.
pub struct SharedBus<M: RawMutex + 'static, D: BusDriver> {
    state: Mutex<M, BusState<D>>,
    done: &'static BusCompletion<M>,
}

impl<M: RawMutex + 'static, D: BusDriver> SharedBus<M, D> {
    /// Wrap a driver. The peripheral is assumed unconfigured: the first
    /// transaction reinitializes it.
    pub fn new(driver: D, done: &'static BusCompletion<M>) -> Self {
        Self {
            state: Mutex::new(BusState { driver, reinit_needed: true }),
            done,
        }
    }

    /// One exclusive blocking read of `buf.len()` bytes from `addr`.
    ///
    /// `buf` must be non-empty; zero-length transfers are filtered out as
    /// no-op successes at the caller layer.
    pub async fn read(&self, addr: u8, buf: &mut [u8]) -> Result<(), Error> {
        debug_assert!(!buf.is_empty());
        let mut bus = self.state.lock().await;
        bus.ensure_ready();
        self.done.clear();
        bus.driver.start_read(addr, buf).map_err(|_| Error::Io)?;
        match self.done.wait().await {
            TransferStatus::Complete => Ok(()),
            TransferStatus::Faulted => Err(Error::Io),
        }
        // Guard drop releases the bus on every path, including the early
        // return on issue failure.
    }

    /// One exclusive blocking write of `data` to `addr`.
    pub async fn write(&self, addr: u8, data: &[u8]) -> Result<(), Error> {
        debug_assert!(!data.is_empty());
        let mut bus = self.state.lock().await;
        bus.ensure_ready();
        self.done.clear();
        bus.driver.start_write(addr, data).map_err(|_| Error::Io)?;
        match self.done.wait().await {
            TransferStatus::Complete => Ok(()),
            TransferStatus::Faulted => Err(Error::Io),
        }
    }

    /// Hold the bus across a multi-step sequence that is not itself a
    /// transaction (unit reset). Lock order is registry before bus.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, M, BusState<D>> {
        self.state.lock().await
    }
}

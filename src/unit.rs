use embassy_time::Instant;

use crate::driver::ControlLine;
use crate::{MAX_TRANSFER, SHTP_HEADER_LEN};

/// Consumer of received SHTP chunks, registered per unit via
/// [`Transport::reset`](crate::Transport::reset).
///
/// Called synchronously from the transport task, so execution time here
/// directly delays the next queued event and therefore the next bus read.
/// Hand the chunk off (copy, queue) and return; do not decode in place.
pub trait FrameSink {
    /// One received chunk, header included. `at` is the data-ready
    /// interrupt's timestamp (microsecond resolution via
    /// [`Instant::as_micros`]).
    fn on_chunk(&mut self, chunk: &[u8], at: Instant);
}

/// Which firmware a unit boots into after reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootMode {
    /// Normal SH-2 operation.
    Application,
    /// The DFU bootloader, for loading new device firmware. Distinct bus
    /// address, longer boot time.
    Bootloader,
}

/// A unit's pair of mode-dependent 7-bit bus addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnitAddresses {
    pub application: u8,
    pub bootloader: u8,
}

impl UnitAddresses {
    /// BNO08x with the SA0 strap low.
    pub const BNO08X_SA0_LOW: Self = Self { application: 0x4A, bootloader: 0x28 };
    /// BNO08x with the SA0 strap high.
    pub const BNO08X_SA0_HIGH: Self = Self { application: 0x4B, bootloader: 0x29 };

    pub(crate) fn for_mode(self, mode: BootMode) -> u8 {
        match mode {
            BootMode::Application => self.application,
            BootMode::Bootloader => self.bootloader,
        }
    }
}

/// Everything the transport needs to own one physical unit.
pub struct UnitResources<L> {
    pub addresses: UnitAddresses,
    /// Reset line (RSTN). Asserted = device held in reset.
    pub reset_line: L,
    /// Boot-select line (BOOTN). Asserted at reset release = bootloader.
    pub boot_line: L,
}

/// Decode the total cargo length from an SHTP header.
///
/// The low 15 bits of the little-endian `u16` in bytes 0..2 give the
/// declared length; bit 15 is the continuation flag and is masked off.
/// `header` must be at least 2 bytes.
pub fn cargo_length(header: &[u8]) -> usize {
    (u16::from_le_bytes([header[0], header[1]]) & 0x7FFF) as usize
}

pub(crate) struct UnitState<L> {
    pub(crate) addresses: UnitAddresses,
    /// Current bus address. Valid between a completed reset and the next
    /// reset call; a read racing a reset may target a stale address and
    /// fail with `Io`, which the transport tolerates.
    pub(crate) addr: u8,
    pub(crate) sink: Option<&'static mut (dyn FrameSink + Send)>,
    pub(crate) rx_buf: [u8; MAX_TRANSFER],
    /// Bytes still owed from a partial read; 0 means the next read is a
    /// header-only probe.
    rx_remaining: usize,
    pub(crate) reset_line: L,
    pub(crate) boot_line: L,
}

impl<L: ControlLine> UnitState<L> {
    /// Take ownership of a unit's resources, holding the device in reset
    /// with the boot-select line in the application position.
    pub(crate) fn new(mut res: UnitResources<L>) -> Self {
        res.reset_line.assert();
        res.boot_line.deassert();
        Self {
            addresses: res.addresses,
            addr: res.addresses.application,
            sink: None,
            rx_buf: [0; MAX_TRANSFER],
            rx_remaining: 0,
            reset_line: res.reset_line,
            boot_line: res.boot_line,
        }
    }

    /// How many bytes the next read transaction should pull: the owed
    /// remainder, but always at least a full header and never more than
    /// one transfer.
    pub(crate) fn next_read_len(&self) -> usize {
        self.rx_remaining.clamp(SHTP_HEADER_LEN, MAX_TRANSFER)
    }

    /// Account for a completed read of `read_len` bytes into `rx_buf`.
    ///
    /// If the header declares more cargo than this read returned, the
    /// remainder is owed on the next transaction, plus a header's worth:
    /// every transaction re-reads a fresh header rather than streaming raw
    /// continuation bytes.
    pub(crate) fn apply_read(&mut self, read_len: usize) {
        let cargo = cargo_length(&self.rx_buf);
        self.rx_remaining = if cargo > read_len {
            cargo - read_len + SHTP_HEADER_LEN
        } else {
            0
        };
    }

    /// Forget any partial read. Any reset restarts the stream at a fresh
    /// header probe.
    pub(crate) fn clear_remaining(&mut self) {
        self.rx_remaining = 0;
    }
}

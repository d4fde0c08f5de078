//! Shared mock hardware for the integration tests: a scripted bus driver,
//! recording control lines, and a recording frame sink.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bno08x_transport::{
    BusCompletion, BusDriver, Config, ControlLine, FrameSink, Transport,
    TransferStatus, UnitAddresses, UnitResources, SHTP_HEADER_LEN,
};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};

pub type TestMutex = CriticalSectionRawMutex;
pub type TestTransport = Transport<TestMutex, MockDriver, MockLine, 2>;

// ---------------------------------------------------------------------------
// Mock bus driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Reinit,
    Read { addr: u8, len: usize },
    Write { addr: u8, len: usize },
}

/// The device side of the mock: one in-flight SHTP message. Every read
/// returns a fresh header declaring `remaining payload + header`, with the
/// continuation bit set on every transfer after the first, then delivers
/// as much payload as the read has room for.
#[derive(Default)]
struct DeviceModel {
    payload: Vec<u8>,
    consumed: usize,
    started: bool,
}

impl DeviceModel {
    fn fill_read(&mut self, buf: &mut [u8]) {
        buf.fill(0);
        let remaining = self.payload.len() - self.consumed;
        if remaining == 0 {
            return;
        }
        let mut declared = (remaining + SHTP_HEADER_LEN) as u16;
        if self.started {
            declared |= 0x8000;
        }
        buf[..2].copy_from_slice(&declared.to_le_bytes());
        self.started = true;

        let room = buf.len().saturating_sub(SHTP_HEADER_LEN);
        let n = room.min(remaining);
        buf[SHTP_HEADER_LEN..SHTP_HEADER_LEN + n]
            .copy_from_slice(&self.payload[self.consumed..self.consumed + n]);
        self.consumed += n;
    }
}

#[derive(Debug)]
pub struct MockIssueError;

struct Shared {
    log: StdMutex<Vec<BusOp>>,
    device: StdMutex<DeviceModel>,
    pending: AtomicBool,
    fail_next_issue: AtomicBool,
    fault_next: AtomicBool,
}

pub struct MockDriver {
    completion: &'static BusCompletion<TestMutex>,
    auto_complete: bool,
    shared: Arc<Shared>,
}

/// The test body's handle onto the mock driver's state.
#[derive(Clone)]
pub struct Probe {
    completion: &'static BusCompletion<TestMutex>,
    shared: Arc<Shared>,
}

impl MockDriver {
    pub fn new(
        completion: &'static BusCompletion<TestMutex>,
        auto_complete: bool,
    ) -> (Self, Probe) {
        let shared = Arc::new(Shared {
            log: StdMutex::new(Vec::new()),
            device: StdMutex::new(DeviceModel::default()),
            pending: AtomicBool::new(false),
            fail_next_issue: AtomicBool::new(false),
            fault_next: AtomicBool::new(false),
        });
        let probe = Probe { completion, shared: shared.clone() };
        (Self { completion, auto_complete, shared }, probe)
    }

    fn issue(&mut self, op: BusOp) -> Result<(), MockIssueError> {
        assert!(
            !self.shared.pending.swap(true, Ordering::SeqCst),
            "bus transaction issued while another is in flight"
        );
        self.shared.log.lock().unwrap().push(op);
        if self.shared.fail_next_issue.swap(false, Ordering::SeqCst) {
            self.shared.pending.store(false, Ordering::SeqCst);
            return Err(MockIssueError);
        }
        Ok(())
    }

    fn maybe_auto_complete(&self) {
        if !self.auto_complete {
            return;
        }
        let status = if self.shared.fault_next.swap(false, Ordering::SeqCst) {
            TransferStatus::Faulted
        } else {
            TransferStatus::Complete
        };
        self.shared.pending.store(false, Ordering::SeqCst);
        self.completion.finish(status);
    }
}

impl BusDriver for MockDriver {
    type Error = MockIssueError;

    fn start_read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), MockIssueError> {
        self.issue(BusOp::Read { addr, len: buf.len() })?;
        self.shared.device.lock().unwrap().fill_read(buf);
        self.maybe_auto_complete();
        Ok(())
    }

    fn start_write(&mut self, addr: u8, data: &[u8]) -> Result<(), MockIssueError> {
        self.issue(BusOp::Write { addr, len: data.len() })?;
        self.maybe_auto_complete();
        Ok(())
    }

    fn reinit(&mut self) {
        self.shared.log.lock().unwrap().push(BusOp::Reinit);
    }
}

impl Probe {
    pub fn ops(&self) -> Vec<BusOp> {
        self.shared.log.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.shared.log.lock().unwrap().clear();
    }

    pub fn in_flight(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Load one message into the mock device, replacing any previous one.
    pub fn push_message(&self, payload: &[u8]) {
        let mut device = self.shared.device.lock().unwrap();
        device.payload = payload.to_vec();
        device.consumed = 0;
        device.started = false;
    }

    pub fn fail_next_issue(&self) {
        self.shared.fail_next_issue.store(true, Ordering::SeqCst);
    }

    pub fn fault_next_transfer(&self) {
        self.shared.fault_next.store(true, Ordering::SeqCst);
    }

    /// Manual-completion mode only: finish the in-flight transaction from
    /// "interrupt context".
    pub fn complete(&self, status: TransferStatus) {
        assert!(
            self.shared.pending.swap(false, Ordering::SeqCst),
            "completion with no transaction in flight"
        );
        self.completion.finish(status);
    }
}

// ---------------------------------------------------------------------------
// Mock control lines and frame sink
// ---------------------------------------------------------------------------

/// Records every transition; `true` = asserted.
#[derive(Clone, Default)]
pub struct MockLine {
    asserted: Arc<AtomicBool>,
    transitions: Arc<StdMutex<Vec<bool>>>,
}

impl MockLine {
    pub fn is_asserted(&self) -> bool {
        self.asserted.load(Ordering::SeqCst)
    }

    pub fn transitions(&self) -> Vec<bool> {
        self.transitions.lock().unwrap().clone()
    }
}

impl ControlLine for MockLine {
    fn assert(&mut self) {
        self.asserted.store(true, Ordering::SeqCst);
        self.transitions.lock().unwrap().push(true);
    }

    fn deassert(&mut self) {
        self.asserted.store(false, Ordering::SeqCst);
        self.transitions.lock().unwrap().push(false);
    }
}

pub type ChunkLog = Arc<StdMutex<Vec<(Vec<u8>, u64)>>>;

struct RecordingSink {
    chunks: ChunkLog,
}

impl FrameSink for RecordingSink {
    fn on_chunk(&mut self, chunk: &[u8], at: Instant) {
        self.chunks.lock().unwrap().push((chunk.to_vec(), at.as_micros()));
    }
}

/// A leaked sink plus the log it records into.
pub fn recording_sink() -> (&'static mut (dyn FrameSink + Send), ChunkLog) {
    let chunks: ChunkLog = Arc::default();
    let sink: &'static mut (dyn FrameSink + Send) =
        Box::leak(Box::new(RecordingSink { chunks: chunks.clone() }));
    (sink, chunks)
}

// ---------------------------------------------------------------------------
// Rig
// ---------------------------------------------------------------------------

pub struct Rig {
    pub transport: TestTransport,
    pub probe: Probe,
    pub reset_lines: [MockLine; 2],
    pub boot_lines: [MockLine; 2],
}

/// Two units on one mock bus, with delays short enough for tests.
pub fn rig(done: &'static BusCompletion<TestMutex>, auto_complete: bool) -> Rig {
    let (driver, probe) = MockDriver::new(done, auto_complete);
    let reset_lines = [MockLine::default(), MockLine::default()];
    let boot_lines = [MockLine::default(), MockLine::default()];
    let units = [
        UnitResources {
            addresses: UnitAddresses::BNO08X_SA0_LOW,
            reset_line: reset_lines[0].clone(),
            boot_line: boot_lines[0].clone(),
        },
        UnitResources {
            addresses: UnitAddresses::BNO08X_SA0_HIGH,
            reset_line: reset_lines[1].clone(),
            boot_line: boot_lines[1].clone(),
        },
    ];
    let config = Config {
        reset_settle: Duration::from_micros(50),
        bootloader_ready: Duration::from_micros(100),
    };
    let transport = Transport::new(driver, done, units, config);
    Rig { transport, probe, reset_lines, boot_lines }
}

/// Poll the worker loop alongside `polls` cooperative yields, then drop it.
/// With an auto-completing driver every queued event is serviced within a
/// couple of polls.
pub async fn pump(transport: &TestTransport, polls: usize) {
    let ticks = async {
        for _ in 0..polls {
            embassy_futures::yield_now().await;
        }
    };
    match select(transport.run(), ticks).await {
        Either::First(_) => unreachable!(),
        Either::Second(()) => {}
    }
}

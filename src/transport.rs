use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use portable_atomic::{AtomicU32, Ordering};

use crate::bus::SharedBus;
use crate::driver::{BusCompletion, BusDriver, ControlLine};
use crate::error::Error;
use crate::event::{Event, EventKind};
use crate::unit::{BootMode, FrameSink, UnitResources, UnitState};
use crate::EVENT_QUEUE_DEPTH;

/// Lifecycle timing tunables.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// How long the reset line is held asserted.
    pub reset_settle: Duration,
    /// Additional wait after releasing reset into bootloader mode, until
    /// the DFU bootloader is ready to talk.
    pub bootloader_ready: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reset_settle: Duration::from_millis(10),
            bootloader_ready: Duration::from_millis(200),
        }
    }
}

/// The transport: event pipeline, unit registry, and lifecycle control for
/// `UNITS` sensor hubs sharing one bus.
///
/// Intended to live in a `static` (e.g. via `static_cell`) so the ISR glue
/// and the spawned worker task can both reach it. Spawn [`run`](Self::run)
/// once; call [`on_interrupt`](Self::on_interrupt) from each unit's
/// data-ready ISR; issue lifecycle and data-plane calls from any task.
///
/// Lock order throughout is unit registry before bus; the per-unit
/// blocking gates are independent of both.
pub struct Transport<M: RawMutex + 'static, D: BusDriver, L: ControlLine, const UNITS: usize> {
    bus: SharedBus<M, D>,
    units: Mutex<M, [UnitState<L>; UNITS]>,
    gates: [Signal<M, ()>; UNITS],
    events: Channel<M, Event, EVENT_QUEUE_DEPTH>,
    dropped_events: AtomicU32,
    config: Config,
}

impl<M: RawMutex + 'static, D: BusDriver, L: ControlLine, const UNITS: usize>
    Transport<M, D, L, UNITS>
{
    /// Build the transport. Every unit is held in reset with boot-select
    /// in the application position until its first [`reset`](Self::reset);
    /// the bus peripheral is reinitialized on first use.
    pub fn new(
        driver: D,
        completion: &'static BusCompletion<M>,
        units: [UnitResources<L>; UNITS],
        config: Config,
    ) -> Self {
        Self {
            bus: SharedBus::new(driver, completion),
            units: Mutex::new(units.map(UnitState::new)),
            gates: core::array::from_fn(|_| Signal::new()),
            events: Channel::new(),
            dropped_events: AtomicU32::new(0),
            config,
        }
    }

    /// Reset a unit into `mode` and register `sink` as the consumer of its
    /// received chunks (`None` deregisters; interrupts for a sink-less
    /// unit are consumed and dropped).
    ///
    /// Holds the bus for the whole sequence: a reset is not a transaction,
    /// but it must not race one. The unit's bus address is recomputed for
    /// `mode`, the control lines are sequenced with the configured delays,
    /// any partial read is forgotten, and the bus peripheral is flagged
    /// for reinitialization.
    pub async fn reset(
        &self,
        unit: usize,
        mode: BootMode,
        sink: Option<&'static mut (dyn FrameSink + Send)>,
    ) -> Result<(), Error> {
        if unit >= UNITS {
            return Err(Error::BadParam);
        }
        let mut units = self.units.lock().await;
        let mut bus = self.bus.lock().await;
        let state = &mut units[unit];

        state.sink = sink;
        state.addr = state.addresses.for_mode(mode);
        state.clear_remaining();

        state.reset_line.assert();
        match mode {
            BootMode::Bootloader => state.boot_line.assert(),
            BootMode::Application => state.boot_line.deassert(),
        }
        Timer::after(self.config.reset_settle).await;
        state.reset_line.deassert();
        if mode == BootMode::Bootloader {
            Timer::after(self.config.bootloader_ready).await;
        }

        bus.mark_reinit_needed();
        Ok(())
    }

    /// Blocking write of `data` to a unit at its current address. Empty
    /// data is a no-op success.
    pub async fn transmit(&self, unit: usize, data: &[u8]) -> Result<(), Error> {
        if unit >= UNITS {
            return Err(Error::BadParam);
        }
        if data.is_empty() {
            return Ok(());
        }
        let addr = self.units.lock().await[unit].addr;
        self.bus.write(addr, data).await
    }

    /// Blocking read of `buf.len()` bytes from a unit at its current
    /// address. Empty buffer is a no-op success.
    ///
    /// This is the raw data-plane path for callers that manage their own
    /// framing (DFU); interrupt-driven reception goes through the worker
    /// loop and the registered [`FrameSink`] instead.
    pub async fn receive(&self, unit: usize, buf: &mut [u8]) -> Result<(), Error> {
        if unit >= UNITS {
            return Err(Error::BadParam);
        }
        if buf.is_empty() {
            return Ok(());
        }
        let addr = self.units.lock().await[unit].addr;
        self.bus.read(addr, buf).await
    }

    /// Wait on a unit's blocking gate until someone calls
    /// [`unblock`](Self::unblock). Independent of the read pipeline and
    /// the bus lock; used by upstream DFU logic to pause against a unit's
    /// activity.
    pub async fn block(&self, unit: usize) -> Result<(), Error> {
        if unit >= UNITS {
            return Err(Error::BadParam);
        }
        self.gates[unit].wait().await;
        Ok(())
    }

    /// Release a unit's blocking gate. Saturating: one pending release at
    /// most, so an unblock with no waiter lets the next block pass.
    pub fn unblock(&self, unit: usize) -> Result<(), Error> {
        if unit >= UNITS {
            return Err(Error::BadParam);
        }
        self.gates[unit].signal(());
        Ok(())
    }

    /// Post a data-ready event for `unit`. Call from the INTN ISR.
    ///
    /// Never blocks. If the event queue is full the event is dropped
    /// silently apart from the [`dropped_events`](Self::dropped_events)
    /// counter; the device keeps INTN asserted while it has data, so a
    /// later interrupt retries the read.
    pub fn on_interrupt(&self, unit: usize) {
        let event = Event {
            at: Instant::now(),
            kind: EventKind::Interrupt,
            unit,
        };
        if self.events.try_send(event).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// How many interrupt events have been dropped on queue overflow since
    /// construction.
    pub fn dropped_events(&self) -> u32 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// The worker loop. Spawn exactly once; it never returns.
    ///
    /// Consumes events in strict arrival order. For each data-ready event
    /// it sizes a read from the unit's read-length state, runs the bus
    /// transaction, and hands the chunk to the unit's sink with the
    /// interrupt timestamp. Events for out-of-range units and kinds this
    /// version does not know are dropped. Errors never stop the loop.
    pub async fn run(&self) -> ! {
        loop {
            let event = self.events.receive().await;
            if event.unit >= UNITS {
                continue;
            }
            match event.kind {
                EventKind::Interrupt => self.service_interrupt(event).await,
                // Kinds this version does not know about are a no-op.
                #[allow(unreachable_patterns)]
                _ => {}
            }
        }
    }

    async fn service_interrupt(&self, event: Event) {
        let mut units = self.units.lock().await;
        let unit = &mut units[event.unit];
        if unit.sink.is_none() {
            return;
        }

        let read_len = unit.next_read_len();
        let addr = unit.addr;
        if self.bus.read(addr, &mut unit.rx_buf[..read_len]).await.is_err() {
            // Nothing is delivered for a faulted read and the owed
            // remainder is left alone; the next interrupt retries the
            // same-sized read. Retry policy beyond that belongs upstream.
            return;
        }

        unit.apply_read(read_len);
        if let Some(sink) = unit.sink.as_mut() {
            sink.on_chunk(&unit.rx_buf[..read_len], event.at);
        }
    }
}

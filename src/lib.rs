#![no_std]

//! Interrupt-driven SHTP transport layer for BNO08x (SH-2) sensor hubs.
//!
//! The BNO08x signals "data ready" with an interrupt line and exchanges
//! framed byte blocks over a shared two-wire bus. This crate provides the
//! host-side plumbing between the interrupt and a protocol decoder:
//!
//! - a bounded ISR-to-task event queue ([`Transport::on_interrupt`] posts,
//!   [`Transport::run`] consumes),
//! - a blocking bus-transaction primitive with system-wide mutual exclusion
//!   and lazy bus recovery after device resets ([`SharedBus`]),
//! - a per-unit read-length state machine that sizes each bus read from the
//!   SHTP length header, chunking long messages across transactions,
//! - unit lifecycle control (reset into application or bootloader mode,
//!   mode-dependent addressing, control-line sequencing).
//!
//! Hardware access is injected through two seams: [`BusDriver`] wraps the
//! bus peripheral's interrupt-driven receive/transmit, completing through a
//! [`BusCompletion`] rendezvous, and [`ControlLine`] drives a unit's reset
//! and boot-select pins. Both are plain traits, so the whole transport runs
//! against fakes in host tests.
//!
//! The transport is executor-agnostic: spawn [`Transport::run`] from a task
//! and call [`Transport::on_interrupt`] from the data-ready ISR. All
//! blocking waits are unbounded; a wedged bus wedges whoever is mid
//! transaction.

mod bus;
mod driver;
mod error;
mod event;
mod transport;
mod unit;

pub use bus::SharedBus;
pub use driver::{BusCompletion, BusDriver, ControlLine, TransferStatus};
pub use error::Error;
pub use event::{Event, EventKind};
pub use transport::{Config, Transport};
pub use unit::{cargo_length, BootMode, FrameSink, UnitAddresses, UnitResources};

/// Maximum number of bytes moved by a single bus transaction.
///
/// Reads of longer messages are split into chunks of at most this size;
/// each unit's receive buffer is this large.
pub const MAX_TRANSFER: usize = 128;

/// Size of the SHTP framing header that starts every transfer.
pub const SHTP_HEADER_LEN: usize = 4;

/// Capacity of the interrupt event queue. Events posted while the queue is
/// full are dropped (and counted, see [`Transport::dropped_events`]).
pub const EVENT_QUEUE_DEPTH: usize = 16;

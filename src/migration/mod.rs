//! The migration state machine.
//!
//! One worker task owns all mutable driver state and processes events
//! strictly one at a time; leadership changes, metadata publications, and a
//! periodic poll all arrive through the same serial queue.

/// The driver and its public control surface.
pub mod driver;

/// Dual-write translation of metadata deltas into legacy store writes.
mod dual_write;

/// The serial event queue.
mod event_loop;

/// Event kinds processed by the worker.
mod events;

/// The driver's last-known authority in the legacy store.
pub mod leadership;

/// Bulk replay of legacy metadata into the log.
mod replay;

/// Driver lifecycle states and the legal-transition relation.
pub mod state;

//! Application core: the wake-cycle orchestration, with no direct I/O.
//!
//! This module contains the business rules of the weather station:
//! OTA gating, rail lifecycle, acquisition, reconciliation and sink
//! fan-out.  All interaction with hardware happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without real
//! peripherals.

pub mod events;
pub mod ports;
pub mod service;

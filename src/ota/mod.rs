//! Firmware updates: when they may run ([`window`]), the partition
//! session ([`manager`]) and the bounded pull loop ([`updater`]).

pub mod manager;
pub mod updater;
pub mod window;

pub use manager::check_rollback;
#[cfg(target_os = "espidf")]
pub use manager::reboot;
pub use updater::{FirmwareUpdater, ImageOffer, ImageSource};
pub use window::{OtaDenial, OtaWindow, OtaWindowPolicy, UtcTime};

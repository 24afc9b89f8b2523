//! Sensor power rail and deep sleep.
//!
//! The rail is the one shared mutable resource of a wake cycle.  It is only
//! ever raised through [`PowerController::scoped_power_on`], which returns a
//! handle that lowers it again when released or dropped.  The handle
//! borrows the controller mutably, so a second holder cannot exist.
//!
//! ```text
//!   scoped_power_on()                         drop / release()
//!        │                                           │
//!   rail ┘‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾└──
//!        │◀── settle ──▶│◀── acquisition allowed ──▶│
//! ```

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, error, info};

use crate::error::PowerError;

pub struct PowerController<P, D> {
    pin: P,
    delay: D,
    settle: Duration,
    powered: bool,
}

impl<P: OutputPin, D: DelayNs> PowerController<P, D> {
    /// The rail is driven low immediately so a warm reset never leaves the
    /// sensors powered.
    pub fn new(mut pin: P, delay: D, settle: Duration) -> Result<Self, PowerError> {
        pin.set_low().map_err(|_| PowerError::RailDisableFailed)?;
        Ok(Self {
            pin,
            delay,
            settle,
            powered: false,
        })
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn settle_time(&self) -> Duration {
        self.settle
    }

    /// Raise the rail and block for the settle time.
    pub fn scoped_power_on(&mut self) -> Result<ScopedPowerHandle<'_, P, D>, PowerError> {
        if self.pin.set_high().is_err() {
            // Best effort: never leave a half-driven rail behind.
            let _ = self.pin.set_low();
            return Err(PowerError::RailEnableFailed);
        }
        self.powered = true;
        info!("Power: sensor rail on, settling {}ms", self.settle.as_millis());
        self.delay.delay_ms(self.settle.as_millis() as u32);
        Ok(ScopedPowerHandle {
            controller: self,
            released: false,
        })
    }

    fn power_off(&mut self) -> Result<(), PowerError> {
        self.pin.set_low().map_err(|_| PowerError::RailDisableFailed)?;
        self.powered = false;
        debug!("Power: sensor rail off");
        Ok(())
    }
}

/// Proof that the rail is up and settled.  Lowers the rail on drop.
pub struct ScopedPowerHandle<'a, P: OutputPin, D: DelayNs> {
    controller: &'a mut PowerController<P, D>,
    released: bool,
}

impl<P: OutputPin, D: DelayNs> ScopedPowerHandle<'_, P, D> {
    /// Lower the rail now and report whether that worked.  On failure the
    /// handle still owns the rail and the drop below tries once more.
    pub fn release(mut self) -> Result<(), PowerError> {
        let result = self.controller.power_off();
        self.released = result.is_ok();
        result
    }
}

impl<P: OutputPin, D: DelayNs> Drop for ScopedPowerHandle<'_, P, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.controller.power_off() {
            error!("Power: {} while dropping rail handle", e);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Deep sleep (device only)
// ───────────────────────────────────────────────────────────────

/// Arm the wake sources and enter deep sleep.  `None` for both sources
/// sleeps until reset.
#[cfg(target_os = "espidf")]
pub fn enter_deep_sleep(after: Option<Duration>, rtc_interrupt_gpio: Option<u8>) -> ! {
    use esp_idf_svc::sys::{
        esp_deep_sleep_start, esp_sleep_enable_ext0_wakeup, esp_sleep_enable_timer_wakeup,
        gpio_num_t,
    };

    unsafe {
        if let Some(d) = after {
            esp_sleep_enable_timer_wakeup(d.as_micros() as u64);
        }
        if let Some(pin) = rtc_interrupt_gpio {
            // RTC SQW is open-drain, active low.
            esp_sleep_enable_ext0_wakeup(pin as gpio_num_t, 0);
        }
        info!(
            "Power: deep sleep (timer={:?}, ext0={:?})",
            after.map(|d| d.as_secs()),
            rtc_interrupt_gpio
        );
        log::logger().flush();
        esp_deep_sleep_start()
    }
}

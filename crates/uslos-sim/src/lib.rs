//! Device simulation and interrupt dispatch core for a USLOSS-style teaching
//! kernel: a periodic clock, file-backed disks, and the dispatch loop that
//! delivers simulated interrupts to a guest kernel running in the same
//! process.
//!
//! The CPU/context-switch simulator, trap handler, alarm and terminal device
//! bodies, process APIs, and console I/O are out of scope. This crate
//! exposes them only as interface seams ([`dispatcher::Device`] for
//! alarm/terminal, a kernel-mode check closure for the façade).

pub mod clock;
pub mod device_class;
pub mod disk;
pub mod dispatcher;
pub mod error;
pub mod event_queue;
pub mod facade;

use std::path::Path;

pub use clock::ClockDevice;
pub use device_class::{DeviceClass, DevResult, DevStatus, EventArg};
pub use disk::{DiskDevice, DiskRequest, DISK_SECTOR_SIZE, DISK_TRACK_SIZE, DISK_UNITS};
pub use dispatcher::{Device, Dispatcher, InterruptVector};
pub use error::{SimError, SimResult};
pub use event_queue::{EventQueue, EventSlot};
pub use facade::DeviceRequest;

/// Owns every piece of simulator state: the event queue, interrupt vector,
/// and device table, plus the kernel-mode gate the façade enforces.
///
/// Constructed once per embedding (no global/static tables) and driven one
/// pulse at a time.
pub struct Simulator {
    dispatcher: Dispatcher,
    kernel_mode: Box<dyn FnMut() -> bool>,
}

impl Simulator {
    /// Scans `disk_dir` for `disk0`, `disk1`, … backing files and builds a
    /// simulator with no interrupt handlers installed and no alarm/terminal
    /// device plugged in. The caller must install handlers via
    /// [`Simulator::vector_mut`] before the first `tick()` that could
    /// deliver to them.
    ///
    /// `kernel_mode` models the out-of-scope CPU simulator's kernel/user
    /// mode bit; the façade traps if it returns `false`.
    pub fn new(disk_dir: &Path, kernel_mode: impl FnMut() -> bool + 'static) -> SimResult<Self> {
        let disk = DiskDevice::init(disk_dir)?;
        Ok(Simulator {
            dispatcher: Dispatcher::new(ClockDevice::new(), disk),
            kernel_mode: Box::new(kernel_mode),
        })
    }

    pub fn vector_mut(&mut self) -> &mut InterruptVector {
        self.dispatcher.vector_mut()
    }

    pub fn install_alarm_device(&mut self, device: Box<dyn Device>) {
        self.dispatcher.install_alarm_device(device);
    }

    pub fn install_term_device(&mut self, device: Box<dyn Device>) {
        self.dispatcher.install_term_device(device);
    }

    /// Advances the simulator by exactly one dispatch pulse.
    pub fn tick(&mut self) -> SimResult<()> {
        self.dispatcher.tick()
    }

    pub fn waiting(&self) -> bool {
        self.dispatcher.waiting()
    }

    /// `DeviceInput(dev, unit) -> (result, status)`. `status` is only
    /// meaningful when `result` is `DevResult::Ok`.
    pub fn input(&mut self, dev: DeviceClass, unit: usize) -> SimResult<(DevResult, Option<DevStatus>)> {
        facade::input(&mut self.dispatcher, &mut *self.kernel_mode, dev, unit)
    }

    /// `DeviceOutput(dev, unit, arg) -> result`.
    pub fn output(&mut self, dev: DeviceClass, unit: usize, arg: DeviceRequest) -> SimResult<DevResult> {
        facade::output(&mut self.dispatcher, &mut *self.kernel_mode, dev, unit, arg)
    }
}

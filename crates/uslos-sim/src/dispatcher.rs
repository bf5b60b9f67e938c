//! Alternates clock ticks and device events, invokes device action routines,
//! then the guest interrupt-vector entry.

use crate::clock::ClockDevice;
use crate::device_class::{DeviceClass, DevResult, DevStatus, EventArg};
use crate::disk::DiskDevice;
use crate::error::{SimError, SimResult};
use crate::event_queue::EventQueue;

/// The uniform action/status/request contract that the alarm and terminal
/// devices plug into. Their bodies live outside this crate — an embedder
/// supplies an implementation and installs it with
/// [`Dispatcher::install_alarm_device`] / `install_term_device`.
pub trait Device {
    fn get_status(&mut self, unit: usize) -> (DevResult, Option<DevStatus>);
    fn request(&mut self, unit: usize, queue: &mut EventQueue) -> DevResult;
    /// Returns the unit to deliver to the guest, or `None` to suppress
    /// delivery (the `-1` sentinel of the legacy device action routines).
    fn action(&mut self, arg: EventArg) -> SimResult<Option<u8>>;
}

type HandlerSlot = Option<Box<dyn FnMut(DeviceClass, EventArg)>>;

/// A table mapping device class to the guest-supplied handler. Indexed by
/// the four real device classes; `LowPri` never has a handler.
pub struct InterruptVector {
    handlers: [HandlerSlot; 4],
}

fn vector_index(dev: DeviceClass) -> usize {
    match dev {
        DeviceClass::Clock => 0,
        DeviceClass::Alarm => 1,
        DeviceClass::Disk => 2,
        DeviceClass::Term => 3,
        DeviceClass::LowPri => unreachable!("LowPri never indexes the interrupt vector"),
    }
}

impl InterruptVector {
    pub fn new() -> Self {
        InterruptVector {
            handlers: [None, None, None, None],
        }
    }

    /// Installs the guest's handler for `dev`. Must happen before the first
    /// `tick()` that could deliver to `dev`.
    pub fn install(&mut self, dev: DeviceClass, handler: impl FnMut(DeviceClass, EventArg) + 'static) {
        self.handlers[vector_index(dev)] = Some(Box::new(handler));
    }

    fn call(&mut self, dev: DeviceClass, arg: EventArg) -> SimResult<()> {
        match self.handlers[vector_index(dev)].as_mut() {
            Some(handler) => {
                handler(dev, arg);
                Ok(())
            }
            None => Err(SimError::trap(format!(
                "IntVec[{dev:?}] is NULL: no handler installed for a delivered interrupt"
            ))),
        }
    }
}

impl Default for InterruptVector {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the event queue, interrupt vector, and every device. Constructed
/// once by [`crate::Simulator`] and driven one pulse at a time via
/// [`Dispatcher::tick`].
pub struct Dispatcher {
    queue: EventQueue,
    vector: InterruptVector,
    clock: ClockDevice,
    disk: DiskDevice,
    alarm: Option<Box<dyn Device>>,
    term: Option<Box<dyn Device>>,
    tick_phase: bool,
    /// Mirrors the legacy `waiting` scheduler flag. It is reset
    /// unconditionally on any delivered device event — even a terminal
    /// "input ready" event, which the original author flagged as uncertain
    /// rather than intentional — and that behavior is preserved here rather
    /// than "fixed".
    waiting: bool,
}

impl Dispatcher {
    pub fn new(clock: ClockDevice, disk: DiskDevice) -> Self {
        Dispatcher {
            queue: EventQueue::new(),
            vector: InterruptVector::new(),
            clock,
            disk,
            alarm: None,
            term: None,
            // The first call to `tick()` toggles this to `true`, yielding a
            // clock tick as the very first pulse.
            tick_phase: false,
            waiting: true,
        }
    }

    pub fn install_alarm_device(&mut self, device: Box<dyn Device>) {
        self.alarm = Some(device);
    }

    pub fn install_term_device(&mut self, device: Box<dyn Device>) {
        self.term = Some(device);
    }

    pub fn vector_mut(&mut self) -> &mut InterruptVector {
        &mut self.vector
    }

    pub fn clock_mut(&mut self) -> &mut ClockDevice {
        &mut self.clock
    }

    pub fn disk_mut(&mut self) -> &mut DiskDevice {
        &mut self.disk
    }

    pub fn alarm_mut(&mut self) -> Option<&mut dyn Device> {
        self.alarm.as_deref_mut()
    }

    pub fn term_mut(&mut self) -> Option<&mut dyn Device> {
        self.term.as_deref_mut()
    }

    /// Disjoint borrow helper: the disk's `request()` needs the queue at
    /// the same time, but `&mut self` alone can't hand out both `disk_mut()`
    /// and `queue_mut()` without the borrow checker seeing them as
    /// conflicting through `self`.
    pub fn disk_and_queue_mut(&mut self) -> (&mut DiskDevice, &mut EventQueue) {
        (&mut self.disk, &mut self.queue)
    }

    pub fn alarm_and_queue_mut(&mut self) -> (Option<&mut dyn Device>, &mut EventQueue) {
        (self.alarm.as_deref_mut(), &mut self.queue)
    }

    pub fn term_and_queue_mut(&mut self) -> (Option<&mut dyn Device>, &mut EventQueue) {
        (self.term.as_deref_mut(), &mut self.queue)
    }

    pub fn waiting(&self) -> bool {
        self.waiting
    }

    /// One simulated dispatch pulse. Alternates strictly between a clock
    /// delivery and a device-queue pop.
    pub fn tick(&mut self) -> SimResult<()> {
        self.tick_phase = !self.tick_phase;

        if self.tick_phase {
            self.clock.action();
            tracing::trace!(dev = ?DeviceClass::Clock, "clock tick");
            return self.vector.call(DeviceClass::Clock, EventArg::None);
        }

        let (dev, arg) = self.queue.pop_current();
        if dev == DeviceClass::LowPri {
            return Ok(());
        }

        let unit = match dev {
            DeviceClass::Disk => {
                let unit = arg
                    .as_unit()
                    .ok_or_else(|| SimError::trap("disk event in queue carries no unit arg"))?;
                tracing::trace!(dev = ?dev, unit, "disk event delivered");
                Some(self.disk.action(unit as usize)? as u8)
            }
            DeviceClass::Alarm => match self.alarm.as_mut() {
                Some(device) => device.action(arg)?,
                None => {
                    return Err(SimError::trap(
                        "ALARM event in queue but no alarm device installed",
                    ))
                }
            },
            DeviceClass::Term => match self.term.as_mut() {
                Some(device) => device.action(arg)?,
                None => {
                    return Err(SimError::trap(
                        "TERM event in queue but no terminal device installed",
                    ))
                }
            },
            _ => {
                return Err(SimError::trap(format!(
                    "illegal device class {dev:?} in event queue"
                )))
            }
        };

        if let Some(unit) = unit {
            // `waiting` is cleared even for what amounts to a terminal
            // "input ready" event; the legacy source flags this as
            // uncertain rather than intentional. Preserved verbatim.
            self.waiting = false;
            self.vector.call(dev, EventArg::Unit(unit))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn no_backend_disk() -> DiskDevice {
        let dir = tempfile::tempdir().unwrap();
        DiskDevice::init(dir.path()).unwrap()
    }

    #[test]
    fn clock_alternation_with_no_device_events() {
        // 10 ticks -> 5 clock deliveries, 0 device deliveries.
        let clock_hits = Rc::new(RefCell::new(0));
        let device_hits = Rc::new(RefCell::new(0));

        let mut dispatcher = Dispatcher::new(ClockDevice::new(), no_backend_disk());
        {
            let clock_hits = clock_hits.clone();
            dispatcher
                .vector_mut()
                .install(DeviceClass::Clock, move |_, _| *clock_hits.borrow_mut() += 1);
        }
        {
            let device_hits = device_hits.clone();
            dispatcher
                .vector_mut()
                .install(DeviceClass::Disk, move |_, _| *device_hits.borrow_mut() += 1);
        }

        for _ in 0..10 {
            dispatcher.tick().unwrap();
        }

        assert_eq!(*clock_hits.borrow(), 5);
        assert_eq!(*device_hits.borrow(), 0);
    }

    #[test]
    fn first_tick_is_always_a_clock_tick() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(ClockDevice::new(), no_backend_disk());
        let hits2 = hits.clone();
        dispatcher
            .vector_mut()
            .install(DeviceClass::Clock, move |dev, _| hits2.borrow_mut().push(dev));
        dispatcher.tick().unwrap();
        assert_eq!(hits.borrow().as_slice(), &[DeviceClass::Clock]);
    }

    #[test]
    fn missing_handler_traps() {
        let mut dispatcher = Dispatcher::new(ClockDevice::new(), no_backend_disk());
        let err = dispatcher.tick().unwrap_err();
        assert!(matches!(err, SimError::Trap(_)));
    }
}

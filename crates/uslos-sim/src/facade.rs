//! The uniform `input(dev,unit)->status` / `output(dev,unit,arg)->result`
//! entry points the guest kernel sees. Both are gated by a kernel-mode
//! check injected by the (out-of-scope) CPU simulator.

use crate::device_class::{DeviceClass, DevResult, DevStatus};
use crate::disk::DiskRequest;
use crate::dispatcher::Dispatcher;
use crate::error::{SimError, SimResult};

/// The device-specific payload of an `output()` call. `Clock`'s request
/// carries no data; `Disk`'s carries the full `DiskRequest`.
#[derive(Debug, Clone, Copy)]
pub enum DeviceRequest {
    Clock,
    Disk(DiskRequest),
}

/// Returns the current status of `(dev, unit)`. Status is only meaningful
/// when the result is `DevResult::Ok`.
pub fn input(
    dispatcher: &mut Dispatcher,
    kernel_mode: &mut dyn FnMut() -> bool,
    dev: DeviceClass,
    unit: usize,
) -> SimResult<(DevResult, Option<DevStatus>)> {
    if !kernel_mode() {
        return Err(SimError::trap("device_input called outside kernel mode"));
    }

    let (result, status) = match dev {
        DeviceClass::Clock => dispatcher.clock_mut().get_status(unit),
        DeviceClass::Disk => dispatcher.disk_mut().get_status(unit),
        DeviceClass::Alarm => match dispatcher.alarm_mut() {
            Some(device) => device.get_status(unit),
            None => (DevResult::Invalid, None),
        },
        DeviceClass::Term => match dispatcher.term_mut() {
            Some(device) => device.get_status(unit),
            None => (DevResult::Invalid, None),
        },
        DeviceClass::LowPri => (DevResult::Invalid, None),
    };

    debug_assert!(
        matches!(result, DevResult::Ok | DevResult::Invalid),
        "bogus result in device_input"
    );
    Ok((result, status))
}

/// Translates an `output()` call into a request to the named device.
///
/// An illegal `dev` (in practice only the `LowPri` sentinel, which a guest
/// should never be able to name) is a fatal system assertion here, not a
/// guest-visible error — mirroring the legacy `device_output`'s uninitialized
/// `result = DEV_ERROR`, which only `DEV_OK`/`DEV_INVALID`/`DEV_BUSY` ever
/// override. `device_input`'s default is `DEV_INVALID`, which *is* in the
/// accepted set, so the same situation is merely guest-visible there — the
/// asymmetry is in the original, not a Rust artifact.
pub fn output(
    dispatcher: &mut Dispatcher,
    kernel_mode: &mut dyn FnMut() -> bool,
    dev: DeviceClass,
    unit: usize,
    arg: DeviceRequest,
) -> SimResult<DevResult> {
    if !kernel_mode() {
        return Err(SimError::trap("device_output called outside kernel mode"));
    }

    let result = match (dev, arg) {
        (DeviceClass::Clock, DeviceRequest::Clock) => dispatcher.clock_mut().request(unit),
        (DeviceClass::Disk, DeviceRequest::Disk(req)) => {
            let (disk, queue) = dispatcher.disk_and_queue_mut();
            disk.request(unit, req, queue)
        }
        (DeviceClass::Alarm, _) => {
            let (alarm, queue) = dispatcher.alarm_and_queue_mut();
            match alarm {
                Some(device) => device.request(unit, queue),
                None => DevResult::Invalid,
            }
        }
        (DeviceClass::Term, _) => {
            let (term, queue) = dispatcher.term_and_queue_mut();
            match term {
                Some(device) => device.request(unit, queue),
                None => DevResult::Invalid,
            }
        }
        (DeviceClass::LowPri, _) => {
            return Err(SimError::trap("bogus device class passed to device_output"));
        }
        _ => DevResult::Invalid,
    };

    debug_assert!(
        matches!(result, DevResult::Ok | DevResult::Invalid | DevResult::Busy),
        "bogus result in device_output"
    );
    Ok(result)
}

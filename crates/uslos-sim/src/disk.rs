//! The file-backed disk device: per-unit state machine, binary-level track/
//! sector layout, and the documented seek-delay quirk.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::device_class::{DevResult, DevStatus};
use crate::error::{SimError, SimResult};
use crate::event_queue::EventQueue;
use crate::device_class::{DeviceClass, EventArg};

/// Sector size in bytes. Fixed at compile time, matching the legacy
/// simulator's `DISK_SECTOR_SIZE`.
pub const DISK_SECTOR_SIZE: usize = 512;

/// Sectors per track. Fixed at compile time, matching the legacy
/// simulator's `DISK_TRACK_SIZE`.
pub const DISK_TRACK_SIZE: u32 = 16;

/// Number of disk units the simulator exposes. Small and configurable, but
/// not meant to be changed at runtime.
pub const DISK_UNITS: usize = 2;

pub type SectorBuf = [u8; DISK_SECTOR_SIZE];

/// A seam over the host file, so tests can substitute an in-memory backend
/// without touching the filesystem. The production path always goes through
/// [`StdFileBackend`] against a real `disk{u}` file.
pub trait DiskBackend: Send {
    fn len(&mut self) -> io::Result<u64>;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;
}

/// The production backend: a real host file opened read/write.
pub struct StdFileBackend {
    file: File,
}

impl StdFileBackend {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(StdFileBackend { file })
    }
}

impl DiskBackend for StdFileBackend {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }
}

/// An in-memory backend for tests, avoiding real disk files.
#[cfg(test)]
pub struct MemBackend {
    data: Vec<u8>,
}

#[cfg(test)]
impl MemBackend {
    pub fn new(data: Vec<u8>) -> Self {
        MemBackend { data }
    }
}

#[cfg(test)]
impl DiskBackend for MemBackend {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read past end"));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "write past end"));
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }
}

/// A pending disk operation. The buffer fields are raw pointers rather than
/// borrows: the guest memory a `Read`/`Write` targets is owned by the
/// (out-of-scope) CPU/memory simulator and must stay valid only across the
/// one-or-more device pulses between `request()` and the matching
/// `action()` — there is no safe borrow that spans that gap without
/// threading a lifetime through the whole `Simulator`.
///
/// # Safety contract
/// The pointee must remain valid and exclusively accessible for the guest's
/// current request until the corresponding `action()` call returns.
#[derive(Debug, Clone, Copy)]
pub enum DiskRequest {
    Seek { track: i32 },
    Read { sector: i32, buf: *mut SectorBuf },
    Write { sector: i32, buf: *const SectorBuf },
    Tracks { out: *mut u32 },
}

fn seek_delay(head_track: u32, target: i32) -> u8 {
    let distance = (head_track as i64 - target as i64).unsigned_abs();
    let delay = 1 + (distance % 10) as u8;
    delay.min(3)
}

fn request_delay(head_track: u32, req: &DiskRequest) -> u8 {
    match req {
        DiskRequest::Seek { track } => seek_delay(head_track, *track),
        _ => 1,
    }
}

struct DiskUnit {
    backend: Option<Box<dyn DiskBackend>>,
    tracks: u32,
    head_track: u32,
    status: DevStatus,
    pending: Option<DiskRequest>,
}

impl DiskUnit {
    fn absent() -> Self {
        DiskUnit {
            backend: None,
            tracks: 0,
            head_track: 0,
            status: DevStatus::Ready,
            pending: None,
        }
    }

    fn present(backend: Box<dyn DiskBackend>, tracks: u32) -> Self {
        DiskUnit {
            backend: Some(backend),
            tracks,
            head_track: 0,
            status: DevStatus::Ready,
            pending: None,
        }
    }
}

/// Per-unit file-backed block device with seek/read/write/tracks ops and a
/// `Ready`/`Busy`/`Error` state machine. `DiskDevice` schedules its own
/// completions onto the caller-supplied [`EventQueue`] — it never reaches
/// for ambient global state.
pub struct DiskDevice {
    units: Vec<DiskUnit>,
}

impl DiskDevice {
    /// For each unit in `[0, DISK_UNITS)`, attempts to open `disk{u}` inside
    /// `dir`. A missing or unopenable file leaves the unit absent (silently);
    /// a present file whose size is not an exact multiple of
    /// `DISK_TRACK_SIZE * DISK_SECTOR_SIZE` is logged and left absent.
    pub fn init(dir: &Path) -> SimResult<Self> {
        let mut units = Vec::with_capacity(DISK_UNITS);
        for u in 0..DISK_UNITS {
            let path = dir.join(format!("disk{u}"));
            let mut backend = match StdFileBackend::open(&path) {
                Ok(backend) => backend,
                Err(_) => {
                    units.push(DiskUnit::absent());
                    continue;
                }
            };
            let size = backend.len()?;
            let track_bytes = DISK_TRACK_SIZE as u64 * DISK_SECTOR_SIZE as u64;
            if size % track_bytes != 0 {
                tracing::warn!(unit = u, path = %path.display(), "disk has an incomplete last track");
                units.push(DiskUnit::absent());
                continue;
            }
            let tracks = (size / track_bytes) as u32;
            units.push(DiskUnit::present(Box::new(backend), tracks));
        }
        Ok(DiskDevice { units })
    }

    #[cfg(test)]
    fn from_units_for_test(units: Vec<(Box<dyn DiskBackend>, u32)>) -> Self {
        DiskDevice {
            units: units
                .into_iter()
                .map(|(backend, tracks)| DiskUnit::present(backend, tracks))
                .collect(),
        }
    }

    /// Returns `DEV_INVALID` for an out-of-range or absent unit. Otherwise
    /// returns the current status, read-to-clear: an `ERROR` status flips
    /// the stored status back to `READY` as a side effect of this call.
    pub fn get_status(&mut self, unit: usize) -> (DevResult, Option<DevStatus>) {
        let Some(slot) = self.units.get_mut(unit) else {
            return (DevResult::Invalid, None);
        };
        if slot.backend.is_none() {
            return (DevResult::Invalid, None);
        }
        let status = slot.status;
        if status == DevStatus::Error {
            slot.status = DevStatus::Ready;
        }
        (DevResult::Ok, Some(status))
    }

    /// Validates `unit`; if busy, returns `DEV_BUSY` unchanged. Otherwise
    /// marks the unit busy, stores the request, and schedules the
    /// completion on `queue`.
    pub fn request(&mut self, unit: usize, req: DiskRequest, queue: &mut EventQueue) -> DevResult {
        let Some(slot) = self.units.get_mut(unit) else {
            return DevResult::Invalid;
        };
        if slot.backend.is_none() {
            return DevResult::Invalid;
        }
        if slot.status == DevStatus::Busy {
            return DevResult::Busy;
        }
        let delay = request_delay(slot.head_track, &req);
        slot.status = DevStatus::Busy;
        slot.pending = Some(req);
        queue.schedule(DeviceClass::Disk, EventArg::Unit(unit as u8), delay);
        DevResult::Ok
    }

    /// Performs the actual host I/O synchronously and returns `unit`, so the
    /// dispatcher always delivers a disk interrupt to the guest.
    pub fn action(&mut self, unit: usize) -> SimResult<usize> {
        let slot = self.units.get_mut(unit).ok_or_else(|| {
            SimError::trap(format!("disk action on invalid unit {unit}"))
        })?;
        let req = slot
            .pending
            .take()
            .ok_or_else(|| SimError::trap(format!("disk action on unit {unit} with no pending request")))?;
        let backend = slot
            .backend
            .as_deref_mut()
            .ok_or_else(|| SimError::trap(format!("disk action on unit {unit} with no backend")))?;

        let mut status = DevStatus::Ready;
        match req {
            DiskRequest::Seek { track } => {
                if track < 0 || track as u32 >= slot.tracks {
                    status = DevStatus::Error;
                } else {
                    slot.head_track = track as u32;
                }
            }
            DiskRequest::Read { sector, buf } => {
                if sector < 0 || sector as u32 >= DISK_TRACK_SIZE {
                    status = DevStatus::Error;
                } else {
                    let offset = disk_offset(slot.head_track, sector as u32);
                    // SAFETY: per `DiskRequest`'s contract, `buf` is valid
                    // and exclusively accessible until this call returns.
                    let dest: &mut SectorBuf = unsafe { &mut *buf };
                    backend.read_at(offset, dest)?;
                }
            }
            DiskRequest::Write { sector, buf } => {
                if sector < 0 || sector as u32 >= DISK_TRACK_SIZE {
                    status = DevStatus::Error;
                } else {
                    let offset = disk_offset(slot.head_track, sector as u32);
                    // SAFETY: see `Read` above.
                    let src: &SectorBuf = unsafe { &*buf };
                    backend.write_at(offset, src)?;
                }
            }
            DiskRequest::Tracks { out } => {
                // SAFETY: see `Read` above; `out` points at a single `u32`.
                unsafe { *out = slot.tracks };
            }
        }
        slot.status = status;
        Ok(unit)
    }
}

fn disk_offset(track: u32, sector: u32) -> u64 {
    (track as u64 * DISK_TRACK_SIZE as u64 + sector as u64) * DISK_SECTOR_SIZE as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_disk(tracks: u32) -> MemBackend {
        MemBackend::new(vec![0u8; tracks as usize * DISK_TRACK_SIZE as usize * DISK_SECTOR_SIZE])
    }

    #[test]
    fn seek_delay_follows_distance_mod_ten_capped_at_three() {
        assert_eq!(seek_delay(0, 10), 1);
        assert_eq!(seek_delay(0, 11), 2);
        assert_eq!(seek_delay(0, 20), 1);
    }

    #[test]
    fn seek_out_of_range_sets_error_then_clears_to_ready() {
        let mut disk = DiskDevice::from_units_for_test(vec![(Box::new(blank_disk(2)), 2)]);
        let mut queue = EventQueue::new();
        assert_eq!(disk.request(0, DiskRequest::Seek { track: 99 }, &mut queue), DevResult::Ok);
        let (dev, arg) = queue.pop_current();
        assert_eq!(dev, DeviceClass::LowPri);
        let _ = arg;
        // advance to the scheduled tick
        let (dev, arg) = queue.pop_current();
        assert_eq!(dev, DeviceClass::Disk);
        let unit = arg.as_unit().unwrap() as usize;
        disk.action(unit).unwrap();
        assert_eq!(disk.get_status(unit), (DevResult::Ok, Some(DevStatus::Error)));
        assert_eq!(disk.get_status(unit), (DevResult::Ok, Some(DevStatus::Ready)));
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut disk = DiskDevice::from_units_for_test(vec![(Box::new(blank_disk(2)), 2)]);
        let mut queue = EventQueue::new();

        let mut write_buf: SectorBuf = [0xAB; DISK_SECTOR_SIZE];
        write_buf[0] = 0x11;
        disk.request(0, DiskRequest::Write { sector: 3, buf: &write_buf }, &mut queue);
        queue.pop_current();
        let (_, arg) = queue.pop_current();
        disk.action(arg.as_unit().unwrap() as usize).unwrap();

        let mut read_buf: SectorBuf = [0u8; DISK_SECTOR_SIZE];
        disk.request(0, DiskRequest::Read { sector: 3, buf: &mut read_buf }, &mut queue);
        queue.pop_current();
        let (_, arg) = queue.pop_current();
        disk.action(arg.as_unit().unwrap() as usize).unwrap();

        assert_eq!(read_buf, write_buf);
    }

    #[test]
    fn busy_request_is_rejected() {
        let mut disk = DiskDevice::from_units_for_test(vec![(Box::new(blank_disk(2)), 2)]);
        let mut queue = EventQueue::new();
        assert_eq!(disk.request(0, DiskRequest::Seek { track: 1 }, &mut queue), DevResult::Ok);
        assert_eq!(disk.request(0, DiskRequest::Seek { track: 1 }, &mut queue), DevResult::Busy);
    }

    #[test]
    fn invalid_unit_is_rejected() {
        let mut disk = DiskDevice::from_units_for_test(vec![(Box::new(blank_disk(2)), 2)]);
        let mut queue = EventQueue::new();
        assert_eq!(disk.get_status(7), (DevResult::Invalid, None));
        assert_eq!(
            disk.request(7, DiskRequest::Seek { track: 1 }, &mut queue),
            DevResult::Invalid
        );
    }

    #[test]
    fn tracks_op_reports_backing_file_geometry() {
        let mut disk = DiskDevice::from_units_for_test(vec![(Box::new(blank_disk(5)), 5)]);
        let mut queue = EventQueue::new();
        let mut out: u32 = 0;
        disk.request(0, DiskRequest::Tracks { out: &mut out }, &mut queue);
        queue.pop_current();
        let (_, arg) = queue.pop_current();
        disk.action(arg.as_unit().unwrap() as usize).unwrap();
        assert_eq!(out, 5);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Write sector S, read sector S back, for any valid S, on a
            // disk with a random track count.
            #[test]
            fn write_then_read_round_trips_for_any_valid_sector(
                tracks in 1u32..4,
                sector in 0u32..DISK_TRACK_SIZE,
                pattern in proptest::collection::vec(any::<u8>(), DISK_SECTOR_SIZE..=DISK_SECTOR_SIZE),
            ) {
                let mut disk = DiskDevice::from_units_for_test(vec![(Box::new(blank_disk(tracks)), tracks)]);
                let mut queue = EventQueue::new();

                let mut write_buf: SectorBuf = [0u8; DISK_SECTOR_SIZE];
                write_buf.copy_from_slice(&pattern);

                disk.request(0, DiskRequest::Write { sector: sector as i32, buf: &write_buf }, &mut queue);
                queue.pop_current();
                let (_, arg) = queue.pop_current();
                disk.action(arg.as_unit().unwrap() as usize).unwrap();

                let mut read_buf: SectorBuf = [0u8; DISK_SECTOR_SIZE];
                disk.request(0, DiskRequest::Read { sector: sector as i32, buf: &mut read_buf }, &mut queue);
                queue.pop_current();
                let (_, arg) = queue.pop_current();
                disk.action(arg.as_unit().unwrap() as usize).unwrap();

                prop_assert_eq!(read_buf, write_buf);
            }
        }
    }
}

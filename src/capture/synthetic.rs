use super::{CaptureError, CaptureSource, Frame};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Deterministic in-process camera.
///
/// Produces moving BGR gradients for a configurable set of device indices.
/// Devices marked blank open fine but never yield a frame, and
/// [`fail_every`](Self::fail_every) injects periodic read errors.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    devices: BTreeSet<u32>,
    blank: BTreeSet<u32>,
    fail_every: Option<u64>,
    frame_interval: Option<Duration>,

    open: Option<u32>,
    calls: u64,
    sequence: u64,
}

impl SyntheticCamera {
    /// A camera with a single device at index 0.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            devices: BTreeSet::from([0]),
            blank: BTreeSet::new(),
            fail_every: None,
            frame_interval: None,
            open: None,
            calls: 0,
            sequence: 0,
        }
    }

    /// Replace the set of indices that can be opened.
    pub fn with_devices(mut self, devices: &[u32]) -> Self {
        self.devices = devices.iter().copied().collect();
        self
    }

    /// Indices that open successfully but only ever return `Ok(None)`.
    pub fn with_blank_devices(mut self, blank: &[u32]) -> Self {
        for &index in blank {
            self.devices.insert(index);
            self.blank.insert(index);
        }
        self
    }

    /// Make every `n`th capture call fail. `0` disables injection.
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Sleep this long inside each capture, like a camera running at a fixed
    /// frame rate.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Pace captures at `fps` frames per second.
    pub fn with_fps(self, fps: u32) -> Self {
        if fps == 0 {
            return self;
        }
        self.with_frame_interval(Duration::from_secs(1) / fps)
    }

    pub fn open_device(&self) -> Option<u32> {
        self.open
    }

    /// Bytes in one BGR frame
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn render(&self, device: u32) -> Arc<[u8]> {
        let shift = (self.sequence as u32).wrapping_add(device.wrapping_mul(64));
        let mut data = Vec::with_capacity(self.frame_len());
        for y in 0..self.height {
            for x in 0..self.width {
                data.push((x.wrapping_add(shift) & 0xff) as u8);
                data.push((y.wrapping_add(shift) & 0xff) as u8);
                data.push(((x ^ y) & 0xff) as u8);
            }
        }
        data.into()
    }
}

impl CaptureSource for SyntheticCamera {
    type Target = u32;

    fn open(&mut self, target: &u32) -> Result<(), CaptureError> {
        self.close();
        if !self.devices.contains(target) {
            return Err(CaptureError::DeviceUnavailable(target.to_string()));
        }
        self.open = Some(*target);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn capture_one(&mut self) -> Result<Option<Frame>, CaptureError> {
        let device = self.open.ok_or(CaptureError::NotOpen)?;

        if let Some(interval) = self.frame_interval {
            thread::sleep(interval);
        }

        self.calls += 1;
        if let Some(n) = self.fail_every
            && self.calls % n == 0
        {
            return Err(CaptureError::ReadFailed(format!(
                "injected failure on call {}",
                self.calls
            )));
        }

        if self.blank.contains(&device) || self.width == 0 || self.height == 0 {
            return Ok(None);
        }

        let data = self.render(device);
        let frame = Frame::new(self.sequence, self.width, self.height, data);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.open = None;
    }
}

//! Position estimator: accelerometer samples → smoothed panel angle.

use embassy_time::{Ticker, Timer};
use heapless::Deque;
#[cfg(not(test))]
use micromath::F32Ext;

use crate::config::{TrackerConfig, ANGLE_SCALE, SAMPLE_WINDOW_LEN, SENSOR_PERIOD};
use crate::error::{Error, Result};
use crate::hal::{AccelTransport, FRAME_LEN};
use crate::state::Angle;
use crate::supervisor::Tracker;

/// Multi-byte read starting at DATAX0 (0x32), padded to a full frame.
pub const READ_DATAX: [u8; FRAME_LEN] = [0xC0 | 0x32, 0, 0, 0, 0, 0, 0];

/// Interprets reply bytes 1-2 as a little-endian two's-complement sample.
///
/// # Errors
///
/// [`Error::MalformedReply`] unless the reply is exactly one frame long.
pub fn decode_sample(reply: &[u8]) -> Result<i16> {
    match reply {
        [_, lo, hi, _, _, _, _] => Ok(i16::from_le_bytes([*lo, *hi])),
        _ => Err(Error::MalformedReply { len: reply.len() }),
    }
}

/// Fixed-capacity FIFO of corrected samples with a running sum.
pub struct SampleWindow {
    samples: Deque<i32, SAMPLE_WINDOW_LEN>,
    sum: i64,
}

impl SampleWindow {
    pub const fn new() -> Self {
        Self {
            samples: Deque::new(),
            sum: 0,
        }
    }

    /// Appends a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: i32) {
        if self.samples.is_full() {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= i64::from(oldest);
            }
        }
        if self.samples.push_back(sample).is_ok() {
            self.sum += i64::from(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.sum as f32 / self.samples.len() as f32)
    }

    /// `round(mean × scale, 1)` in degrees, before clamping.
    pub fn angle_deg(&self) -> Option<f32> {
        self.mean().map(|mean| round_tenth(mean * ANGLE_SCALE))
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

pub struct PositionEstimator {
    window: SampleWindow,
    correction: i32,
    limit_deg: i32,
}

impl PositionEstimator {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            window: SampleWindow::new(),
            correction: i32::from(config.calibration_correction),
            limit_deg: config.position_limit_deg,
        }
    }

    /// Decodes one reply, folds it into the window and returns the new angle.
    ///
    /// A malformed reply leaves the window untouched.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedReply`] from [`decode_sample`].
    pub fn ingest(&mut self, reply: &[u8]) -> Result<Angle> {
        let raw = decode_sample(reply)?;
        self.window.push(i32::from(raw) + self.correction);
        Ok(self.angle().unwrap_or(Angle::ZERO))
    }

    pub fn angle(&self) -> Option<Angle> {
        self.window
            .angle_deg()
            .map(|deg| Angle::clamped(deg, self.limit_deg))
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }
}

/// Sensor loop. Sole writer of the tracker's position.
pub async fn run<A: AccelTransport>(tracker: &Tracker, accel: &mut A) {
    let mut estimator = PositionEstimator::new(tracker.config());
    let mut ticker = Ticker::every(SENSOR_PERIOD);

    while !tracker.is_shutting_down() {
        let reply = accel.transfer(&READ_DATAX).await;
        match reply.and_then(|reply| estimator.ingest(&reply)) {
            Ok(angle) => tracker.publish_position(angle),
            Err(err) => {
                error!("accelerometer: {}", err);
                tracker.report_sensor_error(err);
                // The watchdog latches on the report; back off rather than spin on a dead bus.
                Timer::after(SENSOR_PERIOD).await;
            }
        }
        ticker.next().await;
    }
    debug!("position estimator stopped");
}

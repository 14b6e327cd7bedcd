use crate::geometry_utils::{lerp, Vec3};

pub const DEFAULT_SMOOTHING_RATE: f32 = 0.5;

/// First-order exponential low-pass filter over a stream of 3D positions.
///
/// The first sample passes through unchanged; every later sample is blended
/// with the previous output as `rate * sample + (1 - rate) * previous`.
/// Not thread-safe: one filter belongs to one interaction session.
#[derive(Debug)]
pub struct LowPassFilter {
    rate: f32,
    previous: Option<Vec3>,
}

impl LowPassFilter {
    pub fn new(rate: f32) -> Self {
        if !(rate > 0. && rate <= 1.) {
            panic!("Smoothing rate must be in the range (0, 1]");
        }
        LowPassFilter {
            rate,
            previous: None,
        }
    }

    pub fn filter(&mut self, sample: Vec3) -> Vec3 {
        let output = match self.previous {
            Some(previous) => Vec3::new(
                lerp(previous.x, sample.x, self.rate),
                lerp(previous.y, sample.y, self.rate),
                lerp(previous.z, sample.z, self.rate),
            ),
            None => sample,
        };
        self.previous = Some(output);
        output
    }

    pub fn previous(&self) -> Option<Vec3> {
        self.previous
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Default for LowPassFilter {
    fn default() -> Self {
        LowPassFilter::new(DEFAULT_SMOOTHING_RATE)
    }
}

//! # Track Time Model
//!
//! Conversions between seconds and frame positions. Seconds are converted to
//! frames with explicit rounding, and displayed times are recomputed from
//! frames wherever a frame-accurate value exists, so repeated seeks do not
//! accumulate floating-point drift.

/// Frame index nearest to `seconds` at `sample_rate`.
pub fn frame_for_time(seconds: f64, sample_rate: f64) -> i64 {
    (seconds * sample_rate).round() as i64
}

/// Time in seconds at which `frame` starts.
pub fn time_for_frame(frame: i64, sample_rate: f64) -> f64 {
    if sample_rate <= 0.0 {
        return 0.0;
    }
    frame as f64 / sample_rate
}

/// Number of whole frames covering `seconds`, never less than zero.
pub fn frames_in(seconds: f64, sample_rate: f64) -> u64 {
    frame_for_time(seconds.max(0.0), sample_rate).max(0) as u64
}

/// A frame position paired with the sample rate it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackTime {
    /// Frame index.
    pub frame: i64,
    /// Frames per second.
    pub sample_rate: u32,
}

impl TrackTime {
    /// Create a time from a frame position.
    pub fn from_frame(frame: i64, sample_rate: u32) -> Self {
        Self { frame, sample_rate }
    }

    /// Create a time from seconds, rounding to the nearest frame.
    pub fn from_seconds(seconds: f64, sample_rate: u32) -> Self {
        Self {
            frame: frame_for_time(seconds, sample_rate as f64),
            sample_rate,
        }
    }

    /// Position in seconds.
    pub fn seconds(&self) -> f64 {
        time_for_frame(self.frame, self.sample_rate as f64)
    }

    /// Duration of one frame in seconds.
    pub fn frame_period(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        1.0 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_within_one_frame() {
        let duration = 10.0;
        for rate in [22050u32, 44100, 48000, 96000] {
            let mut t = 0.0;
            while t <= duration {
                let time = TrackTime::from_seconds(t, rate);
                assert!(
                    (time.seconds() - t).abs() <= time.frame_period(),
                    "rate {rate} time {t} drifted to {}",
                    time.seconds()
                );
                t += 0.0371;
            }
        }
    }

    #[test]
    fn test_rounds_instead_of_truncating() {
        // 0.99999 frames truncates to 0 but is really frame 1
        assert_eq!(frame_for_time(0.99999 / 44100.0, 44100.0), 1);
        assert_eq!(frame_for_time(2.5, 44100.0), 110250);
    }

    #[test]
    fn test_frame_round_trip_is_exact() {
        for frame in [0i64, 1, 441, 44099, 44100, 1_234_567] {
            let seconds = time_for_frame(frame, 44100.0);
            assert_eq!(frame_for_time(seconds, 44100.0), frame);
        }
    }

    #[test]
    fn test_zero_sample_rate_is_harmless() {
        assert_eq!(time_for_frame(100, 0.0), 0.0);
        assert_eq!(TrackTime::from_frame(5, 0).frame_period(), 0.0);
        assert_eq!(frames_in(-3.0, 44100.0), 0);
    }
}

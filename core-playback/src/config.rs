//! # Scheduling Configuration
//!
//! Configuration types for the buffer schedulers and the generic decoder.

use crate::time::frames_in;
use serde::{Deserialize, Serialize};

/// Scheduler and decoder configuration.
///
/// Controls how much audio is decoded per scheduled buffer, the minimum
/// segment length handed to the output node, and seek precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Length of the buffer decoded synchronously when playback starts.
    ///
    /// Kept short so the first sound is never delayed by a long decode.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_immediate_buffer_seconds")]
    pub immediate_buffer_seconds: f64,

    /// Length of each look-ahead buffer decoded on the scheduling queue.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_deferred_buffer_seconds")]
    pub deferred_buffer_seconds: f64,

    /// Minimum number of frames in a native segment.
    ///
    /// Zero-length segments destabilize the output node, so shorter requests
    /// are stretched backward to this floor.
    ///
    /// Default: 1 frame.
    #[serde(default = "default_min_segment_frames")]
    pub min_segment_frames: i64,

    /// Gap between the usable packet and the seek target above which the
    /// first decoded packet is trimmed.
    ///
    /// Default: 0.01 seconds.
    #[serde(default = "default_seek_tolerance_seconds")]
    pub seek_tolerance_seconds: f64,

    /// Number of back-to-back packet decode failures tolerated before a
    /// decode call gives up and returns what it has.
    ///
    /// Default: 10.
    #[serde(default = "default_max_consecutive_decode_errors")]
    pub max_consecutive_decode_errors: u32,

    /// Name of the worker thread running deferred scheduling tasks.
    #[serde(default = "default_scheduler_thread_name")]
    pub scheduler_thread_name: String,

    /// Name of the thread delivering buffer completions from the output node.
    #[serde(default = "default_completion_thread_name")]
    pub completion_thread_name: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            immediate_buffer_seconds: default_immediate_buffer_seconds(),
            deferred_buffer_seconds: default_deferred_buffer_seconds(),
            min_segment_frames: default_min_segment_frames(),
            seek_tolerance_seconds: default_seek_tolerance_seconds(),
            max_consecutive_decode_errors: default_max_consecutive_decode_errors(),
            scheduler_thread_name: default_scheduler_thread_name(),
            completion_thread_name: default_completion_thread_name(),
        }
    }
}

impl SchedulingConfig {
    /// Create a configuration that starts sound as fast as possible.
    ///
    /// - Short immediate buffer (1s)
    /// - Short look-ahead buffers (3s)
    pub fn low_latency() -> Self {
        Self {
            immediate_buffer_seconds: 1.0,
            deferred_buffer_seconds: 3.0,
            ..Default::default()
        }
    }

    /// Create a configuration that favors fewer, larger decodes.
    ///
    /// - Long look-ahead buffers (30s)
    pub fn conservative() -> Self {
        Self {
            immediate_buffer_seconds: 5.0,
            deferred_buffer_seconds: 30.0,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.immediate_buffer_seconds > 0.0) {
            return Err("immediate_buffer_seconds must be > 0".to_string());
        }

        if !(self.deferred_buffer_seconds > 0.0) {
            return Err("deferred_buffer_seconds must be > 0".to_string());
        }

        if self.min_segment_frames < 1 {
            return Err("min_segment_frames must be >= 1".to_string());
        }

        if !(0.0..1.0).contains(&self.seek_tolerance_seconds) {
            return Err("seek_tolerance_seconds must be in [0.0, 1.0)".to_string());
        }

        if self.max_consecutive_decode_errors == 0 {
            return Err("max_consecutive_decode_errors must be > 0".to_string());
        }

        if self.scheduler_thread_name.is_empty() || self.completion_thread_name.is_empty() {
            return Err("thread names cannot be empty".to_string());
        }

        Ok(())
    }

    /// Number of frames in an immediate buffer at `sample_rate`.
    pub fn immediate_buffer_samples(&self, sample_rate: u32) -> usize {
        seconds_to_samples(self.immediate_buffer_seconds, sample_rate)
    }

    /// Number of frames in a deferred buffer at `sample_rate`.
    pub fn deferred_buffer_samples(&self, sample_rate: u32) -> usize {
        seconds_to_samples(self.deferred_buffer_seconds, sample_rate)
    }
}

fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    frames_in(seconds, sample_rate as f64).max(1) as usize
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_immediate_buffer_seconds() -> f64 {
    5.0
}

fn default_deferred_buffer_seconds() -> f64 {
    10.0
}

fn default_min_segment_frames() -> i64 {
    1
}

fn default_seek_tolerance_seconds() -> f64 {
    0.01
}

fn default_max_consecutive_decode_errors() -> u32 {
    10
}

fn default_scheduler_thread_name() -> String {
    "playback-scheduler".to_string()
}

fn default_completion_thread_name() -> String {
    "playback-completions".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.immediate_buffer_seconds, 5.0);
        assert_eq!(config.deferred_buffer_seconds, 10.0);
        assert_eq!(config.min_segment_frames, 1);
        assert_eq!(config.seek_tolerance_seconds, 0.01);
    }

    #[test]
    fn test_presets_are_valid() {
        let low = SchedulingConfig::low_latency();
        assert!(low.validate().is_ok());
        assert!(low.immediate_buffer_seconds < SchedulingConfig::default().immediate_buffer_seconds);

        let conservative = SchedulingConfig::conservative();
        assert!(conservative.validate().is_ok());
        assert!(
            conservative.deferred_buffer_seconds
                > SchedulingConfig::default().deferred_buffer_seconds
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = SchedulingConfig::default();

        config.immediate_buffer_seconds = 0.0;
        assert!(config.validate().is_err());
        config.immediate_buffer_seconds = f64::NAN;
        assert!(config.validate().is_err());
        config.immediate_buffer_seconds = 5.0;

        config.min_segment_frames = 0;
        assert!(config.validate().is_err());
        config.min_segment_frames = 1;

        config.seek_tolerance_seconds = 2.0;
        assert!(config.validate().is_err());
        config.seek_tolerance_seconds = 0.01;

        config.scheduler_thread_name.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_sample_calculation() {
        let config = SchedulingConfig::default();
        assert_eq!(config.immediate_buffer_samples(44100), 220500);
        assert_eq!(config.deferred_buffer_samples(44100), 441000);
        assert_eq!(config.deferred_buffer_samples(48000), 480000);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SchedulingConfig =
            serde_json::from_str(r#"{ "deferred_buffer_seconds": 20.0 }"#).unwrap();
        assert_eq!(config.deferred_buffer_seconds, 20.0);
        assert_eq!(config.immediate_buffer_seconds, 5.0);
        assert_eq!(config.scheduler_thread_name, "playback-scheduler");
    }
}

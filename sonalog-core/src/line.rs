//! Sidescan line assembly.
//!
//! A line is one reconstructed scan across the swath at a single instant:
//! the port channel's samples reversed, then the starboard channel's
//! samples, so that screen-left corresponds to port and screen-right to
//! starboard. Every sample is sanitized (NaN/Inf → 0) and the whole line is
//! normalized to [0, 1].

use serde::{Deserialize, Serialize};

use crate::gain::GainCorrector;
use crate::record::{ChannelData, Pose};

/// How raw sample magnitudes are turned into display intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// Apply the time-varying-gain ramp, then rescale to [0, 1]
    Tvg,
    /// Skip gain correction, only rescale to [0, 1]
    Raw,
}

/// Reconstruction parameters, part of the line cache key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayParams {
    pub normalization: Normalization,
    pub tvg_gain: f32,
}

impl Default for DisplayParams {
    fn default() -> Self {
        DisplayParams {
            normalization: Normalization::Tvg,
            tvg_gain: 40.0,
        }
    }
}

impl DisplayParams {
    pub fn raw() -> Self {
        DisplayParams {
            normalization: Normalization::Raw,
            ..Default::default()
        }
    }

    /// Stable cache key; gain is keyed by bit pattern so that parameter sets
    /// compare exactly, not approximately.
    pub fn cache_key(&self) -> u64 {
        let mode = match self.normalization {
            Normalization::Tvg => 1u64,
            Normalization::Raw => 2u64,
        };
        (mode << 32) | self.tvg_gain.to_bits() as u64
    }
}

/// One reconstructed scan line, immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidescanLine {
    /// Absolute timestamp in Unix epoch milliseconds
    pub timestamp_ms: u64,
    pub range_meters: f32,
    pub frequency_hz: f32,
    pub pose: Pose,
    /// Port samples reversed, then starboard samples; finite, in [0, 1]
    pub samples: Vec<f64>,
}

/// Mean intensity below this is treated as no acoustic return at all.
pub const DEGENERATE_THRESHOLD: f64 = 1e-9;

impl SidescanLine {
    /// Degenerate (all-black) lines carry no information and are filtered
    /// out of streaming queries. Normalization leaves an all-zero line
    /// untouched, so the check holds for cached lines as well.
    pub fn is_degenerate(&self) -> bool {
        if self.samples.is_empty() {
            return true;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        mean < DEGENERATE_THRESHOLD
    }
}

/// Combine one or two channel payloads into a sidescan line.
///
/// At least one channel must be present; the caller resolves pose, range
/// and frequency from the companion records before calling.
pub fn assemble_line(
    timestamp_ms: u64,
    pose: Pose,
    frequency_hz: f32,
    range_meters: f32,
    port: Option<&ChannelData>,
    starboard: Option<&ChannelData>,
    params: &DisplayParams,
    gain: &GainCorrector,
) -> SidescanLine {
    let port_len = port.map_or(0, |ch| ch.samples.len());
    let starboard_len = starboard.map_or(0, |ch| ch.samples.len());
    let mut samples = Vec::with_capacity(port_len + starboard_len);

    if let Some(ch) = port {
        let mut side: Vec<f64> = ch.samples.iter().map(|&s| s as f64).collect();
        if params.normalization == Normalization::Tvg {
            gain.apply_port(&mut side);
        }
        side.reverse();
        samples.extend_from_slice(&side);
    }
    if let Some(ch) = starboard {
        let mut side: Vec<f64> = ch.samples.iter().map(|&s| s as f64).collect();
        if params.normalization == Normalization::Tvg {
            gain.apply_starboard(&mut side);
        }
        samples.extend_from_slice(&side);
    }

    // Sanitize before finding the peak so a stray NaN/Inf cannot poison
    // the normalization.
    for sample in samples.iter_mut() {
        if !sample.is_finite() {
            *sample = 0.0;
        }
    }
    let peak = samples.iter().cloned().fold(0f64, f64::max);
    if peak > 0.0 {
        for sample in samples.iter_mut() {
            *sample /= peak;
        }
    }

    SidescanLine {
        timestamp_ms,
        range_meters,
        frequency_hz,
        pose,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(channel: u16, samples: Vec<u16>) -> ChannelData {
        ChannelData {
            channel,
            subsystem: 1,
            frequency_hz: 455_000.0,
            range_meters: 50.0,
            range_delay: 0.0,
            samples,
        }
    }

    #[test]
    fn test_port_reversed_then_starboard() {
        let port = channel(0, vec![1, 2, 3, 4]);
        let starboard = channel(1, vec![5, 6, 7, 8]);
        let gain = GainCorrector::new(40.0);

        let line = assemble_line(
            1000,
            Pose::default(),
            455_000.0,
            50.0,
            Some(&port),
            Some(&starboard),
            &DisplayParams::raw(),
            &gain,
        );

        // Normalized form of [4,3,2,1,5,6,7,8], peak 8
        let expected: Vec<f64> = [4.0, 3.0, 2.0, 1.0, 5.0, 6.0, 7.0, 8.0]
            .iter()
            .map(|s| s / 8.0)
            .collect();
        assert_eq!(line.samples, expected);
        assert_eq!(line.samples.len(), 8);
    }

    #[test]
    fn test_single_channel() {
        let starboard = channel(1, vec![2, 4]);
        let gain = GainCorrector::new(40.0);

        let line = assemble_line(
            0,
            Pose::default(),
            100_000.0,
            30.0,
            None,
            Some(&starboard),
            &DisplayParams::raw(),
            &gain,
        );
        assert_eq!(line.samples, vec![0.5, 1.0]);
    }

    #[test]
    fn test_all_zero_line_stays_zero() {
        let port = channel(0, vec![0, 0, 0]);
        let gain = GainCorrector::new(40.0);

        let line = assemble_line(
            0,
            Pose::default(),
            100_000.0,
            30.0,
            Some(&port),
            None,
            &DisplayParams::raw(),
            &gain,
        );
        assert_eq!(line.samples, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_samples_bounded_with_tvg() {
        let port = channel(0, (0..64).map(|i| (i * 1000) as u16).collect());
        let starboard = channel(1, (0..64).map(|i| 65_535 - (i * 512) as u16).collect());
        let gain = GainCorrector::new(25.0);

        let line = assemble_line(
            0,
            Pose::default(),
            455_000.0,
            50.0,
            Some(&port),
            Some(&starboard),
            &DisplayParams::default(),
            &gain,
        );
        assert_eq!(line.samples.len(), 128);
        assert!(line.samples.iter().all(|s| s.is_finite() && *s >= 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_degenerate_detection() {
        let gain = GainCorrector::new(40.0);
        let dark = assemble_line(
            0,
            Pose::default(),
            455_000.0,
            50.0,
            Some(&channel(0, vec![0, 0])),
            Some(&channel(1, vec![0, 0])),
            &DisplayParams::raw(),
            &gain,
        );
        assert!(dark.is_degenerate());

        let lit = assemble_line(
            0,
            Pose::default(),
            455_000.0,
            50.0,
            Some(&channel(0, vec![0, 0])),
            Some(&channel(1, vec![4, 4])),
            &DisplayParams::raw(),
            &gain,
        );
        assert!(!lit.is_degenerate());

        let empty = assemble_line(
            0,
            Pose::default(),
            455_000.0,
            50.0,
            Some(&channel(0, vec![])),
            None,
            &DisplayParams::raw(),
            &gain,
        );
        assert!(empty.is_degenerate());
    }

    #[test]
    fn test_cache_key_distinguishes_params() {
        let a = DisplayParams::default();
        let b = DisplayParams::raw();
        let c = DisplayParams {
            tvg_gain: 20.0,
            ..Default::default()
        };
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }
}

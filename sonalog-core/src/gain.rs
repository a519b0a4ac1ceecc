//! Time-varying-gain (TVG) correction.
//!
//! Per-sample amplification compensating for acoustic signal attenuation
//! with range. The multiplier for a normalized range position `r` in (0, 1]
//! is `10^(|30·ln(r)| / tvg_gain)`.
//!
//! Computing that per sample would put a logarithm and an exponentiation in
//! the hot path of every reconstructed line. Instead, two fixed-size lookup
//! tables (one per channel ramp) are precomputed, and applying gain becomes
//! a table lookup and a multiply per sample. The tables are rebuilt only
//! when the configured gain changes, gated by a single scalar comparison.

/// Entries per lookup table.
pub const TVG_TABLE_SIZE: usize = 10_000;

/// Direct per-sample multiplier. Reference implementation for the tables;
/// the scanner and reconstructor never call this per sample.
pub fn tvg_multiplier(r: f64, tvg_gain: f32) -> f64 {
    10f64.powf((30.0 * r.ln()).abs() / tvg_gain as f64)
}

/// Precomputed TVG lookup tables for the port and starboard ramps.
pub struct GainCorrector {
    tvg_gain: f32,
    port: Vec<f64>,
    starboard: Vec<f64>,
}

impl GainCorrector {
    pub fn new(tvg_gain: f32) -> Self {
        GainCorrector {
            tvg_gain,
            port: Self::build_table(tvg_gain),
            starboard: Self::build_table(tvg_gain),
        }
    }

    /// Entry `j` corresponds to `r = (j + 1) / TVG_TABLE_SIZE`.
    fn build_table(tvg_gain: f32) -> Vec<f64> {
        (0..TVG_TABLE_SIZE)
            .map(|j| tvg_multiplier((j + 1) as f64 / TVG_TABLE_SIZE as f64, tvg_gain))
            .collect()
    }

    pub fn tvg_gain(&self) -> f32 {
        self.tvg_gain
    }

    /// Rebuild the tables if the configured gain changed.
    pub fn ensure_gain(&mut self, tvg_gain: f32) {
        if self.tvg_gain != tvg_gain {
            self.port = Self::build_table(tvg_gain);
            self.starboard = Self::build_table(tvg_gain);
            self.tvg_gain = tvg_gain;
        }
    }

    /// Apply the port ramp in place. Sample `i` of `n` maps to
    /// `r = (i + 1) / n`, resolved through the table.
    pub fn apply_port(&self, samples: &mut [f64]) {
        Self::apply(&self.port, samples);
    }

    /// Apply the starboard ramp in place.
    pub fn apply_starboard(&self, samples: &mut [f64]) {
        Self::apply(&self.starboard, samples);
    }

    fn apply(table: &[f64], samples: &mut [f64]) {
        let n = samples.len();
        if n == 0 {
            return;
        }
        for (i, sample) in samples.iter_mut().enumerate() {
            // With more samples than table entries the scaled position
            // rounds to 0 for the leading samples; clamp to the first entry.
            let idx = ((i + 1) * TVG_TABLE_SIZE / n).clamp(1, TVG_TABLE_SIZE) - 1;
            *sample *= table[idx];
        }
    }
}

//! Fixed-point conversions between physical units (chips, Hz, cycles) and the
//! wide integer accumulators the tracking loop runs in.
//!
//! `code_phase_early` lives in chips·2^32 (64-bit, monotone), `carrier_phase`
//! in half-cycles·2^24 (signed 64-bit). NCO words programmed into the
//! correlator are narrower device registers (u32 code rate, i32 carrier
//! frequency) in the same fixed-point domain as their accumulator, so that
//! the per-sample multiply-accumulate in the update loop is a plain widening
//! integer op — never a float.

use crate::constants::{
    CODE_PHASE_FRAC_BITS, GPS_CA_CHIPPING_RATE, GPS_L1_HZ, NAP_TRACK_CARRIER_FREQ_UNITS_PER_HZ,
    NAP_TRACK_CODE_PHASE_RATE_UNITS_PER_HZ, PRN_CODE_LEN, SAMPLE_FREQ, SUBCHIP_SHIFT,
    SUBCHIP_UNITS_PER_CHIP,
};

/// Converts a chip-phase value to the `code_phase_early` fixed-point domain.
pub fn chips_to_fp(chips: f64) -> u64 {
    (chips * (1u64 << CODE_PHASE_FRAC_BITS) as f64) as u64
}

/// Folds a raw `code_phase_early` accumulator down to sub-chip resolution,
/// rolling over at exactly 1023 chips (not 1024, the next power of two).
pub fn fold_code_phase_subchip(fp: u64) -> f32 {
    let subchip_units = (fp >> SUBCHIP_SHIFT) as u32;
    let period_units = (PRN_CODE_LEN as u32) * SUBCHIP_UNITS_PER_CHIP;
    (subchip_units % period_units) as f32 / SUBCHIP_UNITS_PER_CHIP as f32
}

/// Converts a device code-rate NCO word to Hz.
pub fn code_rate_hz_to_fp(hz: f64) -> u32 {
    (hz * NAP_TRACK_CODE_PHASE_RATE_UNITS_PER_HZ).round() as u32
}

/// Converts a device carrier-frequency NCO word to Hz.
pub fn carr_freq_hz_to_fp(hz: f64) -> i32 {
    (hz * NAP_TRACK_CARRIER_FREQ_UNITS_PER_HZ).round() as i32
}

/// Expected early code phase (chips, sub-chip resolution) after `n_samples`
/// at the current carrier aiding, starting from `phase_chips`.
///
/// The NCO word driving the propagation is `(1 + fdop/GPS_L1_HZ) *
/// NOMINAL_NCO_RATE`, i.e. the nominal C/A chipping rate aided by the
/// fractional Doppler offset implied by `carrier_freq_hz`.
pub fn propagate_code_phase(phase_chips: f32, carrier_freq_hz: f64, n_samples: u32) -> f32 {
    let code_rate_hz = GPS_CA_CHIPPING_RATE * (1.0 + carrier_freq_hz / GPS_L1_HZ);
    let nco_word = code_rate_hz_to_fp(code_rate_hz) as u64;

    let start_fp = chips_to_fp(phase_chips as f64);
    let end_fp = start_fp.wrapping_add(nco_word.wrapping_mul(n_samples as u64));

    fold_code_phase_subchip(end_fp)
}

/// Converts the carrier NCO's per-sample device units to an equivalent
/// frequency in Hz — the inverse of [`carr_freq_hz_to_fp`]. Used by the
/// false-lock corrector and tests to reason about NCO words in Hz.
pub fn carr_freq_fp_to_hz(fp: i32) -> f64 {
    fp as f64 / NAP_TRACK_CARRIER_FREQ_UNITS_PER_HZ
}

/// Converts a device code-rate NCO word back to Hz — the inverse of
/// [`code_rate_hz_to_fp`].
pub fn code_rate_fp_to_hz(fp: u32) -> f64 {
    fp as f64 / NAP_TRACK_CODE_PHASE_RATE_UNITS_PER_HZ
}

/// Samples corresponding to half a C/A chip at the nominal chipping rate —
/// the offset `init` subtracts from the acquisition hand-off's sample count
/// to align the channel to the early (rather than prompt) code rollover.
pub fn early_rollover_sample_offset() -> u64 {
    (SAMPLE_FREQ / GPS_CA_CHIPPING_RATE / 2.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagate_zero_samples_is_identity() {
        let p = propagate_code_phase(512.3125, 0.0, 0);
        assert!((p - 512.3125).abs() < 1.0 / SUBCHIP_UNITS_PER_CHIP as f32);
    }

    #[test]
    fn propagate_rolls_over_at_1023_not_1024() {
        // one sample's worth of phase beyond the nominal chipping rate is
        // roughly GPS_CA_CHIPPING_RATE / SAMPLE_FREQ chips; pick N so we
        // cross the 1023-chip boundary starting just below it.
        let nominal_chips_per_sample = GPS_CA_CHIPPING_RATE / SAMPLE_FREQ;
        let n = (1.0 / nominal_chips_per_sample).ceil() as u32 + 1;
        let p = propagate_code_phase(1022.9, 0.0, n);
        assert!((0.0..1.0).contains(&p), "expected wrapped phase, got {p}");
    }

    #[test]
    fn fold_handles_large_accumulators() {
        let fp = chips_to_fp(2000.5);
        let folded = fold_code_phase_subchip(fp);
        assert!((folded - (2000.5 - 1023.0)).abs() < 1.0 / SUBCHIP_UNITS_PER_CHIP as f32);
    }

    #[test]
    fn code_rate_round_trips_through_device_units() {
        let fp = code_rate_hz_to_fp(GPS_CA_CHIPPING_RATE);
        let hz = fp as f64 / NAP_TRACK_CODE_PHASE_RATE_UNITS_PER_HZ;
        assert!((hz - GPS_CA_CHIPPING_RATE).abs() < 1.0);
    }

    #[test]
    fn carrier_freq_round_trips_through_device_units() {
        let fp = carr_freq_hz_to_fp(1234.5);
        let hz = carr_freq_fp_to_hz(fp);
        assert!((hz - 1234.5).abs() < 0.01);
    }

    #[test]
    fn half_chip_offset_is_eight_samples() {
        assert_eq!(early_rollover_sample_offset(), 8);
    }

    #[test]
    fn folded_phase_stays_in_range_across_random_inputs() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let phase: f32 = rng.gen_range(0.0..PRN_CODE_LEN as f32);
            let carrier_freq_hz: f64 = rng.gen_range(-5000.0..5000.0);
            let n_samples: u32 = rng.gen_range(0..20_000);
            let folded = propagate_code_phase(phase, carrier_freq_hz, n_samples);
            assert!(
                (0.0..PRN_CODE_LEN as f32).contains(&folded),
                "folded phase {folded} out of range for phase={phase} carrier={carrier_freq_hz} n={n_samples}"
            );
        }
    }
}

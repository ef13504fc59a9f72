//! Physical and fixed-point constants shared across the tracking core.

/// GPS L1 carrier frequency, Hz.
pub const GPS_L1_HZ: f64 = 1_575_420_000.0;

/// GPS C/A code chipping rate, Hz.
pub const GPS_CA_CHIPPING_RATE: f64 = 1_023_000.0;

/// Length of the GPS C/A code, in chips.
pub const PRN_CODE_LEN: f64 = 1023.0;

/// Correlator sampling frequency, Hz. Matches a typical NAP front-end clock.
pub const SAMPLE_FREQ: f64 = 16_368_000.0;

/// Number of GPS satellites the lock-counter table and PRN range cover.
pub const MAX_SATS: usize = 32;

/// Default number of hardware correlator channels.
pub const N_CHANNELS: usize = 12;

/// Fractional bits of `code_phase_early`: chips * 2^32.
pub const CODE_PHASE_FRAC_BITS: u32 = 32;

/// Fractional bits of `carrier_phase`: half-cycles * 2^24.
pub const CARRIER_PHASE_FRAC_BITS: u32 = 24;

/// Sub-chip resolution bits retained after folding `code_phase_early`: 1/16 chip.
pub const SUBCHIP_BITS: u32 = 4;

/// Shift to go from the full `code_phase_early` accumulator down to sub-chip units.
pub const SUBCHIP_SHIFT: u32 = CODE_PHASE_FRAC_BITS - SUBCHIP_BITS;

/// Sub-chip units per chip (16).
pub const SUBCHIP_UNITS_PER_CHIP: u32 = 1 << SUBCHIP_BITS;

/// NAP code-phase-rate register units per Hz of code rate.
pub const NAP_TRACK_CODE_PHASE_RATE_UNITS_PER_HZ: f64 =
    (1u64 << CODE_PHASE_FRAC_BITS) as f64 / SAMPLE_FREQ;

/// NAP code-phase register units per chip (the `init_wr` code-phase argument).
pub const NAP_TRACK_CODE_PHASE_UNITS_PER_CHIP: f64 = (1u64 << CODE_PHASE_FRAC_BITS) as f64;

/// NAP carrier-frequency register units per Hz. Carrier phase is accumulated
/// in half-cycles, so 1 Hz is 2 half-cycles per second.
pub const NAP_TRACK_CARRIER_FREQ_UNITS_PER_HZ: f64 =
    2.0 * (1u64 << CARRIER_PHASE_FRAC_BITS) as f64 / SAMPLE_FREQ;

/// Seconds in one GPS week.
pub const SECS_PER_WEEK: u32 = 7 * 24 * 3600;

/// One GPS week, in milliseconds — the modulus for `tow_ms`.
pub const WEEK_MS: u32 = SECS_PER_WEEK * 1000;

/// False-lock frequency-error threshold numerator (Hz * int_ms).
pub const FALSE_LOCK_THRESHOLD_NUM: f64 = 250.0;

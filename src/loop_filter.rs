//! Aided code/carrier tracking loop filter.
//!
//! A carrier-aided DLL (code loop) and an FLL-assisted PLL (carrier loop),
//! discretized the same way the teacher's `run_pll`/`run_fll`/`run_dll`
//! free functions were (`w = bw / 0.53`, `2*zeta*w*(err - err_prev) +
//! w*w*err*dt`), generalized to take `zeta`/`bw`/`k` from the loop-parameter
//! grammar instead of hardcoded constants, and to carrier-aid the code rate
//! via `carr_to_code`.

#[derive(Debug, Clone, Copy, Default)]
pub struct Correlation {
    pub i: f64,
    pub q: f64,
}

impl Correlation {
    pub fn norm(&self) -> f64 {
        (self.i * self.i + self.q * self.q).sqrt()
    }
}

/// Carrier-loop integrator state. `y` is the running carrier-frequency
/// estimate the false-lock corrector reaches into to snap after a jump.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarrierFilter {
    pub y: f64,
    prev_phase_err: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopFilter {
    loop_freq_hz: f64,

    code_bw: f64,
    code_zeta: f64,
    code_k: f64,
    carr_to_code: f64,

    carr_bw: f64,
    carr_zeta: f64,
    carr_k: f64,
    fll_aid_gain: f64,

    /// Current carrier-frequency estimate, Hz.
    pub carr_freq: f64,
    /// Current code-rate correction, Hz (carrier-aiding is added on top by
    /// the caller per the update algorithm's step 7).
    pub code_freq: f64,

    pub carr_filt: CarrierFilter,
    prev_prompt: Option<Correlation>,
}

#[allow(clippy::too_many_arguments)]
impl LoopFilter {
    pub fn init(
        &mut self,
        loop_freq_hz: f64,
        code_err_init: f64,
        code_bw: f64,
        code_zeta: f64,
        code_k: f64,
        carr_to_code: f64,
        carr_freq_init: f64,
        carr_bw: f64,
        carr_zeta: f64,
        carr_k: f64,
        fll_aid_gain: f64,
    ) {
        self.loop_freq_hz = loop_freq_hz;
        self.code_bw = code_bw;
        self.code_zeta = code_zeta;
        self.code_k = code_k;
        self.carr_to_code = carr_to_code;
        self.carr_bw = carr_bw;
        self.carr_zeta = carr_zeta;
        self.carr_k = carr_k;
        self.fll_aid_gain = fll_aid_gain;

        self.code_freq = code_err_init;
        self.carr_freq = carr_freq_init;
        self.carr_filt = CarrierFilter {
            y: carr_freq_init,
            prev_phase_err: 0.0,
        };
        self.prev_prompt = None;
    }

    /// Re-tunes the coefficients (e.g. on S0 -> S1 stage transition) while
    /// keeping the integrator state (`carr_freq`, `code_freq`, `carr_filt.y`)
    /// intact — a frequency jump here would undo the very lock the stage
    /// transition is supposed to preserve.
    pub fn retune(
        &mut self,
        loop_freq_hz: f64,
        code_bw: f64,
        code_zeta: f64,
        code_k: f64,
        carr_to_code: f64,
        carr_bw: f64,
        carr_zeta: f64,
        carr_k: f64,
        fll_aid_gain: f64,
    ) {
        self.loop_freq_hz = loop_freq_hz;
        self.code_bw = code_bw;
        self.code_zeta = code_zeta;
        self.code_k = code_k;
        self.carr_to_code = carr_to_code;
        self.carr_bw = carr_bw;
        self.carr_zeta = carr_zeta;
        self.carr_k = carr_k;
        self.fll_aid_gain = fll_aid_gain;
    }

    fn dt(&self) -> f64 {
        1.0 / self.loop_freq_hz
    }

    /// `code_freq` carrier-aided by the current carrier-frequency estimate
    /// through the `carr_to_code` ratio (≈ `GPS_L1_HZ / GPS_CA_CHIPPING_RATE`
    /// in the default config) — the code and carrier loops track the same
    /// Doppler shift scaled by that ratio, so feeding the carrier estimate
    /// through sharpens code lock well beyond what the DLL discriminator
    /// alone achieves.
    pub fn aided_code_freq(&self) -> f64 {
        if self.carr_to_code != 0.0 {
            self.code_freq + self.carr_freq / self.carr_to_code
        } else {
            self.code_freq
        }
    }

    /// Advances the loop given correlations ordered `[late, prompt, early]`.
    pub fn update(&mut self, cs: [Correlation; 3]) {
        let (late, prompt, early) = (cs[0], cs[1], cs[2]);
        let dt = self.dt();

        // --- code loop: normalized early-minus-late envelope discriminator ---
        let denom = early.norm() + late.norm();
        let err_code = if denom > 0.0 {
            self.code_k * (early.norm() - late.norm()) / denom
        } else {
            0.0
        };
        let wc = self.code_bw / 0.25;
        self.code_freq += wc * self.code_zeta * err_code;

        // --- carrier loop: 2-quadrant phase discriminator + FLL assist ---
        let phase_err = if prompt.i != 0.0 {
            self.carr_k * (prompt.q / prompt.i).atan() / (2.0 * std::f64::consts::PI)
        } else {
            0.0
        };
        let wp = self.carr_bw / 0.53;
        let pll_correction =
            2.0 * self.carr_zeta * wp * (phase_err - self.carr_filt.prev_phase_err)
                + wp * wp * phase_err * dt;

        let fll_correction = if self.fll_aid_gain > 0.0 {
            if let Some(prev) = self.prev_prompt {
                let dot = prompt.i * prev.i + prompt.q * prev.q;
                let cross = prompt.i * prev.q - prompt.q * prev.i;
                if dot != 0.0 {
                    let err_freq_cycles = (cross / dot).atan() / (2.0 * std::f64::consts::PI);
                    self.fll_aid_gain / dt * err_freq_cycles
                } else {
                    0.0
                }
            } else {
                0.0
            }
        } else {
            0.0
        };

        self.carr_freq += pll_correction + fll_correction;
        self.carr_filt.prev_phase_err = phase_err;
        self.carr_filt.y = self.carr_freq;
        self.prev_prompt = Some(prompt);
    }
}

//! Carrier-to-noise-density (C/N0) estimator.
//!
//! Uses the narrowband/wideband power ratio (NWPR) technique, grounded on
//! the same accumulate-then-ratio shape as the teacher's `update_cn0` (which
//! instead used a dedicated noise tap); here there is no noise tap, only
//! (I,Q) prompt, so the ratio of narrowband to wideband power over a short
//! window stands in for the explicit noise measurement.

const DEFAULT_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct CN0Estimator {
    window: usize,
    sum_i: f64,
    sum_q: f64,
    sum_power: f64,
    count: usize,
    t_int_sec: f64,
    cn0_dbhz: f64,
}

impl Default for CN0Estimator {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            sum_i: 0.0,
            sum_q: 0.0,
            sum_power: 0.0,
            count: 0,
            t_int_sec: 0.001,
            cn0_dbhz: 0.0,
        }
    }
}

impl CN0Estimator {
    /// Re-seeds the estimator with a known starting value — used on the
    /// S0 -> S1 stage transition so C/N0 doesn't momentarily dip to zero.
    pub fn init(&mut self, cn0_dbhz: f64, t_int_sec: f64) {
        self.sum_i = 0.0;
        self.sum_q = 0.0;
        self.sum_power = 0.0;
        self.count = 0;
        self.t_int_sec = t_int_sec;
        self.cn0_dbhz = cn0_dbhz;
    }

    pub fn cn0(&self) -> f64 {
        self.cn0_dbhz
    }

    /// Feeds a normalized prompt sample (`I/int_ms`, `Q/int_ms`) and returns
    /// the current (possibly unchanged) C/N0 estimate in dBHz.
    pub fn update(&mut self, i: f64, q: f64) -> f64 {
        self.sum_i += i;
        self.sum_q += q;
        self.sum_power += i * i + q * q;
        self.count += 1;

        if self.count >= self.window {
            let nbd = self.sum_i * self.sum_i + self.sum_q * self.sum_q;
            let wbd = self.sum_power;
            if wbd > 0.0 {
                let p = nbd / wbd;
                let k = self.count as f64;
                if p < k && p > 1.0 {
                    let snr = (p - 1.0) / (k - p) / self.t_int_sec;
                    let new_cn0 = 10.0 * snr.log10();
                    // smooth, as the teacher does for its own cn0 estimate
                    self.cn0_dbhz += 0.5 * (new_cn0 - self.cn0_dbhz);
                }
            }
            self.sum_i = 0.0;
            self.sum_q = 0.0;
            self.sum_power = 0.0;
            self.count = 0;
        }

        self.cn0_dbhz
    }
}

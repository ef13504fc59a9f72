//! Per-channel code/carrier tracking state machine — the core of the NAP
//! driver. Grounded on the teacher's own `Channel` (state held across
//! correlator epochs, tracking-loop fields, a small history/telemetry
//! side-channel) but replacing its software-correlator DSP with the
//! register-driven NAP contract this spec targets.

use std::sync::atomic::{AtomicU16, Ordering};

use rand::Rng;

use crate::constants::{
    CARRIER_PHASE_FRAC_BITS, CODE_PHASE_FRAC_BITS, FALSE_LOCK_THRESHOLD_NUM,
    GPS_CA_CHIPPING_RATE, MAX_SATS, SAMPLE_FREQ, WEEK_MS,
};
use crate::device::{CorrIQ, CorrelatorDevice};
use crate::fixed_point::{
    carr_freq_fp_to_hz, carr_freq_hz_to_fp, code_rate_fp_to_hz, code_rate_hz_to_fp,
    early_rollover_sample_offset,
};
use crate::loop_filter::{Correlation, LoopFilter};
use crate::measurement::Measurement;
use crate::nav_bit_sync::{BitPolarity, NavBitSync, SimpleBitSync};
use crate::settings::LoopParams;
use crate::telemetry::{ChannelRunState, ChannelTelemetry, TelemetrySink, TrackingIQ};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    S0BitSync,
    S1Long,
}

/// PRN-indexed, monotonically increasing ambiguity counters. Seeded
/// randomly at boot (spec §3) and bumped atomically from either the
/// per-channel ISR or foreground `mark_ambiguous` calls.
pub struct LockCounterTable {
    counters: [AtomicU16; MAX_SATS],
}

impl LockCounterTable {
    pub fn new_seeded() -> Self {
        let mut rng = rand::thread_rng();
        let counters = std::array::from_fn(|_| AtomicU16::new(rng.gen()));
        Self { counters }
    }

    /// Increments the counter for `prn` and returns the new value.
    pub fn bump(&self, prn: usize) -> u16 {
        self.counters[prn].fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub fn get(&self, prn: usize) -> u16 {
        self.counters[prn].load(Ordering::SeqCst)
    }
}

pub struct TrackingChannel {
    channel_id: usize,

    pub prn: u8,
    pub state: ChannelRunState,
    pub stage: Stage,
    pub int_ms: u32,
    short_cycle: bool,

    sample_count: u64,
    update_count: u64,
    pub mode_change_count: u64,
    tow_ms: Option<u32>,

    code_phase_early: u64,
    carrier_phase: i64,
    code_rate_fp: u32,
    code_rate_fp_prev: u32,
    carr_freq_fp: i32,
    carr_freq_fp_prev: i32,

    loop_filter: LoopFilter,
    cn0: f64,
    cn0_est: crate::cn0::CN0Estimator,
    alias: crate::alias::AliasDetector,
    nav: Box<dyn NavBitSync>,

    cs: [CorrIQ; 3],
    corr_sample_count: u32,

    pub output_iq: bool,
    lock_counter: u16,
}

impl TrackingChannel {
    pub fn new(channel_id: usize) -> Self {
        Self {
            channel_id,
            prn: 0,
            state: ChannelRunState::Disabled,
            stage: Stage::S0BitSync,
            int_ms: 1,
            short_cycle: false,
            sample_count: 0,
            update_count: 0,
            mode_change_count: 0,
            tow_ms: None,
            code_phase_early: 0,
            carrier_phase: 0,
            code_rate_fp: 0,
            code_rate_fp_prev: 0,
            carr_freq_fp: 0,
            carr_freq_fp_prev: 0,
            loop_filter: LoopFilter::default(),
            cn0: 0.0,
            cn0_est: crate::cn0::CN0Estimator::default(),
            alias: crate::alias::AliasDetector::default(),
            nav: Box::new(SimpleBitSync::default()),
            cs: [CorrIQ::default(); 3],
            corr_sample_count: 0,
            output_iq: false,
            lock_counter: 0,
        }
    }

    /// Configures the channel from an acquisition hand-off. Postcondition:
    /// `state = Running, stage = S0, int_ms = 1, tow_ms = Invalid`.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        &mut self,
        prn: u8,
        carrier_freq_hz: f64,
        start_sample_count: u64,
        cn0_init_dbhz: f64,
        loop_params: &LoopParams,
        lock_counters: &LockCounterTable,
        device: &mut dyn CorrelatorDevice,
    ) {
        let channel_id = self.channel_id;
        *self = Self::new(channel_id);

        self.prn = prn;
        self.state = ChannelRunState::Running;
        self.stage = Stage::S0BitSync;
        self.int_ms = 1;

        // Align to the early code rollover rather than the prompt one.
        self.sample_count = start_sample_count - early_rollover_sample_offset();
        self.tow_ms = None;

        let stage0 = loop_params.stage(0);
        self.code_rate_fp = code_rate_hz_to_fp(GPS_CA_CHIPPING_RATE);
        self.code_rate_fp_prev = self.code_rate_fp;
        self.carr_freq_fp = carr_freq_hz_to_fp(carrier_freq_hz);
        self.carr_freq_fp_prev = self.carr_freq_fp;

        self.loop_filter.init(
            1000.0,
            0.0,
            stage0.code_bw,
            stage0.code_zeta,
            stage0.code_k,
            stage0.carr_to_code,
            carrier_freq_hz,
            stage0.carr_bw,
            stage0.carr_zeta,
            stage0.carr_k,
            stage0.carr_fll_aid_gain,
        );

        self.cn0 = cn0_init_dbhz;
        self.cn0_est.init(cn0_init_dbhz, 0.001);
        self.lock_counter = lock_counters.bump(prn as usize);

        device.code_wr(self.channel_id, prn);
        device.init_wr(self.channel_id, prn, 0, 0);
        device.update_wr(self.channel_id, self.carr_freq_fp, self.code_rate_fp, 0, 0);
        device.timing_strobe(self.sample_count as u32);

        log::info!(
            "channel {}: init prn={} carrier_freq={carrier_freq_hz:.1} cn0={cn0_init_dbhz:.1}",
            self.channel_id,
            prn + 1,
        );
    }

    /// Reads the completed integration's three correlator taps. On the long
    /// half of a long integration, accumulates into `cs`; otherwise
    /// overwrites it and snapshots the prompt into the alias detector.
    pub fn fetch_correlations(&mut self, device: &mut dyn CorrelatorDevice) {
        if self.state == ChannelRunState::Disabled {
            return;
        }
        let readout = device.corr_rd(self.channel_id);
        self.corr_sample_count = readout.sample_count;

        if self.int_ms > 1 && !self.short_cycle {
            for (acc, tap) in self.cs.iter_mut().zip(readout.taps.iter()) {
                acc.i += tap.i;
                acc.q += tap.q;
            }
        } else {
            self.cs = readout.taps;
            self.alias.first(self.cs[1].i as f64, self.cs[1].q as f64);
        }
    }

    /// Advances time bookkeeping, runs the aided tracking loop, the
    /// false-lock corrector and the stage transition, and re-programs the
    /// correlator. Precondition: `fetch_correlations` ran this interrupt.
    pub fn update(
        &mut self,
        loop_params: &LoopParams,
        device: &mut dyn CorrelatorDevice,
        telemetry: &mut dyn TelemetrySink,
    ) {
        if self.state == ChannelRunState::Disabled {
            return;
        }

        // 1. time advance
        self.sample_count = self.sample_count.wrapping_add(self.corr_sample_count as u64);
        self.code_phase_early = self.code_phase_early.wrapping_add(
            (self.corr_sample_count as u64).wrapping_mul(self.code_rate_fp_prev as u64),
        );
        let mut carrier_advance =
            (self.carr_freq_fp_prev as i64).wrapping_mul(self.corr_sample_count as i64);
        if self.update_count == 0 {
            carrier_advance -= self.carr_freq_fp_prev as i64;
        }
        self.carrier_phase = self.carrier_phase.wrapping_add(carrier_advance);
        self.code_rate_fp_prev = self.code_rate_fp;
        self.carr_freq_fp_prev = self.carr_freq_fp;

        // 2. TOW tick
        if let Some(tow) = self.tow_ms {
            let delta = if self.short_cycle { 1 } else { self.int_ms - 1 };
            self.tow_ms = Some((tow + delta) % WEEK_MS);
        }

        // 3. long-integration pipelining
        if self.int_ms > 1 {
            self.short_cycle = !self.short_cycle;
            if !self.short_cycle {
                let length_code = self.int_ms - 2;
                device.update_wr(
                    self.channel_id,
                    self.carr_freq_fp,
                    self.code_rate_fp,
                    length_code,
                    0,
                );
                return;
            }
        }

        // 4.
        self.update_count += self.int_ms as u64;

        // 5. navigation-bit extractor
        let tow_candidate = self.nav.update(self.cs[1].i as f64, self.int_ms);
        if tow_candidate > 0 && Some(tow_candidate) != self.tow_ms {
            if self.tow_ms.is_some() {
                log::error!(
                    "channel {}: tow mismatch, decoder reports {tow_candidate} tracked {:?}",
                    self.channel_id,
                    self.tow_ms,
                );
            }
            self.tow_ms = Some(tow_candidate);
        }

        // 6. C/N0
        self.cn0 = self.cn0_est.update(
            self.cs[1].i as f64 / self.int_ms as f64,
            self.cs[1].q as f64 / self.int_ms as f64,
        );

        // 7. loop filter, reordered (E,P,L) -> (L,P,E)
        let early = Correlation { i: self.cs[0].i as f64, q: self.cs[0].q as f64 };
        let prompt = Correlation { i: self.cs[1].i as f64, q: self.cs[1].q as f64 };
        let late = Correlation { i: self.cs[2].i as f64, q: self.cs[2].q as f64 };
        self.loop_filter.update([late, prompt, early]);

        let code_phase_rate = self.loop_filter.aided_code_freq() + GPS_CA_CHIPPING_RATE;
        self.carr_freq_fp = carr_freq_hz_to_fp(self.loop_filter.carr_freq);
        self.code_rate_fp = code_rate_hz_to_fp(code_phase_rate);

        // 8. optional telemetry
        if self.output_iq && self.int_ms > 1 {
            telemetry.send_tracking_iq(TrackingIQ {
                channel: self.channel_id,
                sid: self.prn,
                corrs: self.cs,
            });
        }

        // 9. false-lock check
        if self.int_ms > 1 {
            let denom = (self.int_ms - 1) as f64;
            let (first_i, first_q) = self.alias.first_iq();
            let i_second = (self.cs[1].i as f64 - first_i) / denom;
            let q_second = (self.cs[1].q as f64 - first_q) / denom;
            let dt_sec = denom / 1000.0;
            let err = self.alias.second(i_second, q_second, dt_sec);
            if err.abs() > FALSE_LOCK_THRESHOLD_NUM / self.int_ms as f64 {
                log::warn!(
                    "channel {}: false phase lock detected, err={err:.1} Hz",
                    self.channel_id,
                );
                self.mode_change_count = self.update_count;
                self.loop_filter.carr_freq += err;
                self.loop_filter.carr_filt.y = self.loop_filter.carr_freq;
                self.carr_freq_fp = carr_freq_hz_to_fp(self.loop_filter.carr_freq);
            }
        }

        // 10. stage transition S0 -> S1
        if self.stage == Stage::S0BitSync
            && self.int_ms == 1
            && self.nav.bit_phase() == self.nav.bit_phase_ref()
        {
            let stage1 = loop_params.stage(1);
            self.stage = Stage::S1Long;
            self.int_ms = stage1.coherent_ms;
            self.short_cycle = true;
            self.cn0_est.init(self.cn0, stage1.coherent_ms as f64 / 1000.0);
            self.loop_filter.retune(
                1000.0 / stage1.coherent_ms as f64,
                stage1.code_bw,
                stage1.code_zeta,
                stage1.code_k,
                stage1.carr_to_code,
                stage1.carr_bw,
                stage1.carr_zeta,
                stage1.carr_k,
                stage1.carr_fll_aid_gain,
            );
            self.mode_change_count = self.update_count;
            log::info!(
                "channel {}: bit sync achieved, stage -> S1 ({} ms)",
                self.channel_id,
                self.int_ms,
            );
        }

        // 11. program correlator
        let length_code = if self.int_ms == 1 { 0 } else { self.int_ms - 2 };
        device.update_wr(self.channel_id, self.carr_freq_fp, self.code_rate_fp, length_code, 0);
    }

    pub fn disable(&mut self, device: &mut dyn CorrelatorDevice) {
        device.update_wr(self.channel_id, 0, 0, 0, 0);
        self.state = ChannelRunState::Disabled;
        self.cs = [CorrIQ::default(); 3];
    }

    /// Called on suspected cycle slip: the bit decoder's polarity is no
    /// longer trustworthy, and downstream consumers must re-resolve carrier
    /// phase ambiguity.
    pub fn mark_ambiguous(&mut self, lock_counters: &LockCounterTable) {
        self.nav.set_polarity_unknown();
        self.lock_counter = lock_counters.bump(self.prn as usize);
    }

    pub fn export_measurement(&self) -> Measurement {
        let mut carrier_phase_cycles =
            self.carrier_phase as f64 / (1u64 << CARRIER_PHASE_FRAC_BITS) as f64;
        if self.nav.polarity() == BitPolarity::Inverted {
            carrier_phase_cycles += 0.5;
        }

        Measurement {
            prn: self.prn,
            lock_counter: self.lock_counter,
            code_phase_chips: self.code_phase_early as f64 / (1u64 << CODE_PHASE_FRAC_BITS) as f64,
            code_phase_rate: code_rate_fp_to_hz(self.code_rate_fp),
            carrier_freq: carr_freq_fp_to_hz(self.carr_freq_fp),
            carrier_phase_cycles,
            tow_ms: self.tow_ms,
            receiver_time_sec: self.sample_count as f64 / SAMPLE_FREQ,
            snr: self.cn0,
        }
    }

    pub fn snr(&self) -> f32 {
        self.cn0 as f32
    }

    pub fn telemetry_row(&self) -> ChannelTelemetry {
        ChannelTelemetry {
            state: self.state,
            sid: self.prn,
            cn0: if self.state == ChannelRunState::Running { self.cn0 } else { -1.0 },
        }
    }

    /// Perturbs the code filter to intentionally destroy lock. Detection of
    /// the resulting loss is left to an external manager.
    pub fn disrupt_lock(&mut self) {
        self.loop_filter.code_freq += 10_000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockCorrelatorDevice;
    use crate::telemetry::RecordingTelemetrySink;

    fn params() -> LoopParams {
        LoopParams::default_value()
    }

    #[test]
    fn init_programs_correlator_and_aligns_to_early_rollover() {
        let mut ch = TrackingChannel::new(0);
        let lc = LockCounterTable::new_seeded();
        let mut dev = MockCorrelatorDevice::default();

        ch.init(5, 1000.0, 16000, 40.0, &params(), &lc, &mut dev);

        assert_eq!(ch.state, ChannelRunState::Running);
        assert_eq!(ch.stage, Stage::S0BitSync);
        assert_eq!(ch.int_ms, 1);
        assert_eq!(dev.code_wr_calls, vec![(0, 5)]);
        assert_eq!(dev.init_wr_calls, vec![(0, 5, 0, 0)]);
        assert_eq!(dev.timing_strobe_calls, vec![16000 - 8]);
        assert_eq!(dev.update_wr_calls[0].2, code_rate_hz_to_fp(GPS_CA_CHIPPING_RATE));
        assert_eq!(dev.update_wr_calls[0].1, carr_freq_hz_to_fp(1000.0));
    }

    #[test]
    fn disable_zeros_correlator_and_marks_disabled() {
        let mut ch = TrackingChannel::new(0);
        let lc = LockCounterTable::new_seeded();
        let mut dev = MockCorrelatorDevice::default();
        ch.init(1, 0.0, 16000, 40.0, &params(), &lc, &mut dev);

        ch.disable(&mut dev);

        assert_eq!(ch.state, ChannelRunState::Disabled);
        assert_eq!(*dev.update_wr_calls.last().unwrap(), (0, 0, 0, 0, 0));
    }

    #[test]
    fn disabled_channel_ignores_fetch_and_update() {
        let mut ch = TrackingChannel::new(0);
        let mut dev = MockCorrelatorDevice::default();
        let mut sink = RecordingTelemetrySink::default();
        ch.fetch_correlations(&mut dev);
        ch.update(&params(), &mut dev, &mut sink);
        assert!(dev.update_wr_calls.is_empty());
    }

    #[test]
    fn mark_ambiguous_bumps_and_copies_lock_counter() {
        let mut ch = TrackingChannel::new(0);
        let lc = LockCounterTable::new_seeded();
        let mut dev = MockCorrelatorDevice::default();
        ch.init(9, 0.0, 16000, 40.0, &params(), &lc, &mut dev);
        let before = ch.lock_counter;

        ch.mark_ambiguous(&lc);

        assert_eq!(ch.lock_counter, before.wrapping_add(1));
        assert_eq!(ch.nav.polarity(), BitPolarity::Unknown);
    }

    #[test]
    fn one_ms_ticks_keep_stage_s0_until_bit_sync() {
        let mut ch = TrackingChannel::new(0);
        let lc = LockCounterTable::new_seeded();
        let mut dev = MockCorrelatorDevice::default();
        let mut sink = RecordingTelemetrySink::default();
        ch.init(3, 0.0, 16000, 40.0, &params(), &lc, &mut dev);

        dev.next_readout = crate::device::CorrelatorReadout {
            sample_count: 16,
            taps: [
                CorrIQ { i: 10, q: 1 },
                CorrIQ { i: 1000, q: 10 },
                CorrIQ { i: 10, q: -1 },
            ],
        };
        for _ in 0..5 {
            ch.fetch_correlations(&mut dev);
            ch.update(&params(), &mut dev, &mut sink);
            assert_eq!(ch.int_ms, 1);
            assert_eq!(ch.stage, Stage::S0BitSync);
        }
    }

    #[test]
    fn export_measurement_is_pure_between_calls() {
        let mut ch = TrackingChannel::new(0);
        let lc = LockCounterTable::new_seeded();
        let mut dev = MockCorrelatorDevice::default();
        ch.init(2, 500.0, 16000, 35.0, &params(), &lc, &mut dev);

        let m1 = ch.export_measurement();
        let m2 = ch.export_measurement();
        assert_eq!(m1, m2);
    }

    #[test]
    fn telemetry_row_reports_sentinel_cn0_when_disabled() {
        let mut ch = TrackingChannel::new(0);
        let lc = LockCounterTable::new_seeded();
        let mut dev = MockCorrelatorDevice::default();
        ch.init(2, 0.0, 16000, 35.0, &params(), &lc, &mut dev);
        ch.disable(&mut dev);
        assert_eq!(ch.telemetry_row().cn0, -1.0);
    }
}

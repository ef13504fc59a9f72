//! Fixed-size bank of tracking channels — the channel table, lock-counter
//! table and live loop-parameter pair, all "init at boot, never freed".
//! Drives the per-channel fetch+update in parallel with `rayon`,
//! grounded on the teacher's `receiver.rs` `channels.par_iter_mut()` tick
//! loop, generalized from a `HashMap<SV, Channel>` to a fixed-size array
//! indexed by hardware channel id, and from direct field access to
//! `parking_lot::Mutex` guards standing in for this spec's interrupt
//! masking around per-channel state.

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use crate::channel::{LockCounterTable, TrackingChannel};
use crate::constants::N_CHANNELS;
use crate::device::CorrelatorDevice;
use crate::error::TrackingError;
use crate::measurement::Measurement;
use crate::settings::LoopParams;
use crate::telemetry::{TelemetrySink, TrackingState};

pub struct TrackingBank {
    channels: Vec<Mutex<TrackingChannel>>,
    lock_counters: LockCounterTable,
    loop_params: RwLock<LoopParams>,
    device: Mutex<Box<dyn CorrelatorDevice>>,
    telemetry: Mutex<Box<dyn TelemetrySink>>,
}

impl TrackingBank {
    pub fn new(device: Box<dyn CorrelatorDevice>, telemetry: Box<dyn TelemetrySink>) -> Self {
        Self {
            channels: (0..N_CHANNELS).map(|id| Mutex::new(TrackingChannel::new(id))).collect(),
            lock_counters: LockCounterTable::new_seeded(),
            loop_params: RwLock::new(LoopParams::default_value()),
            device: Mutex::new(device),
            telemetry: Mutex::new(telemetry),
        }
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn set_loop_params(&self, params: LoopParams) {
        *self.loop_params.write() = params;
    }

    /// Parses and applies `track.loop_params` atomically (§4.4): the live
    /// parameters are replaced only if the whole string validates.
    pub fn set_loop_params_str(&self, spec: &str) -> Result<(), TrackingError> {
        let parsed: LoopParams = spec.parse()?;
        *self.loop_params.write() = parsed;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn init_channel(
        &self,
        channel: usize,
        prn: u8,
        carrier_freq_hz: f64,
        start_sample_count: u64,
        cn0_init_dbhz: f64,
    ) {
        let params = self.loop_params.read();
        let mut dev = self.device.lock();
        self.channels[channel].lock().init(
            prn,
            carrier_freq_hz,
            start_sample_count,
            cn0_init_dbhz,
            &params,
            &self.lock_counters,
            &mut **dev,
        );
    }

    pub fn disable_channel(&self, channel: usize) {
        let mut dev = self.device.lock();
        self.channels[channel].lock().disable(&mut **dev);
    }

    /// Per §7: rejects the request when the target channel is `Disabled`
    /// rather than silently bumping a lock counter nobody is tracking.
    pub fn mark_ambiguous(&self, channel: usize) -> Result<(), TrackingError> {
        let mut ch = self.channels[channel].lock();
        if ch.state == crate::telemetry::ChannelRunState::Disabled {
            return Err(TrackingError::ChannelDisabled { channel });
        }
        ch.mark_ambiguous(&self.lock_counters);
        Ok(())
    }

    /// One fetch+update pass over every channel, in parallel — the
    /// software stand-in for N independent per-channel ISRs firing on
    /// correlator completion.
    pub fn tick(&self) {
        let params = self.loop_params.read();
        self.channels.par_iter().for_each(|slot| {
            let mut ch = slot.lock();
            {
                let mut dev = self.device.lock();
                ch.fetch_correlations(&mut **dev);
            }
            let mut dev = self.device.lock();
            let mut telemetry = self.telemetry.lock();
            ch.update(&params, &mut **dev, &mut **telemetry);
        });
    }

    /// Snapshots every channel's run state and C/N0 into one `TrackingState`
    /// message (always emitted whole, per §6).
    pub fn emit_tracking_state(&self) {
        let rows = self.channels.iter().map(|c| c.lock().telemetry_row()).collect();
        self.telemetry.lock().send_tracking_state(TrackingState { channels: rows });
    }

    /// Per §7: rejects the request when the target channel is `Disabled`
    /// rather than handing back a stale or meaningless measurement.
    pub fn export_measurement(&self, channel: usize) -> Result<Measurement, TrackingError> {
        let ch = self.channels[channel].lock();
        if ch.state == crate::telemetry::ChannelRunState::Disabled {
            return Err(TrackingError::ChannelDisabled { channel });
        }
        Ok(ch.export_measurement())
    }

    pub fn snr(&self, channel: usize) -> f32 {
        self.channels[channel].lock().snr()
    }

    pub fn lock_counter(&self, prn: usize) -> u16 {
        self.lock_counters.get(prn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CorrIQ, CorrelatorReadout, SharedMockDevice};
    use crate::telemetry::{ChannelRunState, RecordingTelemetrySink};

    fn new_bank() -> (TrackingBank, SharedMockDevice) {
        let device = SharedMockDevice::new();
        let bank = TrackingBank::new(
            Box::new(device.clone()),
            Box::new(RecordingTelemetrySink::default()),
        );
        (bank, device)
    }

    #[test]
    fn init_then_tick_runs_every_channel_without_panicking() {
        let (bank, device) = new_bank();
        bank.init_channel(0, 5, 1000.0, 16000, 40.0);
        bank.init_channel(1, 7, -500.0, 32000, 38.0);

        device.set_next_readout(CorrelatorReadout {
            sample_count: 16368,
            taps: [
                CorrIQ { i: 100, q: 5 },
                CorrIQ { i: 1000, q: 20 },
                CorrIQ { i: 90, q: 5 },
            ],
        });

        for _ in 0..10 {
            bank.tick();
        }

        let m = bank.export_measurement(0).unwrap();
        assert_eq!(m.prn, 5);
    }

    #[test]
    fn disable_then_emit_reports_sentinel_cn0() {
        let (bank, _device) = new_bank();
        bank.init_channel(2, 3, 0.0, 16000, 30.0);
        bank.disable_channel(2);
        bank.emit_tracking_state();

        assert_eq!(bank.channels[2].lock().state, ChannelRunState::Disabled);
    }

    #[test]
    fn disabled_channel_rejects_export_and_mark_ambiguous() {
        let (bank, _device) = new_bank();
        bank.init_channel(4, 6, 0.0, 16000, 30.0);
        bank.disable_channel(4);

        assert!(matches!(
            bank.export_measurement(4),
            Err(TrackingError::ChannelDisabled { channel: 4 })
        ));
        assert!(matches!(
            bank.mark_ambiguous(4),
            Err(TrackingError::ChannelDisabled { channel: 4 })
        ));
    }

    #[test]
    fn mark_ambiguous_is_reflected_in_the_shared_lock_counter_table() {
        let (bank, _device) = new_bank();
        bank.init_channel(0, 11, 0.0, 16000, 30.0);
        let before = bank.lock_counter(11);
        bank.mark_ambiguous(0).unwrap();
        assert_eq!(bank.lock_counter(11), before.wrapping_add(1));
    }

    #[test]
    fn rejects_invalid_loop_params_string_leaving_live_params_unchanged() {
        let (bank, _device) = new_bank();
        let before = bank.loop_params.read().clone();
        let res = bank.set_loop_params_str("(2 ms, (1, 0.7, 1, 1540), (10, 0.7, 1, 5))");
        assert!(res.is_err());
        assert_eq!(*bank.loop_params.read(), before);
    }
}

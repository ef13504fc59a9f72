//! Correlator device (NAP) register interface — the hardware peripheral
//! collaborator. Abstracted as a trait so `TrackingBank` can be driven by a
//! mock in tests and a real register block in production, generalizing the
//! teacher's own `ReadIQFn = dyn FnMut(...) -> Result<...>` trait-object
//! pattern in `receiver.rs` to the multi-method NAP surface this spec needs.

/// One complex correlator tap reading (early, prompt or late), integer I/Q.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrIQ {
    pub i: i64,
    pub q: i64,
}

/// A completed integration's three-tap correlator read, ordered
/// early/prompt/late, plus the number of samples it consumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelatorReadout {
    pub sample_count: u32,
    pub taps: [CorrIQ; 3],
}

/// Flags accompanying an `update_wr` — currently unused by any channel
/// behavior, carried through verbatim to the device per the NAP register
/// contract (spec §6).
pub type UpdateFlags = u8;

pub trait CorrelatorDevice: Send {
    fn code_wr(&mut self, channel: usize, prn: u8);

    fn init_wr(&mut self, channel: usize, prn: u8, code_phase: u32, carrier_phase: i32);

    fn update_wr(
        &mut self,
        channel: usize,
        carr_freq_fp: i32,
        code_rate_fp: u32,
        length_code: u32,
        flags: UpdateFlags,
    );

    fn corr_rd(&mut self, channel: usize) -> CorrelatorReadout;

    fn timing_strobe(&mut self, sample_count: u32);
}

/// Simple in-memory mock used by tests and the CLI harness.
#[derive(Debug, Clone, Default)]
pub struct MockCorrelatorDevice {
    pub code_wr_calls: Vec<(usize, u8)>,
    pub init_wr_calls: Vec<(usize, u8, u32, i32)>,
    pub update_wr_calls: Vec<(usize, i32, u32, u32, UpdateFlags)>,
    pub timing_strobe_calls: Vec<u32>,
    pub next_readout: CorrelatorReadout,
}

impl CorrelatorDevice for MockCorrelatorDevice {
    fn code_wr(&mut self, channel: usize, prn: u8) {
        self.code_wr_calls.push((channel, prn));
    }

    fn init_wr(&mut self, channel: usize, prn: u8, code_phase: u32, carrier_phase: i32) {
        self.init_wr_calls
            .push((channel, prn, code_phase, carrier_phase));
    }

    fn update_wr(
        &mut self,
        channel: usize,
        carr_freq_fp: i32,
        code_rate_fp: u32,
        length_code: u32,
        flags: UpdateFlags,
    ) {
        self.update_wr_calls
            .push((channel, carr_freq_fp, code_rate_fp, length_code, flags));
    }

    fn corr_rd(&mut self, _channel: usize) -> CorrelatorReadout {
        self.next_readout
    }

    fn timing_strobe(&mut self, sample_count: u32) {
        self.timing_strobe_calls.push(sample_count);
    }
}

/// A `MockCorrelatorDevice` shared between the thread driving `TrackingBank`
/// and whatever feeds it canned correlator readouts (a test, or the CLI
/// demo harness) — mirrors the teacher's `Arc<Mutex<GnssState>>` publication
/// pattern in `receiver.rs`, applied to the device side instead of the
/// solution side.
#[derive(Clone, Default)]
pub struct SharedMockDevice(std::sync::Arc<parking_lot::Mutex<MockCorrelatorDevice>>);

impl SharedMockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_next_readout(&self, readout: CorrelatorReadout) {
        self.0.lock().next_readout = readout;
    }
}

impl CorrelatorDevice for SharedMockDevice {
    fn code_wr(&mut self, channel: usize, prn: u8) {
        self.0.lock().code_wr(channel, prn);
    }

    fn init_wr(&mut self, channel: usize, prn: u8, code_phase: u32, carrier_phase: i32) {
        self.0.lock().init_wr(channel, prn, code_phase, carrier_phase);
    }

    fn update_wr(
        &mut self,
        channel: usize,
        carr_freq_fp: i32,
        code_rate_fp: u32,
        length_code: u32,
        flags: UpdateFlags,
    ) {
        self.0
            .lock()
            .update_wr(channel, carr_freq_fp, code_rate_fp, length_code, flags);
    }

    fn corr_rd(&mut self, channel: usize) -> CorrelatorReadout {
        self.0.lock().corr_rd(channel)
    }

    fn timing_strobe(&mut self, sample_count: u32) {
        self.0.lock().timing_strobe(sample_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_register_writes_in_order() {
        let mut dev = MockCorrelatorDevice::default();
        dev.code_wr(0, 7);
        dev.init_wr(0, 7, 1024, 0);
        dev.update_wr(0, 100, 200_000, 1, 0);
        dev.timing_strobe(16368);

        assert_eq!(dev.code_wr_calls, vec![(0, 7)]);
        assert_eq!(dev.init_wr_calls, vec![(0, 7, 1024, 0)]);
        assert_eq!(dev.update_wr_calls, vec![(0, 100, 200_000, 1, 0)]);
        assert_eq!(dev.timing_strobe_calls, vec![16368]);
    }

    #[test]
    fn mock_returns_configured_readout() {
        let mut dev = MockCorrelatorDevice {
            next_readout: CorrelatorReadout {
                sample_count: 16368,
                taps: [
                    CorrIQ { i: 10, q: 1 },
                    CorrIQ { i: 100, q: 2 },
                    CorrIQ { i: 12, q: 3 },
                ],
            },
            ..Default::default()
        };
        let readout = dev.corr_rd(0);
        assert_eq!(readout.sample_count, 16368);
        assert_eq!(readout.taps[1].i, 100);
    }

    #[test]
    fn shared_mock_device_is_visible_through_clones() {
        let shared = SharedMockDevice::new();
        let mut handle = shared.clone();
        shared.set_next_readout(CorrelatorReadout {
            sample_count: 16,
            taps: [CorrIQ::default(), CorrIQ { i: 42, q: 7 }, CorrIQ::default()],
        });
        let readout = handle.corr_rd(0);
        assert_eq!(readout.taps[1].i, 42);
    }
}

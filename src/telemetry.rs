//! Wire-level telemetry transport collaborator (spec §6). The transport
//! itself is out of scope; this module defines the two fixed-shape
//! messages the tracking core produces and the sink trait it publishes
//! them through, grounded on the teacher's `network.rs` message-sending
//! shape (`send_msg`/`TelemetryMsg`-style plain structs over a sink).

use crate::device::CorrIQ;

/// Per-channel row of the always-emitted `TrackingState` message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelTelemetry {
    pub state: ChannelRunState,
    pub sid: u8,
    /// -1.0 when the channel is not `Running`.
    pub cn0: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRunState {
    Disabled,
    Running,
}

/// One bank-wide snapshot, one row per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingState {
    pub channels: Vec<ChannelTelemetry>,
}

/// Per-channel, optional, emitted only when `output_iq ∧ int_ms > 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingIQ {
    pub channel: usize,
    pub sid: u8,
    pub corrs: [CorrIQ; 3],
}

pub trait TelemetrySink: Send {
    fn send_tracking_state(&mut self, msg: TrackingState);
    fn send_tracking_iq(&mut self, msg: TrackingIQ);
}

/// Discards everything — the default sink when no transport is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn send_tracking_state(&mut self, _msg: TrackingState) {}
    fn send_tracking_iq(&mut self, _msg: TrackingIQ) {}
}

/// Records everything in memory — used by tests and the CLI harness.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetrySink {
    pub states: Vec<TrackingState>,
    pub iqs: Vec<TrackingIQ>,
}

impl TelemetrySink for RecordingTelemetrySink {
    fn send_tracking_state(&mut self, msg: TrackingState) {
        self.states.push(msg);
    }

    fn send_tracking_iq(&mut self, msg: TrackingIQ) {
        self.iqs.push(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_arrival_order() {
        let mut sink = RecordingTelemetrySink::default();
        sink.send_tracking_state(TrackingState {
            channels: vec![ChannelTelemetry {
                state: ChannelRunState::Disabled,
                sid: 0,
                cn0: -1.0,
            }],
        });
        sink.send_tracking_iq(TrackingIQ {
            channel: 0,
            sid: 3,
            corrs: [CorrIQ::default(); 3],
        });
        sink.send_tracking_state(TrackingState { channels: vec![] });

        assert_eq!(sink.states.len(), 2);
        assert_eq!(sink.iqs.len(), 1);
        assert_eq!(sink.iqs[0].sid, 3);
    }

    #[test]
    fn null_sink_accepts_and_discards() {
        let mut sink = NullTelemetrySink;
        sink.send_tracking_state(TrackingState { channels: vec![] });
        sink.send_tracking_iq(TrackingIQ {
            channel: 0,
            sid: 0,
            corrs: [CorrIQ::default(); 3],
        });
    }
}

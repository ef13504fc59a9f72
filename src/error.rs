//! Error taxonomy for the tracking core's foreground (non-ISR) surface.
//!
//! Per the ISR error-handling policy, nothing from the per-channel update
//! path returns an `Err` — failures there are logged and reflected in
//! channel state. This type covers the two foreground paths that *do*
//! validate and can reject: the loop-parameter grammar and channel access
//! from settings/telemetry code.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackingError {
    #[error("invalid loop parameter spec: {0}")]
    InvalidLoopParams(String),

    #[error("channel {channel} is disabled")]
    ChannelDisabled { channel: usize },
}

pub mod alias;
pub mod bank;
pub mod channel;
pub mod cn0;
pub mod constants;
pub mod device;
pub mod error;
pub mod fixed_point;
pub mod loop_filter;
pub mod measurement;
pub mod nav_bit_sync;
pub mod settings;
pub mod telemetry;

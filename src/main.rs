use colored::Colorize;
use structopt::StructOpt;

use gnss_track_core::bank::TrackingBank;
use gnss_track_core::constants::SAMPLE_FREQ;
use gnss_track_core::device::{CorrIQ, CorrelatorReadout, SharedMockDevice};
use gnss_track_core::telemetry::NullTelemetrySink;

#[derive(StructOpt)]
#[structopt(name = "gnss-track-core", about = "GPS L1 C/A tracking-loop harness")]
struct Options {
    #[structopt(long, default_value = "5")]
    prn: u8,
    #[structopt(long, default_value = "1000.0")]
    carrier_freq_hz: f64,
    #[structopt(long, default_value = "16000")]
    start_sample: u64,
    #[structopt(long, default_value = "40.0")]
    cn0_init: f64,
    #[structopt(long, default_value = "400")]
    ticks: u32,
    #[structopt(long, help = "track.loop_params override")]
    loop_params: Option<String>,
    #[structopt(long, short = "v")]
    verbose: bool,
}

fn main() {
    env_logger::init();
    let opt = Options::from_args();

    let device = SharedMockDevice::new();
    let bank = TrackingBank::new(Box::new(device.clone()), Box::new(NullTelemetrySink));

    if let Some(spec) = &opt.loop_params {
        if let Err(e) = bank.set_loop_params_str(spec) {
            log::error!("{}", format!("rejected loop params: {e}").red());
            std::process::exit(1);
        }
    }

    bank.init_channel(0, opt.prn, opt.carrier_freq_hz, opt.start_sample, opt.cn0_init);

    // A strong, steady synthetic correlation triple stands in for the
    // acquisition front-end and the correlator hardware, both out of scope
    // here — enough to exercise the loop filter, C/N0 estimator and stage
    // transition end to end.
    device.set_next_readout(CorrelatorReadout {
        sample_count: (SAMPLE_FREQ / 1000.0) as u32,
        taps: [
            CorrIQ { i: 400, q: 20 },
            CorrIQ { i: 900, q: 10 },
            CorrIQ { i: 380, q: 20 },
        ],
    });

    for tick in 0..opt.ticks {
        bank.tick();
        if opt.verbose && tick % 50 == 0 {
            bank.emit_tracking_state();
            let m = bank.export_measurement(0).expect("channel 0 is running");
            log::info!(
                "{} tick={tick} cn0={:.1} tow_ms={:?} code_phase={:.3} chips",
                format!("PRN{}", opt.prn + 1).green(),
                m.snr,
                m.tow_ms,
                m.code_phase_chips,
            );
        }
    }

    let m = bank.export_measurement(0).expect("channel 0 is running");
    println!(
        "{}: cn0={:.1} tow_ms={:?} code_phase={:.3} chips carrier_freq={:.1} Hz",
        format!("PRN{}", opt.prn + 1).green().bold(),
        m.snr,
        m.tow_ms,
        m.code_phase_chips,
        m.carrier_freq,
    );
}

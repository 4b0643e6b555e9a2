use std::net::SocketAddr;

use anyhow::Context;
use structopt::StructOpt;

mod connectivity;
mod handlers;
mod hw;
mod server;

use handlers::{AppState, CaptureDefaults};
use hw::Board;
use parrot_shared::CaptureConfig;

#[derive(Debug, StructOpt)]
#[structopt(name = "parrot", about = "IR remote capture and replay daemon")]
struct Opt {
    #[structopt(short, long)]
    debug: bool,
    /// Use simulated hardware instead of GPIO and PWM
    #[structopt(long)]
    simulate: bool,
    /// Carrier frequency in Hz
    #[structopt(long, default_value = "38000")]
    carrier_hz: u32,
    /// Capture window in microseconds
    #[structopt(long, default_value = "2000000")]
    window_us: u64,
    /// Pause between receiver line samples in microseconds
    #[structopt(long, default_value = "10")]
    sample_delay_us: u64,
    /// Treat the receiver line as active high (skip inversion)
    #[structopt(long)]
    no_invert: bool,
    /// Hardware PWM channel of the IR emitter (rpi builds)
    #[structopt(long, default_value = "0")]
    pwm_channel: u8,
    /// BCM number of the IR receiver pin (rpi builds)
    #[structopt(long)]
    input_pin: Option<u8>,
    /// BCM number of the indicator LED pin (rpi builds)
    #[structopt(long)]
    led_pin: Option<u8>,
    /// Listen addresses, tried in order. Defaults to 0.0.0.0:8000
    #[structopt(long = "listen")]
    listen: Vec<SocketAddr>,
    #[structopt(subcommand)]
    cmd: Option<CliCommand>,
}

#[derive(StructOpt, Debug)]
enum CliCommand {
    /// Bring up the network and serve the HTTP API (the default)
    Serve,
    /// Capture once and print the trace as JSON
    Capture,
    /// Capture once, then replay what was heard
    Repeat,
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    let loglevel = if opt.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(loglevel)
        .init();

    if opt.sample_delay_us == 0 {
        anyhow::bail!("--sample-delay-us must be at least 1");
    }

    let settings = CaptureConfig {
        window_us: opt.window_us,
        sample_delay_us: opt.sample_delay_us,
        invert: !opt.no_invert,
    };
    let defaults = CaptureDefaults {
        window_us: settings.window_us,
        invert: settings.invert,
    };
    let board = build_board(&opt, settings)?;

    match &opt.cmd {
        None | Some(CliCommand::Serve) => run_serve(&opt, board, defaults),
        Some(CliCommand::Capture) => run_capture(board, &settings),
        Some(CliCommand::Repeat) => run_repeat(board, &settings),
    }
}

fn build_board(opt: &Opt, settings: CaptureConfig) -> anyhow::Result<Board> {
    if opt.simulate {
        log::info!("using simulated hardware");
        return Ok(hw::simulated_board(opt.carrier_hz, settings));
    }
    #[cfg(feature = "rpi")]
    {
        hw::rpi_board(
            opt.carrier_hz,
            opt.pwm_channel,
            opt.input_pin,
            opt.led_pin,
            settings,
        )
    }
    #[cfg(not(feature = "rpi"))]
    {
        anyhow::bail!("built without GPIO support, rerun with --simulate or build with --features rpi")
    }
}

fn run_serve(opt: &Opt, board: Board, defaults: CaptureDefaults) -> anyhow::Result<()> {
    let candidates: Vec<SocketAddr> = if opt.listen.is_empty() {
        vec![SocketAddr::from(([0, 0, 0, 0], connectivity::DEFAULT_PORT))]
    } else {
        opt.listen.clone()
    };
    let listener = connectivity::wait_for_network(&candidates, connectivity::ATTEMPT_TIMEOUT)
        .context("bringing up the listening socket")?;
    log::info!("Starting web server on http://{}", listener.local_addr()?);

    let mut state = AppState::new(board.ir, board.led, defaults);
    let router = handlers::router(&state)?;
    log::info!("{} routes registered", router.len());
    server::serve(listener, &router, &mut state)?;
    Ok(())
}

fn run_capture(mut board: Board, settings: &CaptureConfig) -> anyhow::Result<()> {
    if !board.ir.can_capture() {
        anyhow::bail!("no IR receiver input configured");
    }
    let trace = board
        .ir
        .capture(settings.window_us, settings.invert)
        .context("capture failed")?;
    log::info!("captured {} edges over {} us", trace.len(), trace.span_us());
    println!("{}", serde_json::to_string_pretty(&trace)?);
    Ok(())
}

fn run_repeat(mut board: Board, settings: &CaptureConfig) -> anyhow::Result<()> {
    if !board.ir.can_capture() {
        anyhow::bail!("no IR receiver input configured");
    }
    let trace = board
        .ir
        .capture(settings.window_us, settings.invert)
        .context("capture failed")?;
    board.ir.replay(&trace);
    Ok(())
}

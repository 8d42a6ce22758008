mod logging;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

use rfgen_engine::{
    EngineConfig, GeneratorCore, GeneratorHandle, GeneratorManager, ModelProfile, PortDescriptor,
    SimulatedLink, Uncalibrated,
};
use rfgen_messages::{Event, FrequencyGrid, LevelControlMode, SweepMode, SweepSpec};

/// rfgen - control a USB RF signal generator
#[derive(Parser, Debug)]
#[command(name = "rfgen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Generator model (see `rfgen models`)
    #[arg(short = 'm', long = "model", default_value = "RFG-60")]
    model: String,

    /// Serial port the generator is attached to
    #[arg(short = 'p', long = "port", default_value = "/dev/ttyACM0")]
    port: String,

    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,

    /// Append log output to this file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List known generator models
    Models,
    /// Connect and print the generator identity and state
    Info,
    /// Program a carrier
    Set {
        /// Frequency in Hz
        #[arg(short = 'f', long)]
        frequency: Option<f64>,
        /// Amplitude in volts
        #[arg(short = 'a', long)]
        amplitude: Option<f64>,
        /// Frequency grid step in kHz (1, 2, 5 or 10)
        #[arg(short = 'g', long, value_parser = parse_grid)]
        grid: Option<FrequencyGrid>,
        /// Program the level as attenuation below full scale
        #[arg(long)]
        attenuation: bool,
        /// Switch the RF output on
        #[arg(long)]
        on: bool,
    },
    /// Run an FM sweep and print every frequency it commits
    Sweep {
        /// Start frequency in Hz
        start: f64,
        /// Stop frequency in Hz
        stop: f64,
        /// Step in Hz
        step: f64,
        /// Dwell time per step in milliseconds
        #[arg(long = "step-ms", default_value = "10")]
        step_ms: u64,
        #[arg(long, value_enum, default_value_t = Mode::Up)]
        mode: Mode,
        /// Seed of the hop sequence in fhss mode
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Keep sweeping for this many milliseconds instead of a single pass
        #[arg(long = "budget-ms")]
        budget_ms: Option<u64>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Mode {
    Up,
    Down,
    Fhss,
}

fn parse_grid(s: &str) -> Result<FrequencyGrid, String> {
    let khz: u64 = s
        .trim()
        .parse()
        .map_err(|e| format!("Invalid grid step: {}", e))?;
    FrequencyGrid::ALL
        .into_iter()
        .find(|g| khz.checked_mul(1_000) == Some(g.step().as_hz()))
        .ok_or_else(|| format!("Unsupported grid step: {} kHz", khz))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug, cli.log_file.as_deref())?;

    if let Action::Models = cli.action {
        for profile in ModelProfile::known() {
            let id = &profile.identity;
            println!(
                "{:<8} {:04x}:{:04x}  {} - {}",
                profile.name, id.vendor_id, id.product_id, id.lowest_frequency, id.highest_frequency
            );
        }
        return Ok(());
    }

    let profile = ModelProfile::by_name(&cli.model)
        .ok_or_else(|| anyhow!("Unknown model {}, try `rfgen models`", cli.model))?;
    let port = PortDescriptor::new(
        cli.port.clone(),
        profile.identity.vendor_id,
        profile.identity.product_id,
    );

    // No hardware transport is compiled in; the simulated device acknowledges
    // every command so the whole control path can be exercised.
    let (link, _device) = SimulatedLink::new();
    let core = GeneratorCore::new(Box::new(profile), Box::new(link), Box::new(Uncalibrated));

    let mut manager = GeneratorManager::new();
    let id = manager.spawn(core, EngineConfig::default())?;
    let handle = manager
        .handle(id)
        .cloned()
        .ok_or_else(|| anyhow!("{} vanished", id))?;

    let events = handle.subscribe()?;
    handle
        .connect(port)
        .with_context(|| format!("cannot connect to {}", cli.port))?;

    let result = run(&handle, &events, cli.action);
    handle.disconnect()?;
    print_events(&events);
    manager.shutdown_all()?;
    result
}

fn run(
    handle: &GeneratorHandle,
    events: &flume::Receiver<Event>,
    action: Action,
) -> anyhow::Result<()> {
    match action {
        Action::Models => {}
        Action::Info => {
            print_events(events);
            println!("{:#?}", handle.snapshot()?);
        }
        Action::Set {
            frequency,
            amplitude,
            grid,
            attenuation,
            on,
        } => {
            if let Some(grid) = grid {
                handle.set_frequency_grid(grid)?;
            }
            if attenuation {
                handle.set_level_control_mode(LevelControlMode::Attenuation)?;
            }
            if let Some(hz) = frequency {
                handle.set_frequency(hz)?;
            }
            if let Some(volts) = amplitude {
                handle.set_amplitude(volts)?;
            }
            if on {
                handle.turn_on(true)?;
            }
            print_events(events);
            println!("{:#?}", handle.snapshot()?);
        }
        Action::Sweep {
            start,
            stop,
            step,
            step_ms,
            mode,
            seed,
            budget_ms,
        } => {
            let mut spec = SweepSpec::new(start, stop, step, Duration::from_millis(step_ms));
            if let Some(ms) = budget_ms {
                spec = spec.with_budget(Duration::from_millis(ms));
            }
            let mode = match mode {
                Mode::Up => SweepMode::UpChirp,
                Mode::Down => SweepMode::DownChirp,
                Mode::Fhss => SweepMode::Fhss { seed },
            };
            // Hop sequences ignore the budget
            let endless = matches!(mode, SweepMode::Fhss { .. });
            handle.turn_on(true)?;
            handle.start_fm(spec, mode)?;
            info!("Sweep running");
            follow_sweep(handle, events, endless)?;
        }
    }
    Ok(())
}

/// Print events until the sweep stops. An endless hop sequence is cut after
/// a fixed number of hops.
fn follow_sweep(
    handle: &GeneratorHandle,
    events: &flume::Receiver<Event>,
    endless: bool,
) -> anyhow::Result<()> {
    const MAX_HOPS: usize = 100;
    let mut hops = 0;
    loop {
        let event = events
            .recv_timeout(Duration::from_secs(5))
            .context("generator went silent during the sweep")?;
        print_event(&event);
        match event {
            Event::FmStopped | Event::Disconnected => return Ok(()),
            Event::FrequencyChanged(_) if endless => {
                hops += 1;
                if hops >= MAX_HOPS {
                    warn!("Stopping hop sequence after {} hops", MAX_HOPS);
                    handle.stop_fm()?;
                }
            }
            _ => {}
        }
    }
}

fn print_events(events: &flume::Receiver<Event>) {
    for event in events.try_iter() {
        print_event(&event);
    }
}

fn print_event(event: &Event) {
    match event {
        Event::StateSnapshot(_) => {}
        Event::Connected(id) => println!("connected {:04x}:{:04x}", id.vendor_id, id.product_id),
        Event::Disconnected => println!("disconnected"),
        Event::Error(msg) => println!("error: {}", msg),
        Event::FrequencyChanged(f) => println!("frequency {}", f),
        Event::AmplitudeChanged(v) => println!("amplitude {}", v),
        Event::PowerChanged(on) => println!("output {}", if *on { "on" } else { "off" }),
        Event::NetworkControlChanged(on) => println!("network control {}", on),
        Event::FmDurationChanged(secs) => println!("sweep duration {:.3} s", secs),
        Event::FmStopped => println!("sweep stopped"),
    }
}

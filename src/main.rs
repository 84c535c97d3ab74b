use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::info;
use jamsound::config::SoundConfig;
use jamsound::hal::recovery::drain_events;
use jamsound::hal::{BackendRegistry, SoundDriver, SoundSlot};
use jamsound::logging;

#[derive(Parser)]
#[command(name = "jamsound")]
#[command(version)]
#[command(about = "Sound device tool", long_about = None)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Sound backend (see `backends`)
    #[arg(short, long)]
    backend: Option<String>,

    /// JSON config file, created with defaults if missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices of the backend
    #[command(alias = "ls")]
    List,

    /// List registered backends
    Backends,

    /// Open a device and monitor its input through the output
    Run {
        /// Device name (host default if omitted)
        #[arg(short, long)]
        device: Option<String>,

        /// Requested frames per block
        #[arg(long)]
        buffer: Option<u32>,

        /// Stop after this many seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Linear gain applied to the monitored signal
        #[arg(long, default_value_t = 1.0)]
        gain: f32,
    },
}

async fn load_config(cli: &Cli) -> Result<SoundConfig> {
    let mut config = match &cli.config {
        Some(path) => SoundConfig::load(path).await?,
        None => SoundConfig::default(),
    };
    if let Some(backend) = &cli.backend {
        config.backend = backend.clone();
    }
    Ok(config)
}

fn list_devices(registry: &BackendRegistry, config: &SoundConfig) -> Result<()> {
    let mut driver = registry.create(&config.backend, Box::new(|_| {}))?;
    let count = driver.create_device_list(true);
    if count == 0 {
        bail!("No devices found: {:?}", driver.last_fault());
    }

    println!("{} devices on {}:", count, driver.driver_name());
    for device in driver.devices() {
        println!(
            "  [{}] {}{}  (in: {}, out: {})",
            device.index,
            device.name,
            if device.is_default { " *" } else { "" },
            device.input_channels,
            device.output_channels,
        );
    }
    Ok(())
}

async fn run(
    registry: &BackendRegistry,
    mut config: SoundConfig,
    device: Option<String>,
    buffer: Option<u32>,
    seconds: u64,
    gain: f32,
) -> Result<()> {
    if device.is_some() {
        config.device = device;
    }
    if let Some(buffer) = buffer {
        config.buffer_size = buffer;
    }

    let peak = Arc::new(AtomicU32::new(0));
    let meter = peak.clone();
    let driver = registry.create(
        &config.backend,
        Box::new(move |samples: &mut [i16]| {
            let mut block_peak = 0u32;
            for sample in samples.iter_mut() {
                *sample = (*sample as f32 * gain).clamp(-32768.0, 32767.0) as i16;
                block_peak = block_peak.max(sample.unsigned_abs() as u32);
            }
            meter.fetch_max(block_peak, Ordering::Relaxed);
        }),
    )?;

    let slot = SoundSlot::new();
    let (handle, _) = slot.install(driver);
    let events = handle.with(|driver| driver.events());

    let started = handle.with(|driver| config.apply(driver) && driver.start());
    if !started {
        let fault = handle.with(|driver| driver.last_fault());
        bail!("Could not start audio: {:?}", fault);
    }

    let properties = handle.properties();
    info!(
        device = ?properties.device_name,
        frames = properties.buffer_size,
        format = ?properties.sample_format,
        "Running"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                handle.with(|driver| drain_events(driver, &events, config.device.as_deref()));
                let level = peak.swap(0, Ordering::Relaxed) as f32 / 32768.0;
                info!(peak = %format!("{:.3}", level), state = ?handle.with(|d| d.state()), "Level");
            }
        }
    }

    handle.with(|driver| {
        driver.stop();
        driver.close_current_device();
    });
    slot.clear();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(&cli.verbose);

    let registry = BackendRegistry::with_defaults();
    let config = load_config(&cli).await.context("Failed to load sound config")?;

    match cli.command {
        Commands::List => list_devices(&registry, &config),
        Commands::Backends => {
            for name in registry.list() {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Run {
            device,
            buffer,
            seconds,
            gain,
        } => run(&registry, config, device, buffer, seconds, gain).await,
    }
}

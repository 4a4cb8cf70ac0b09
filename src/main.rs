use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sound_helper::{
    create_router, run_host_loop, AppState, CompressionType, Config, NotifyFlag, RecordQuality,
    SimulatedSoundService, SoundBuffer, SoundFormat, SoundHelper, SoundLibrary,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "sound-helper",
    version,
    about = "Asynchronous sound playback and recording helper"
)]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/sound-helper")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API (default)
    Serve,
    /// Run a scripted playback and recording session and print the results
    Demo {
        /// Seconds of audio to record
        #[arg(long, default_value_t = 2)]
        record_secs: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Sound Helper v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::Demo { record_secs } => demo(cfg, record_secs),
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let library = SoundLibrary::load_dir(cfg.library.sounds_path())?;
    info!("Sound library: {} sounds", library.len());

    let helper = SoundHelper::new(
        SimulatedSoundService::new(cfg.simulator.clone()),
        NotifyFlag::new(),
        cfg.helper.clone(),
    )?;
    let helper = Arc::new(Mutex::new(helper));

    let host = tokio::spawn(run_host_loop(
        Arc::clone(&helper),
        cfg.helper.idle_interval(),
    ));

    let app = create_router(AppState::new(Arc::clone(&helper), library));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await?;

    host.abort();

    let report = helper.lock().await.shutdown();
    info!("Shutdown report: {:?}", report);

    Ok(())
}

/// Half a second of 8-bit mono ramp at 22 kHz.
fn demo_sound() -> Result<SoundBuffer> {
    let format = SoundFormat {
        channels: 1,
        sample_rate: 22050,
        sample_size: 8,
        compression: CompressionType::NONE,
    };
    let samples: Vec<u8> = (0..11025u32).map(|i| (i % 256) as u8).collect();
    Ok(SoundBuffer::from_samples(format, &samples)?)
}

fn demo(cfg: Config, record_secs: u16) -> Result<()> {
    let step = Duration::from_millis(50);
    let mut helper = SoundHelper::new(
        SimulatedSoundService::new(cfg.simulator.clone()),
        NotifyFlag::new(),
        cfg.helper.clone(),
    )?;

    let sound = demo_sound()?;
    sound.set_purgeable(true);

    // The same buffer twice: the second trigger must not unpin it early.
    let first = helper.play(Some(&sound))?;
    let second = helper.play(Some(&sound))?;
    helper.pause(second)?;

    let mut playback = Vec::new();
    for tick in 0..20 {
        if tick == 4 {
            helper.resume(second)?;
        }
        helper.service_mut().advance(step);
        if helper.needs_idle() {
            helper.idle();
        }
        playback.push(serde_json::json!({
            "ms": (tick + 1) * step.as_millis() as u32,
            "first": helper.status(first),
            "second": helper.status(second),
            "purgeable": sound.state().purgeable,
        }));
    }

    let done = NotifyFlag::new();
    let bytes_per_second = cfg.simulator.input_sample_rate as usize
        * cfg.simulator.input_channels as usize
        * (cfg.simulator.input_sample_size as usize).div_ceil(8);
    let max_kilobytes = (bytes_per_second * record_secs as usize)
        .div_ceil(1024)
        .min(u16::MAX as usize) as u16;
    helper.record_start(max_kilobytes, RecordQuality::Better, Some(done.clone()))?;

    let mut record_ticks = 0;
    while !done.is_raised() && record_ticks < 10_000 {
        helper.service_mut().advance(step);
        if helper.needs_idle() {
            helper.idle();
        }
        record_ticks += 1;
    }

    let recording = match helper.get_recorded_sound() {
        Ok(sound) => {
            let header = sound.header()?;
            serde_json::json!({
                "bytes": sound.len(),
                "sample_bytes": header.data_len,
                "format": header.format,
            })
        }
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    };

    let report = helper.shutdown();

    let summary = serde_json::json!({
        "playback": playback,
        "recording": recording,
        "shutdown": report,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

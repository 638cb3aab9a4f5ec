//! Binary entrypoint for the camlink CLI.
//!
//! Commands:
//! - `ports` - list serial ports
//! - `capture --port <path|tcp://host:port> --out <file>` - take a JPEG snapshot and save it
//! - `demo --out <file>` - run the same capture against the simulated camera
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camlink_core::config::CameraConfig;
use camlink_core::demo::SimulatedCamera;
use camlink_core::protocol::{
    list_ports, BaudRate, Camera, ColorType, JpegResolution, LightFrequency, PictureType,
    PreviewResolution, SnapshotType, TcpTransport, Transport,
};

#[derive(Parser)]
#[command(name = "camlink")]
#[command(about = "Capture pictures from C328-class serial JPEG cameras")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    Ports,
    /// Capture a JPEG picture from a camera
    Capture {
        /// Camera serial port (e.g., /dev/ttyUSB0), or tcp://host:port for a
        /// serial-over-TCP bridge
        #[arg(short, long)]
        port: Option<String>,
        /// Baud rate used to open the port
        #[arg(short, long)]
        baud: Option<u32>,
        /// Switch the camera to this baud rate after sync
        #[arg(long)]
        switch_baud: Option<u32>,
        #[command(flatten)]
        picture: PictureArgs,
    },
    /// Capture from the simulated camera
    Demo {
        /// Size of the simulated picture in bytes
        #[arg(long, default_value_t = 12_000)]
        size: usize,
        /// Seed for the simulated picture content
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Packets the simulated camera loses once
        #[arg(long, value_delimiter = ',')]
        drop: Vec<u16>,
        #[command(flatten)]
        picture: PictureArgs,
    },
}

#[derive(clap::Args)]
struct PictureArgs {
    /// JPEG resolution
    #[arg(short, long, default_value = "320x240", value_parser = parse_resolution)]
    resolution: JpegResolution,
    /// Time the camera gets to encode the picture, in milliseconds
    #[arg(short, long, default_value_t = 800)]
    delay: u64,
    /// Mains frequency for flicker suppression
    #[arg(long, value_enum)]
    light: Option<Mains>,
    /// Output file
    #[arg(short, long)]
    out: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mains {
    #[value(name = "50")]
    Hz50,
    #[value(name = "60")]
    Hz60,
}

impl From<Mains> for LightFrequency {
    fn from(m: Mains) -> Self {
        match m {
            Mains::Hz50 => LightFrequency::F50Hz,
            Mains::Hz60 => LightFrequency::F60Hz,
        }
    }
}

fn parse_resolution(s: &str) -> Result<JpegResolution, String> {
    JpegResolution::parse(s)
        .ok_or_else(|| format!("unsupported resolution '{}' (80x64, 160x128, 320x240, 640x480)", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => CameraConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CameraConfig::default(),
    };

    match cli.command {
        Commands::Ports => {
            let ports = list_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                match (port.vid, port.pid) {
                    (Some(vid), Some(pid)) => println!(
                        "{}  {:04x}:{:04x}  {}",
                        port.name,
                        vid,
                        pid,
                        port.product.unwrap_or_default()
                    ),
                    _ => println!("{}", port.name),
                }
            }
        }
        Commands::Capture {
            port,
            baud,
            switch_baud,
            picture,
        } => {
            if let Some(port) = port {
                config.port_name = port;
            }
            if let Some(baud) = baud {
                config.baud_rate = baud;
            }
            anyhow::ensure!(!config.port_name.is_empty(), "no serial port given");

            let switch = switch_baud
                .map(|bps| {
                    BaudRate::from_bits_per_second(bps)
                        .with_context(|| format!("camera cannot run at {} baud", bps))
                })
                .transpose()?;

            match Link::parse(&config.port_name) {
                Link::Tcp(addr) => {
                    anyhow::ensure!(
                        switch.is_none(),
                        "--switch-baud needs a directly attached serial port"
                    );
                    config.validate()?;
                    let transport = TcpTransport::connect(&addr)
                        .with_context(|| format!("connecting to {}", addr))?;
                    run_capture(Camera::new(transport, config), None, &picture)?;
                }
                Link::Serial => {
                    let camera = Camera::open(config).context("opening camera port")?;
                    run_capture(camera, switch, &picture)?;
                }
            }
        }
        Commands::Demo {
            size,
            seed,
            drop,
            picture,
        } => {
            let mut sim = SimulatedCamera::with_random_image(size, seed).boot_delay(3);
            for id in drop {
                sim = sim.drop_packet_once(id);
            }
            let mut camera = Camera::new(sim, config.without_delays());
            camera.synchronize().context("synchronizing with simulated camera")?;
            let jpeg = capture(&mut camera, &picture)?;
            anyhow::ensure!(
                jpeg == camera.transport().image(),
                "simulated picture differs from what was received"
            );
            save(&picture.out, &jpeg)?;
        }
    }

    Ok(())
}

/// How the camera is reached
#[derive(Debug, PartialEq)]
enum Link {
    Serial,
    /// Serial-over-TCP bridge at `host:port`
    Tcp(String),
}

impl Link {
    fn parse(port: &str) -> Self {
        match port.strip_prefix("tcp://") {
            Some(addr) => Link::Tcp(addr.to_string()),
            None => Link::Serial,
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn setup<T: Transport>(camera: &mut Camera<T>, args: &PictureArgs) -> Result<()> {
    if let Some(light) = args.light {
        camera
            .set_light_frequency(light.into())
            .context("setting light frequency")?;
    }
    camera
        .initialize(ColorType::Jpeg, PreviewResolution::R160x120, args.resolution)
        .context("initializing camera")?;
    Ok(())
}

fn take_picture<T: Transport>(camera: &mut Camera<T>, args: &PictureArgs) -> Result<Vec<u8>> {
    camera
        .snapshot(SnapshotType::Compressed, 0)
        .context("taking snapshot")?;
    let jpeg = camera
        .get_jpeg_picture(PictureType::Snapshot, Duration::from_millis(args.delay))
        .context("fetching picture")?;
    Ok(jpeg)
}

fn run_capture<T: Transport>(
    mut camera: Camera<T>,
    switch: Option<BaudRate>,
    args: &PictureArgs,
) -> Result<()> {
    camera.synchronize().context("synchronizing with camera")?;
    if let Some(rate) = switch {
        camera.set_baud_rate(rate).context("changing baud rate")?;
    }
    let jpeg = capture(&mut camera, args)?;
    save(&args.out, &jpeg)
}

/// Set up the camera and take one picture; on failure reset the camera and
/// try once more
fn capture<T: Transport>(camera: &mut Camera<T>, args: &PictureArgs) -> Result<Vec<u8>> {
    setup(camera, args)?;
    match take_picture(camera, args) {
        Ok(jpeg) => Ok(jpeg),
        Err(e) => {
            warn!("capture failed: {:#}; resetting camera", e);
            camera.reset(true).context("resetting camera")?;
            camera.synchronize().context("synchronizing after reset")?;
            setup(camera, args)?;
            take_picture(camera, args)
        }
    }
}

fn save(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    info!(bytes = data.len(), path = %path.display(), "picture saved");
    Ok(())
}

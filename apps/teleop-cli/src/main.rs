use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use teleop_devices::{
    BiSo101Leader, BimanualConfig, GamepadConfig, GamepadDevice, KeyboardConfig, KeyboardDevice,
    LeaderConfig, RobotObservation, So101Leader, TeleopDevice,
};

#[derive(Parser, Debug)]
#[command(
    name = "teleop",
    version,
    about = "Arm teleoperation devices",
    disable_help_subcommand = true
)]
struct Cli {
    /// Calibration directory (overrides TELEOP_CALIBRATION_DIR)
    #[arg(long, global = true)]
    calibration_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DeviceChoice {
    Keyboard,
    Gamepad,
    So101Leader,
    BiSo101Leader,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator-guided leader calibration and persist it to disk.
    /// Interactive and blocking; never part of the control loop.
    Calibrate {
        /// Serial port of the leader arm
        #[arg(long, default_value = "/dev/ttyACM0")]
        port: String,
        /// Calibration file name to (over)write
        #[arg(long, default_value = "so101_leader.json")]
        file: String,
    },
    /// Construct a device and drive its step loop, logging each emitted
    /// step as a JSON line
    Run {
        #[arg(long, value_enum, default_value_t = DeviceChoice::Keyboard)]
        device: DeviceChoice,
        /// Serial port (leader); left arm port for bimanual
        #[arg(long, default_value = "/dev/ttyACM0")]
        port: String,
        /// Right arm port (bimanual only)
        #[arg(long, default_value = "/dev/ttyACM1")]
        right_port: String,
        /// Control loop rate in Hz
        #[arg(long, default_value_t = 60.0)]
        rate: f64,
        /// Sensitivity factor applied to all input scaling groups
        #[arg(long, default_value_t = 1.0)]
        sensitivity: f32,
        /// Analog deadzone (gamepad)
        #[arg(long, default_value_t = 0.5)]
        deadzone: f32,
        /// Force recalibration before connecting (leader devices)
        #[arg(long, action = ArgAction::SetTrue)]
        recalibrate: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let calibration_dir = resolve_calibration_dir(cli.calibration_dir);

    match cli.command {
        Commands::Calibrate { port, file } => {
            let config = LeaderConfig {
                port,
                calibration_dir,
                calibration_file: file,
                recalibrate: true,
                verbose: false,
            };
            So101Leader::calibrate(&config).context("calibration failed")?;
            Ok(())
        }
        Commands::Run {
            device,
            port,
            right_port,
            rate,
            sensitivity,
            deadzone,
            recalibrate,
        } => {
            let device = build_device(
                device,
                port,
                right_port,
                calibration_dir,
                sensitivity,
                deadzone,
                recalibrate,
            )?;
            run_loop(device, rate)
        }
    }
}

fn resolve_calibration_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("TELEOP_CALIBRATION_DIR").map(PathBuf::from))
        .unwrap_or_else(teleop_devices::default_calibration_dir)
}

fn build_device(
    choice: DeviceChoice,
    port: String,
    right_port: String,
    calibration_dir: PathBuf,
    sensitivity: f32,
    deadzone: f32,
    recalibrate: bool,
) -> Result<Box<dyn TeleopDevice>> {
    Ok(match choice {
        DeviceChoice::Keyboard => Box::new(KeyboardDevice::new(KeyboardConfig {
            sensitivity,
            ..KeyboardConfig::default()
        })),
        DeviceChoice::Gamepad => Box::new(
            GamepadDevice::new(GamepadConfig {
                sensitivity,
                deadzone,
                ..GamepadConfig::default()
            })
            .context("gamepad device")?,
        ),
        DeviceChoice::So101Leader => Box::new(
            So101Leader::new(LeaderConfig {
                port,
                calibration_dir,
                recalibrate,
                ..LeaderConfig::default()
            })
            .context("SO-101 leader device")?,
        ),
        DeviceChoice::BiSo101Leader => Box::new(
            BiSo101Leader::new(BimanualConfig {
                left_port: port,
                right_port,
                calibration_dir,
                recalibrate,
            })
            .context("bimanual SO-101 leader device")?,
        ),
    })
}

fn run_loop(mut device: Box<dyn TeleopDevice>, rate: f64) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing Ctrl+C handler")?;

    // Without the environment collaborator there is no pose feedback; the
    // tool and root frames are taken as aligned.
    let observation = RobotObservation::default();
    let period = Duration::from_secs_f64(1.0 / rate.max(1.0));
    info!("press B to start, R/N to reset, Ctrl+C to quit");

    while running.load(Ordering::SeqCst) {
        let tick = Instant::now();
        if let Some(step) = device.advance(&observation)? {
            println!("{}", serde_json::to_string(&step)?);
        }
        let elapsed = tick.elapsed();
        if elapsed < period {
            std::thread::sleep(period - elapsed);
        }
    }

    info!("teleoperation ended");
    // Dropping the device releases its input hook and hardware connection.
    drop(device);
    Ok(())
}

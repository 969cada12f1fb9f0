use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use motordrive_frame::{ConfigLayout, NetworkInfo, ProtocolShape};
use motordrive_session::{DriverClient, SessionBuilder, SessionPhase};
use motordrive_transport::WsConnector;
use tracing::debug;

use crate::exit::{session_error, timeout_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod config;
pub mod drive;
pub mod join;
pub mod monitor;
pub mod networks;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream telemetry from a driver.
    Monitor(MonitorArgs),
    /// Scan for wifi networks visible to a driver.
    Networks(NetworksArgs),
    /// Read, write or reload a driver's configuration.
    Config(ConfigArgs),
    /// Join a wifi network or switch the driver to access point mode.
    Join(JoinArgs),
    /// Drive channels with a constant power or seek target, then release.
    Drive(DriveArgs),
    /// Serve a simulated driver over WebSocket.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format).await,
        Command::Networks(args) => networks::run(args, format).await,
        Command::Config(args) => config::run(args, format).await,
        Command::Join(args) => join::run(args, format).await,
        Command::Drive(args) => drive::run(args, format).await,
        Command::Simulate(args) => simulate::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Channel counts and config layout; both ends must agree.
#[derive(Args, Debug, Clone)]
pub struct ShapeArgs {
    /// Number of motor channels.
    #[arg(long, default_value_t = motordrive_frame::DEFAULT_MOTOR_CHANNELS)]
    pub motor_channels: usize,
    /// Number of pressure channels.
    #[arg(long, default_value_t = motordrive_frame::DEFAULT_PRESSURE_CHANNELS)]
    pub pressure_channels: usize,
    /// Use the config layout with per-channel power and current limits.
    #[arg(long)]
    pub limits: bool,
}

impl ShapeArgs {
    pub fn shape(&self) -> ProtocolShape {
        ProtocolShape {
            motor_channels: self.motor_channels,
            pressure_channels: self.pressure_channels,
            config_layout: if self.limits {
                ConfigLayout::Limits
            } else {
                ConfigLayout::Base
            },
        }
    }
}

/// Where the driver is and how long to wait for it.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Driver socket URL (e.g. ws://192.168.4.1/ws).
    #[arg(long, env = "MOTORDRIVE_URL")]
    pub url: String,
    /// How long to wait for the driver to connect and answer (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    #[command(flatten)]
    pub shape: ShapeArgs,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Exit after printing N snapshots.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long (e.g. 10s).
    #[arg(long)]
    pub duration: Option<String>,
}

#[derive(Args, Debug)]
pub struct NetworksArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the current configuration.
    Get,
    /// Send a configuration read from a JSON file.
    Set {
        /// JSON file in the format printed by `config get --format json`.
        file: PathBuf,
        /// Also store it in the driver's non-volatile memory.
        #[arg(long)]
        save: bool,
    },
    /// Discard unsaved changes and reload the stored configuration.
    Reload,
}

#[derive(Args, Debug)]
pub struct JoinArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Network name. With --access-point, the name of the driver's own network.
    pub ssid: String,
    /// Network passphrase.
    #[arg(long, default_value = "")]
    pub password: String,
    /// Host an access point instead of joining a router.
    #[arg(long)]
    pub access_point: bool,
}

#[derive(Args, Debug)]
pub struct DriveArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Channels to drive (comma-separated). Default: all motor channels.
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<usize>>,
    /// Drive power in [-1, 1].
    #[arg(long, allow_negative_numbers = true)]
    pub power: f32,
    /// Seek target as a fraction of each channel's range.
    #[arg(long)]
    pub seek: Option<f32>,
    /// How long to keep commanding before releasing (e.g. 2s, 500ms).
    #[arg(long, default_value = "1s")]
    pub duration: String,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address to listen on. Port 0 picks a free port.
    #[arg(long, default_value = "127.0.0.1:8765")]
    pub bind: String,
    #[command(flatten)]
    pub shape: ShapeArgs,
    /// Network reported by scans, as SSID:RSSI (repeatable).
    #[arg(long = "network", value_name = "SSID:RSSI", value_parser = parse_network)]
    pub networks: Vec<NetworkInfo>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `150ms`, `2m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit_ms) = if let Some(num) = input.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = input.strip_suffix('m') {
        (num, 60_000)
    } else {
        (input, 1_000)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(Duration::from_millis(value.saturating_mul(unit_ms)))
}

fn parse_network(input: &str) -> Result<NetworkInfo, String> {
    let (ssid, rssi) = input
        .rsplit_once(':')
        .ok_or_else(|| format!("expected SSID:RSSI, got {input}"))?;
    let rssi = rssi
        .parse()
        .map_err(|_| format!("invalid RSSI in {input}"))?;
    Ok(NetworkInfo {
        ssid: ssid.to_string(),
        rssi,
    })
}

/// Start a session and wait until its socket is open.
pub async fn open_session(device: &DeviceArgs) -> CliResult<DriverClient> {
    let timeout = parse_duration(&device.timeout)?;
    let client = SessionBuilder::new(WsConnector::new())
        .with_url(device.url.as_str())
        .with_shape(device.shape.shape())
        .spawn();
    client
        .connect(None)
        .await
        .map_err(|err| session_error("connect failed", err))?;
    within(timeout, "connect", client.wait_for_phase(SessionPhase::Connected))
        .await?
        .map_err(|err| session_error("connect failed", err))?;
    debug!(url = %device.url, "driver connected");
    Ok(client)
}

/// Release commands and close the socket before exiting.
pub async fn finish(client: DriverClient) -> CliResult<()> {
    client
        .shutdown()
        .await
        .map_err(|err| session_error("shutdown failed", err))
}

/// Run `fut`, failing with a TIMEOUT error once `limit` passes.
pub async fn within<T>(limit: Duration, context: &str, fut: impl Future<Output = T>) -> CliResult<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| timeout_error(context, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn parse_network_splits_on_last_colon() {
        let network = parse_network("lab:guest:-61").unwrap();
        assert_eq!(network.ssid, "lab:guest");
        assert_eq!(network.rssi, -61);
        assert!(parse_network("lab").is_err());
        assert!(parse_network("lab:-300").is_err());
    }

    #[test]
    fn limits_flag_selects_layout() {
        let args = ShapeArgs {
            motor_channels: 4,
            pressure_channels: 2,
            limits: true,
        };
        let shape = args.shape();
        assert_eq!(shape.motor_channels, 4);
        assert_eq!(shape.config_layout, ConfigLayout::Limits);
    }
}

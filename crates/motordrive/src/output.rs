use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use motordrive_frame::{DriverConfig, NetworkInfo};
use motordrive_session::DriverState;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

const STATE_SCHEMA: &str = "motordrive/cli/v1/state";
const CONFIG_SCHEMA: &str = "motordrive/cli/v1/config";
const NETWORKS_SCHEMA: &str = "motordrive/cli/v1/networks";
const EVENT_SCHEMA: &str = "motordrive/cli/v1/event";

/// One JSON line: a schema tag, a timestamp and the flattened body.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_id: &'a str,
    timestamp: String,
    #[serde(flatten)]
    body: T,
}

fn print_json<T: Serialize>(schema_id: &str, body: T) {
    let out = Envelope {
        schema_id,
        timestamp: now_unix_millis(),
        body,
    };
    println!(
        "{}",
        serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Print one telemetry snapshot. With a config, seeks and positions are also
/// shown as fractions of each channel's range.
pub fn print_state(state: &DriverState, config: Option<&DriverConfig>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(STATE_SCHEMA, state),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CH", "POSITION", "SEEK", "POWER", "CURRENT"]);
            for (index, motor) in state.motor_channels.iter().enumerate() {
                let channel = config.and_then(|c| c.motor_channels.get(index));
                let seek = match channel {
                    Some(channel) => motor
                        .seek_fraction(channel)
                        .map(|f| format!("{:.0}%", f * 100.0)),
                    None => motor.has_target().then(|| format!("{:.3}", motor.seek)),
                };
                let position = match channel {
                    Some(channel) => format!("{:.0}%", motor.position_fraction(channel) * 100.0),
                    None => format!("{:.3}", motor.position),
                };
                table.add_row(vec![
                    index.to_string(),
                    position,
                    seek.unwrap_or_else(|| "-".to_string()),
                    format!("{:+.2}", motor.power),
                    format!("{:.3}", motor.current),
                ]);
            }
            println!("{}", summary(state));
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", summary(state)),
    }
}

fn summary(state: &DriverState) -> String {
    format!(
        "t={} dt={}ms local_dt={:.1}ms voltage={:.2}V current={:.3}A power={:.2}W fps={:.0} max_loop={:.2}ms",
        state.driver_time,
        state.driver_elapsed,
        state.local_elapsed.as_secs_f64() * 1000.0,
        state.voltage,
        state.current,
        state.power,
        state.fps,
        state.max_loop_time,
    )
}

pub fn print_config(config: &DriverConfig, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(CONFIG_SCHEMA, config),
        OutputFormat::Table => {
            let mut motors = Table::new();
            motors
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "CH", "MIN", "MAX", "REV OUT", "REV IN", "P", "I", "D", "THRESH", "OVERSHOOT",
                    "LIMITS",
                ]);
            for (index, channel) in config.motor_channels.iter().enumerate() {
                let limits = channel.limits.map_or_else(
                    || "-".to_string(),
                    |l| {
                        format!(
                            "{} min={:.2} max={:.2} avg={:.2}",
                            if l.enabled { "on" } else { "off" },
                            l.min_power,
                            l.max_current,
                            l.max_avg_current
                        )
                    },
                );
                motors.add_row(vec![
                    index.to_string(),
                    format!("{:.3}", channel.min_position),
                    format!("{:.3}", channel.max_position),
                    channel.reverse_output.to_string(),
                    channel.reverse_input.to_string(),
                    format!("{:.3}", channel.p),
                    format!("{:.3}", channel.i_time),
                    format!("{:.3}", channel.d_time),
                    format!("{:.3}", channel.threshold),
                    format!("{:.3}", channel.overshoot_threshold),
                    limits,
                ]);
            }

            let mut pressure = Table::new();
            pressure
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PRESSURE", "ZERO OFFSET", "COEFFICIENT"]);
            for (index, channel) in config.pressure_channels.iter().enumerate() {
                pressure.add_row(vec![
                    index.to_string(),
                    format!("{:.4}", channel.zero_offset),
                    format!("{:.4}", channel.coefficient),
                ]);
            }
            println!("{motors}");
            println!("{pressure}");
        }
        OutputFormat::Pretty => {
            for (index, c) in config.motor_channels.iter().enumerate() {
                println!(
                    "motor {index}: range=[{:.3}, {:.3}] reverse_out={} reverse_in={} p={} i={} d={}",
                    c.min_position,
                    c.max_position,
                    c.reverse_output,
                    c.reverse_input,
                    c.p,
                    c.i_time,
                    c.d_time
                );
            }
            for (index, c) in config.pressure_channels.iter().enumerate() {
                println!(
                    "pressure {index}: zero_offset={} coefficient={}",
                    c.zero_offset, c.coefficient
                );
            }
        }
    }
}

#[derive(Serialize)]
struct NetworksBody<'a> {
    networks: &'a [NetworkInfo],
}

pub fn print_networks(networks: &[NetworkInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(NETWORKS_SCHEMA, NetworksBody { networks }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SSID", "RSSI"]);
            for network in networks {
                table.add_row(vec![network.ssid.clone(), network.rssi.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for network in networks {
                println!("{} ({} dBm)", network.ssid, network.rssi);
            }
        }
    }
}

#[derive(Serialize)]
struct EventBody<'a> {
    event: &'a str,
    detail: &'a str,
}

/// Confirmation for commands that only send something.
pub fn print_event(event: &str, detail: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(EVENT_SCHEMA, EventBody { event, detail }),
        OutputFormat::Table | OutputFormat::Pretty => println!("{event}: {detail}"),
    }
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

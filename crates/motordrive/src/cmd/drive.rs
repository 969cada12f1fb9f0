use motordrive_frame::{zero_commands, ChannelCommand};
use motordrive_session::SessionError;
use tokio::time::sleep;

use crate::cmd::{finish, open_session, parse_duration, within, DriveArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_event, print_state, OutputFormat};

pub async fn run(args: DriveArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.device.timeout)?;
    let duration = parse_duration(&args.duration)?;
    if !(-1.0..=1.0).contains(&args.power) {
        return Err(CliError::new(USAGE, "power must be within [-1, 1]"));
    }
    if let Some(seek) = args.seek {
        if !(0.0..=1.0).contains(&seek) {
            return Err(CliError::new(USAGE, "seek must be within [0, 1]"));
        }
    }

    let shape = args.device.shape.shape();
    let channels = args
        .channels
        .unwrap_or_else(|| (0..shape.motor_channels).collect());
    if let Some(bad) = channels.iter().find(|&&c| c >= shape.motor_channels) {
        return Err(CliError::new(
            USAGE,
            format!(
                "channel {bad} out of range (driver has {})",
                shape.motor_channels
            ),
        ));
    }

    let command = match args.seek {
        Some(fraction) => ChannelCommand::seek(args.power, fraction),
        None => ChannelCommand::power(args.power),
    };
    let mut commands = zero_commands(shape.motor_channels);
    for &channel in &channels {
        commands[channel] = command;
    }

    let client = open_session(&args.device).await?;

    // Seeks are scaled by the channel ranges, so nothing goes out before a config.
    let mut config = client.watch_config();
    within(timeout, "waiting for config", config.wait_for(Option::is_some))
        .await?
        .map(|_| ())
        .map_err(|_| session_error("drive", SessionError::Stopped))?;

    client
        .set_commands(commands)
        .map_err(|err| session_error("drive", err))?;
    client
        .command()
        .map_err(|err| session_error("drive", err))?;
    print_event(
        "drive",
        &format!(
            "{} channel(s) at power {:+.2} for {duration:?}",
            channels.len(),
            args.power
        ),
        format,
    );

    tokio::select! {
        _ = sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    client
        .release()
        .map_err(|err| session_error("release", err))?;
    if let Some(state) = client.state() {
        print_state(&state, client.config().as_deref(), format);
    }

    finish(client).await?;
    Ok(SUCCESS)
}

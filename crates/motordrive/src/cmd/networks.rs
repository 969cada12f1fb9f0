use motordrive_session::SessionError;

use crate::cmd::{finish, open_session, parse_duration, within, NetworksArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_networks, OutputFormat};

pub async fn run(args: NetworksArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.device.timeout)?;
    let client = open_session(&args.device).await?;

    // The session scans as soon as the socket opens.
    let mut networks = client.watch_networks();
    within(timeout, "network scan", networks.changed())
        .await?
        .map_err(|_| session_error("network scan", SessionError::Stopped))?;
    let found = networks.borrow_and_update().clone();

    print_networks(&found, format);
    finish(client).await?;
    Ok(SUCCESS)
}

use crate::cmd::{finish, open_session, JoinArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub async fn run(args: JoinArgs, format: OutputFormat) -> CliResult<i32> {
    let client = open_session(&args.device).await?;
    client
        .connect_to_network(&args.ssid, &args.password, !args.access_point)
        .map_err(|err| session_error("join failed", err))?;

    let detail = if args.access_point {
        format!("hosting access point {}", args.ssid)
    } else {
        format!("joining {}", args.ssid)
    };
    print_event("join", &detail, format);

    // The device usually drops the socket while it switches networks.
    finish(client).await?;
    Ok(SUCCESS)
}

use motordrive_session::SessionError;
use tokio::time::sleep;

use crate::cmd::{finish, open_session, parse_duration, within, MonitorArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_state, OutputFormat};

pub async fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.device.timeout)?;
    let limit = args.duration.as_deref().map(parse_duration).transpose()?;

    let client = open_session(&args.device).await?;
    let mut states = client.watch_state();

    let stop = async move {
        match limit {
            Some(limit) => sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(stop);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut printed = 0usize;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = &mut interrupt => break,
            changed = within(timeout, "waiting for telemetry", states.changed()) => {
                changed?.map_err(|_| session_error("monitor", SessionError::Stopped))?;
            }
        }

        // Cleared while reconnecting.
        let Some(state) = states.borrow_and_update().clone() else {
            continue;
        };
        print_state(&state, client.config().as_deref(), format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    finish(client).await?;
    Ok(SUCCESS)
}

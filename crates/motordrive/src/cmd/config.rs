use std::sync::Arc;
use std::time::Duration;

use motordrive_frame::DriverConfig;
use motordrive_session::SessionError;
use tokio::sync::watch;

use crate::cmd::{finish, open_session, parse_duration, within, ConfigAction, ConfigArgs};
use crate::exit::{io_error, json_error, session_error, CliResult, SUCCESS};
use crate::output::{print_config, OutputFormat};

type ConfigWatch = watch::Receiver<Option<Arc<DriverConfig>>>;

pub async fn run(args: ConfigArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.device.timeout)?;

    // Read the file before touching the device.
    let replacement = match &args.action {
        ConfigAction::Set { file, .. } => {
            let text = std::fs::read_to_string(file)
                .map_err(|err| io_error(&format!("read {}", file.display()), err))?;
            let config: DriverConfig =
                serde_json::from_str(&text).map_err(|err| json_error("invalid config file", err))?;
            Some(config)
        }
        _ => None,
    };

    let client = open_session(&args.device).await?;
    let mut configs = client.watch_config();
    let current = first_config(&mut configs, timeout).await?;

    let shown = match (args.action, replacement) {
        (ConfigAction::Set { save, .. }, Some(config)) => {
            client
                .send_config(&config, save)
                .map_err(|err| session_error("send config", err))?;
            next_config(&mut configs, timeout).await?
        }
        (ConfigAction::Reload, _) => {
            client
                .reload_config()
                .map_err(|err| session_error("reload config", err))?;
            next_config(&mut configs, timeout).await?
        }
        _ => current,
    };

    print_config(&shown, format);
    finish(client).await?;
    Ok(SUCCESS)
}

/// The config the session requested on connect.
async fn first_config(configs: &mut ConfigWatch, timeout: Duration) -> CliResult<Arc<DriverConfig>> {
    loop {
        if let Some(config) = configs.borrow_and_update().clone() {
            return Ok(config);
        }
        changed(configs, timeout).await?;
    }
}

/// The next config frame the driver sends.
async fn next_config(configs: &mut ConfigWatch, timeout: Duration) -> CliResult<Arc<DriverConfig>> {
    loop {
        changed(configs, timeout).await?;
        if let Some(config) = configs.borrow_and_update().clone() {
            return Ok(config);
        }
    }
}

async fn changed(configs: &mut ConfigWatch, timeout: Duration) -> CliResult<()> {
    within(timeout, "waiting for config", configs.changed())
        .await?
        .map_err(|_| session_error("config", SessionError::Stopped))
}

use std::time::Duration;

use motordrive::sim::{serve, SimDevice};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::SimulateArgs;
use crate::exit::{io_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// Time given to open sockets to send their close frames on shutdown.
const CLOSE_GRACE: Duration = Duration::from_millis(100);

pub async fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = TcpListener::bind(&args.bind)
        .await
        .map_err(|err| io_error(&format!("bind {}", args.bind), err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| io_error("local address", err))?;

    let shape = args.shape.shape();
    let device = SimDevice::new(shape)
        .with_networks(args.networks)
        .into_shared();

    print_event("listening", &format!("ws://{addr}"), format);
    info!(
        %addr,
        motor_channels = shape.motor_channels,
        pressure_channels = shape.pressure_channels,
        "simulator listening"
    );

    let cancel = CancellationToken::new();
    tokio::select! {
        result = serve(listener, device, cancel.clone()) => {
            result.map_err(|err| transport_error("simulator failed", err))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            cancel.cancel();
            tokio::time::sleep(CLOSE_GRACE).await;
        }
    }

    Ok(SUCCESS)
}

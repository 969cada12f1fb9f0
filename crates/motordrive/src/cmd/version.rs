use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("motordrive {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "target: {}",
        option_env!("MOTORDRIVE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "protocol: {} motor / {} pressure channels by default, little-endian",
        motordrive_frame::DEFAULT_MOTOR_CHANNELS,
        motordrive_frame::DEFAULT_PRESSURE_CHANNELS
    );
    println!(
        "features: session={}, sim={}, cli=true",
        cfg!(feature = "session"),
        cfg!(feature = "sim")
    );

    Ok(SUCCESS)
}

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{expect_count, expect_len, put_opcode, ProtocolShape, SEEK_DISABLED};
use crate::error::Result;
use crate::math::{clamp, interpolate};
use crate::opcode::Opcode;
use crate::types::{ChannelCommand, DriverConfig};

/// `n` commands with zero power and no seek target.
pub fn zero_commands(n: usize) -> Vec<ChannelCommand> {
    vec![ChannelCommand::zero(); n]
}

/// Encode a command frame, opcode included.
///
/// Power is clamped to `[-1, 1]`. A seek fraction is clamped to `[0, 1]` and
/// mapped onto the channel's configured position range; disabled seeks go out
/// as `-1` without touching the config.
pub fn encode_commands(
    shape: &ProtocolShape,
    commands: &[ChannelCommand],
    config: &DriverConfig,
) -> Result<Bytes> {
    expect_count("commands", shape.motor_channels, commands.len())?;
    expect_count(
        "config motor channels",
        shape.motor_channels,
        config.motor_channels.len(),
    )?;

    let mut dst = BytesMut::new();
    put_opcode(&mut dst, Opcode::Command, shape.command_len());
    for (command, channel) in commands.iter().zip(&config.motor_channels) {
        let target = command
            .seek
            .filter(|fraction| *fraction != SEEK_DISABLED)
            .map(|fraction| {
                interpolate(
                    clamp(fraction, 0.0, 1.0),
                    channel.min_position,
                    channel.max_position,
                )
            });
        let seek = ChannelCommand::seek_to_wire(target);
        dst.put_f32_le(clamp(command.power, -1.0, 1.0));
        dst.put_f32_le(seek);
    }
    Ok(dst.freeze())
}

/// Decode a command payload (opcode already stripped). Device side.
///
/// The returned seeks are raw positions as sent on the wire, not fractions.
pub fn decode_commands(shape: &ProtocolShape, payload: &[u8]) -> Result<Vec<ChannelCommand>> {
    expect_len(Opcode::Command, payload, shape.command_len())?;
    let mut buf = payload;
    Ok((0..shape.motor_channels)
        .map(|_| {
            let power = buf.get_f32_le();
            let seek = ChannelCommand::seek_from_wire(buf.get_f32_le());
            ChannelCommand { power, seek }
        })
        .collect())
}

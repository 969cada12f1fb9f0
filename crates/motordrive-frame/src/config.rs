use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{expect_count, expect_len, put_opcode, ConfigLayout, ProtocolShape};
use crate::error::{FrameError, Result};
use crate::opcode::Opcode;
use crate::types::{ChannelConfig, ChannelLimits, DriverConfig, PressureConfig};

/// Decode a config payload (opcode already stripped).
pub fn decode_config(shape: &ProtocolShape, payload: &[u8]) -> Result<DriverConfig> {
    expect_len(Opcode::Config, payload, shape.config_len())?;
    let mut buf = payload;
    Ok(read_config(shape, &mut buf))
}

/// Encode a config frame, opcode included. Device side.
pub fn encode_config_frame(shape: &ProtocolShape, config: &DriverConfig) -> Result<Bytes> {
    check_config(shape, config)?;
    let mut dst = BytesMut::new();
    put_opcode(&mut dst, Opcode::Config, shape.config_len());
    write_config(shape, config, &mut dst);
    Ok(dst.freeze())
}

/// Encode a set-config frame: opcode, save flag, then the config block.
pub fn encode_set_config(shape: &ProtocolShape, config: &DriverConfig, save: bool) -> Result<Bytes> {
    check_config(shape, config)?;
    let mut dst = BytesMut::new();
    put_opcode(&mut dst, Opcode::SetConfig, shape.set_config_len());
    dst.put_u8(u8::from(save));
    write_config(shape, config, &mut dst);
    Ok(dst.freeze())
}

/// Decode a set-config payload into `(config, save)`. Device side.
pub fn decode_set_config(shape: &ProtocolShape, payload: &[u8]) -> Result<(DriverConfig, bool)> {
    expect_len(Opcode::SetConfig, payload, shape.set_config_len())?;
    let mut buf = payload;
    let save = buf.get_u8() != 0;
    Ok((read_config(shape, &mut buf), save))
}

fn check_config(shape: &ProtocolShape, config: &DriverConfig) -> Result<()> {
    expect_count(
        "config motor channels",
        shape.motor_channels,
        config.motor_channels.len(),
    )?;
    expect_count(
        "config pressure channels",
        shape.pressure_channels,
        config.pressure_channels.len(),
    )?;
    if shape.config_layout == ConfigLayout::Limits {
        if let Some(channel) = config.motor_channels.iter().position(|c| c.limits.is_none()) {
            return Err(FrameError::MissingLimits { channel });
        }
    }
    Ok(())
}

// Callers have already checked the length.
fn read_config(shape: &ProtocolShape, buf: &mut &[u8]) -> DriverConfig {
    let motor_channels = (0..shape.motor_channels)
        .map(|_| {
            let mut channel = ChannelConfig {
                min_position: buf.get_f32_le(),
                max_position: buf.get_f32_le(),
                reverse_output: buf.get_u8() != 0,
                reverse_input: buf.get_u8() != 0,
                p: buf.get_f32_le(),
                i_time: buf.get_f32_le(),
                d_time: buf.get_f32_le(),
                threshold: buf.get_f32_le(),
                overshoot_threshold: buf.get_f32_le(),
                limits: None,
            };
            if shape.config_layout == ConfigLayout::Limits {
                channel.limits = Some(ChannelLimits {
                    enabled: buf.get_u8() != 0,
                    min_power: buf.get_f32_le(),
                    max_current: buf.get_f32_le(),
                    max_avg_current: buf.get_f32_le(),
                });
            }
            channel
        })
        .collect();

    let pressure_channels = (0..shape.pressure_channels)
        .map(|_| PressureConfig {
            zero_offset: buf.get_f32_le(),
            coefficient: buf.get_f32_le(),
        })
        .collect();

    DriverConfig {
        motor_channels,
        pressure_channels,
    }
}

fn write_config(shape: &ProtocolShape, config: &DriverConfig, dst: &mut BytesMut) {
    for ch in &config.motor_channels {
        dst.put_f32_le(ch.min_position);
        dst.put_f32_le(ch.max_position);
        dst.put_u8(u8::from(ch.reverse_output));
        dst.put_u8(u8::from(ch.reverse_input));
        dst.put_f32_le(ch.p);
        dst.put_f32_le(ch.i_time);
        dst.put_f32_le(ch.d_time);
        dst.put_f32_le(ch.threshold);
        dst.put_f32_le(ch.overshoot_threshold);
        if shape.config_layout == ConfigLayout::Limits {
            let limits = ch.limits.unwrap_or_default();
            dst.put_u8(u8::from(limits.enabled));
            dst.put_f32_le(limits.min_power);
            dst.put_f32_le(limits.max_current);
            dst.put_f32_le(limits.max_avg_current);
        }
    }
    for ch in &config.pressure_channels {
        dst.put_f32_le(ch.zero_offset);
        dst.put_f32_le(ch.coefficient);
    }
}

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{expect_count, expect_len, put_opcode, ProtocolShape};
use crate::error::Result;
use crate::opcode::Opcode;
use crate::types::{ChannelTelemetry, PressureTelemetry, TelemetryFrame};

/// Decode a telemetry payload (opcode already stripped).
///
/// The payload must be exactly [`ProtocolShape::telemetry_len`] bytes.
pub fn decode_telemetry(shape: &ProtocolShape, payload: &[u8]) -> Result<TelemetryFrame> {
    expect_len(Opcode::Telemetry, payload, shape.telemetry_len())?;
    let mut buf = payload;

    let voltage = buf.get_f32_le();
    let current = buf.get_f32_le();
    let power = buf.get_f32_le();
    let fps = buf.get_f32_le();
    let max_loop_time = buf.get_f32_le();
    let driver_time = buf.get_u32_le();

    let motor_channels = (0..shape.motor_channels)
        .map(|_| ChannelTelemetry {
            position: buf.get_f32_le(),
            current: buf.get_f32_le(),
            power: buf.get_f32_le(),
            seek: buf.get_f32_le(),
        })
        .collect();

    let pressure_channels = (0..shape.pressure_channels)
        .map(|_| PressureTelemetry {
            strain: buf.get_f32_le(),
        })
        .collect();

    Ok(TelemetryFrame {
        voltage,
        current,
        power,
        fps,
        max_loop_time,
        driver_time,
        motor_channels,
        pressure_channels,
    })
}

/// Encode a full telemetry frame, opcode included. Device side.
pub fn encode_telemetry(shape: &ProtocolShape, frame: &TelemetryFrame) -> Result<Bytes> {
    expect_count(
        "telemetry motor channels",
        shape.motor_channels,
        frame.motor_channels.len(),
    )?;
    expect_count(
        "telemetry pressure channels",
        shape.pressure_channels,
        frame.pressure_channels.len(),
    )?;

    let mut dst = BytesMut::new();
    put_opcode(&mut dst, Opcode::Telemetry, shape.telemetry_len());
    dst.put_f32_le(frame.voltage);
    dst.put_f32_le(frame.current);
    dst.put_f32_le(frame.power);
    dst.put_f32_le(frame.fps);
    dst.put_f32_le(frame.max_loop_time);
    dst.put_u32_le(frame.driver_time);
    for ch in &frame.motor_channels {
        dst.put_f32_le(ch.position);
        dst.put_f32_le(ch.current);
        dst.put_f32_le(ch.power);
        dst.put_f32_le(ch.seek);
    }
    for ch in &frame.pressure_channels {
        dst.put_f32_le(ch.strain);
    }
    Ok(dst.freeze())
}

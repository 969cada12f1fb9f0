use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{put_opcode, MAX_FIELD_LEN};
use crate::error::{FrameError, Result};
use crate::opcode::Opcode;
use crate::types::{ConnectNetwork, NetworkInfo, NetworkTarget};

/// Decode a network list payload (opcode already stripped).
///
/// Reads exactly the declared number of entries and never past the end of
/// `payload`. Trailing bytes are ignored. SSIDs are decoded as lossy UTF-8.
pub fn decode_networks(payload: &[u8]) -> Result<Vec<NetworkInfo>> {
    let mut buf = payload;
    need(Opcode::Networks, buf, 1)?;
    let count = buf.get_u8() as usize;

    let mut networks = Vec::with_capacity(count);
    for _ in 0..count {
        need(Opcode::Networks, buf, 1)?;
        let len = buf.get_u8() as usize;
        need(Opcode::Networks, buf, len + 1)?;
        let ssid = String::from_utf8_lossy(&buf[..len]).into_owned();
        buf.advance(len);
        let rssi = buf.get_i8();
        networks.push(NetworkInfo { ssid, rssi });
    }
    Ok(networks)
}

/// Encode a network list frame, opcode included. Device side.
pub fn encode_networks(networks: &[NetworkInfo]) -> Result<Bytes> {
    if networks.len() > u8::MAX as usize {
        return Err(FrameError::FieldTooLong {
            field: "network count",
            len: networks.len(),
            max: u8::MAX as usize,
        });
    }
    let body: usize = networks.iter().map(|n| 2 + n.ssid.len()).sum();
    let mut dst = BytesMut::new();
    put_opcode(&mut dst, Opcode::Networks, 1 + body);
    dst.put_u8(networks.len() as u8);
    for network in networks {
        put_field(&mut dst, "ssid", network.ssid.as_bytes())?;
        dst.put_i8(network.rssi);
    }
    Ok(dst.freeze())
}

/// Encode a connect-to-network frame.
///
/// SSID and passphrase longer than 255 bytes are rejected, never truncated.
pub fn encode_connect_network(request: &ConnectNetwork) -> Result<Bytes> {
    check_field("ssid", &request.ssid)?;
    check_field("password", &request.password)?;

    let mut dst = BytesMut::new();
    put_opcode(
        &mut dst,
        Opcode::ConnectNetwork,
        3 + request.ssid.len() + request.password.len(),
    );
    dst.put_u8(request.target as u8);
    put_field(&mut dst, "ssid", request.ssid.as_bytes())?;
    put_field(&mut dst, "password", request.password.as_bytes())?;
    Ok(dst.freeze())
}

/// Decode a connect-to-network payload (opcode already stripped). Device side.
pub fn decode_connect_network(payload: &[u8]) -> Result<ConnectNetwork> {
    let mut buf = payload;
    need(Opcode::ConnectNetwork, buf, 1)?;
    let target = NetworkTarget::from_wire(buf.get_u8());
    let ssid = read_field(&mut buf)?;
    let password = read_field(&mut buf)?;
    Ok(ConnectNetwork {
        target,
        ssid,
        password,
    })
}

fn check_field(field: &'static str, value: &str) -> Result<()> {
    if value.len() > MAX_FIELD_LEN {
        return Err(FrameError::FieldTooLong {
            field,
            len: value.len(),
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

fn put_field(dst: &mut BytesMut, field: &'static str, value: &[u8]) -> Result<()> {
    let len = u8::try_from(value.len()).map_err(|_| FrameError::FieldTooLong {
        field,
        len: value.len(),
        max: MAX_FIELD_LEN,
    })?;
    dst.put_u8(len);
    dst.put_slice(value);
    Ok(())
}

fn read_field(buf: &mut &[u8]) -> Result<String> {
    need(Opcode::ConnectNetwork, buf, 1)?;
    let len = buf.get_u8() as usize;
    need(Opcode::ConnectNetwork, buf, len)?;
    let value = String::from_utf8_lossy(&buf[..len]).into_owned();
    buf.advance(len);
    Ok(value)
}

fn need(opcode: Opcode, buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(FrameError::Truncated {
            opcode,
            needed,
            remaining: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_list_layout() {
        let payload = [2, 3, b'a', b'b', b'c', 0xC4, 0, 0x81];
        let networks = decode_networks(&payload).unwrap();
        assert_eq!(
            networks,
            vec![
                NetworkInfo {
                    ssid: "abc".into(),
                    rssi: -60
                },
                NetworkInfo {
                    ssid: String::new(),
                    rssi: -127
                },
            ]
        );
    }

    #[test]
    fn empty_list() {
        assert_eq!(decode_networks(&[0]).unwrap(), vec![]);
        assert!(matches!(
            decode_networks(&[]),
            Err(FrameError::Truncated { needed: 1, remaining: 0, .. })
        ));
    }

    #[test]
    fn truncated_entry_stops_at_buffer_end() {
        // Declares 2 entries but the second SSID runs past the end.
        let payload = [2, 1, b'x', 0xF0, 10, b'y', b'z'];
        assert!(matches!(
            decode_networks(&payload),
            Err(FrameError::Truncated {
                opcode: Opcode::Networks,
                needed: 11,
                remaining: 2
            })
        ));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let payload = [1, 1, b'x', 0xF0, 0xAA, 0xBB];
        assert_eq!(decode_networks(&payload).unwrap().len(), 1);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let payload = [1, 2, 0xFF, b'a', 0xE0];
        let networks = decode_networks(&payload).unwrap();
        assert_eq!(networks[0].ssid, "\u{FFFD}a");
        assert_eq!(networks[0].rssi, -32);
    }

    #[test]
    fn encoded_list_decodes() {
        let networks = vec![
            NetworkInfo {
                ssid: "workshop".into(),
                rssi: -42,
            },
            NetworkInfo {
                ssid: "café".into(),
                rssi: -90,
            },
        ];
        let wire = encode_networks(&networks).unwrap();
        assert_eq!(wire[0], 0x05);
        assert_eq!(decode_networks(&wire[1..]).unwrap(), networks);
    }

    #[test]
    fn connect_network_layout() {
        let request = ConnectNetwork {
            target: NetworkTarget::Router,
            ssid: "lab".into(),
            password: "hunter2".into(),
        };
        let wire = encode_connect_network(&request).unwrap();
        let mut expected = vec![0x06, 1, 3];
        expected.extend_from_slice(b"lab");
        expected.push(7);
        expected.extend_from_slice(b"hunter2");
        assert_eq!(wire.as_ref(), expected.as_slice());

        assert_eq!(decode_connect_network(&wire[1..]).unwrap(), request);
    }

    #[test]
    fn access_point_flag_is_zero() {
        let request = ConnectNetwork {
            target: NetworkTarget::from_use_router(false),
            ssid: String::new(),
            password: String::new(),
        };
        let wire = encode_connect_network(&request).unwrap();
        assert_eq!(wire.as_ref(), &[0x06, 0, 0, 0]);
    }

    #[test]
    fn long_fields_are_rejected_not_truncated() {
        let request = ConnectNetwork {
            target: NetworkTarget::Router,
            ssid: "s".repeat(255),
            password: "p".repeat(256),
        };
        assert_eq!(
            encode_connect_network(&request),
            Err(FrameError::FieldTooLong {
                field: "password",
                len: 256,
                max: 255
            })
        );
    }
}

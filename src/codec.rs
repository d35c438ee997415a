// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::can::{require, Error};
use log::trace;
use serde::{Deserialize, Serialize};

/// Default identifiers carrying target frames.
pub const TARGET_IDS: [u32; 2] = [0x60A, 0x60B];

/// Default identifier carrying status frames.
///
/// Numerically equal to the outbound distance range command; the two are
/// told apart by direction only.
pub const STATUS_ID: u32 = 0x201;

const TARGET_LEN: usize = 7;
const STATUS_LEN: usize = 4;

/// Single detected object from one target frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Radar assigned target id
    pub target_id: u8,
    /// Longitudinal position in meters
    pub x: f64,
    /// Lateral position in meters
    pub y: f64,
    /// Height in meters, always 0 for this sensor
    pub z: f64,
}

/// Device health telemetry from one status frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarStatusRecord {
    /// Sensor temperature in °C
    pub temperature: i16,
    /// Supply voltage in V
    pub voltage: f64,
    /// Device error code, 0 when healthy
    pub error_code: u8,
    /// Active output type (4 bits)
    pub output_type: u8,
}

/// Frame purpose as determined by its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Carries one target detection
    Target,
    /// Carries device status
    Status,
    /// Observed but not decoded
    Unrecognized,
}

/// Identifier table used to classify inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIds {
    /// Identifiers aliasing to the target class
    pub target: [u32; 2],
    /// Identifier of the status class
    pub status: u32,
}

impl Default for FrameIds {
    fn default() -> Self {
        FrameIds {
            target: TARGET_IDS,
            status: STATUS_ID,
        }
    }
}

impl FrameIds {
    /// Classify an inbound identifier.
    pub fn classify(&self, id: u32) -> FrameClass {
        if self.target.contains(&id) {
            FrameClass::Target
        } else if id == self.status {
            FrameClass::Status
        } else {
            FrameClass::Unrecognized
        }
    }
}

/// Decode a target frame payload.
///
/// Range is a 13-bit value (`payload[1]` shifted by 5 over the top 5 bits of
/// `payload[2]`) at 0.2 m per LSB offset by -500 m. Bearing is the 16-bit
/// `payload[5..7]` at 0.1° per LSB offset by -180°. Range is not clamped.
pub fn decode_target(payload: &[u8]) -> Result<TargetRecord, Error> {
    require(payload, TARGET_LEN)?;

    let target_id = payload[0];
    let raw_range = ((payload[1] as u32) << 5) | (payload[2] & 0xF8) as u32;
    let distance = raw_range as f64 * 0.2 - 500.0;
    let raw_bearing = u16::from_be_bytes([payload[5], payload[6]]);
    let bearing = (raw_bearing as f64 * 0.1 - 180.0).to_radians();

    let target = TargetRecord {
        target_id,
        x: distance * bearing.cos(),
        y: distance * bearing.sin(),
        z: 0.0,
    };

    trace!("target {:02X?} => {:?}", payload, target);
    Ok(target)
}

/// Decode a status frame payload.
pub fn decode_status(payload: &[u8]) -> Result<RadarStatusRecord, Error> {
    require(payload, STATUS_LEN)?;

    let status = RadarStatusRecord {
        temperature: payload[0] as i16 - 40,
        voltage: payload[1] as f64 * 0.1,
        error_code: payload[2],
        output_type: payload[3] & 0x0F,
    };

    trace!("status {:02X?} => {:?}", payload, status);
    Ok(status)
}

/// Encode a configuration command body. The value code leads, the remaining
/// bytes are zero.
///
/// `parameter_code` is the low byte of the command identifier. It does not
/// appear in the body; the identifier itself goes on the bus frame.
pub fn encode_config(parameter_code: u8, value_code: u8) -> [u8; 8] {
    trace!("config {:#04X} value {}", parameter_code, value_code);
    [value_code, 0, 0, 0, 0, 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// Builds a target payload for a physical range and bearing. The range
    /// must land on a multiple of 1.6 m so the two range bytes do not overlap.
    fn target_payload(id: u8, distance: f64, bearing_deg: f64) -> [u8; 8] {
        let raw_range = ((distance + 500.0) / 0.2).round() as u32;
        assert_eq!(raw_range % 8, 0);
        let raw_bearing = ((bearing_deg + 180.0) / 0.1).round() as u16;
        let bearing = raw_bearing.to_be_bytes();
        [
            id,
            (raw_range >> 5) as u8,
            (raw_range & 0x18) as u8,
            0,
            0,
            bearing[0],
            bearing[1],
            0,
        ]
    }

    #[test]
    fn test_decode_target() {
        let target = decode_target(&[0x05, 0x64, 0x00, 0, 0, 0x0A, 0x00, 0]).unwrap();
        assert_eq!(target.target_id, 5);
        assert!((target.x - 33.87).abs() < 0.05, "x = {}", target.x);
        assert!((target.y - 135.84).abs() < 0.05, "y = {}", target.y);
        assert_eq!(target.z, 0.0);

        let distance = (target.x * target.x + target.y * target.y).sqrt();
        assert!(close(distance, 140.0));
        assert!(close(target.y.atan2(target.x).to_degrees(), 76.0));
    }

    #[test]
    fn test_decode_target_deterministic() {
        let msg = [0x11, 0x9C, 0xA8, 0xFF, 0xEE, 0x07, 0x08, 0x42];
        let first = decode_target(&msg).unwrap();
        for _ in 0..10 {
            assert_eq!(decode_target(&msg).unwrap(), first);
        }
    }

    #[test]
    fn test_decode_target_range_bits() {
        // Low three bits of payload[2] are not part of the range.
        let a = decode_target(&[1, 0x64, 0x08, 0, 0, 0x07, 0x08, 0]).unwrap();
        let b = decode_target(&[1, 0x64, 0x0F, 0, 0, 0x07, 0x08, 0]).unwrap();
        assert_eq!(a, b);

        // 0x64 << 5 | 0x08 = 3208 => 141.6 m at bearing 0
        assert!(close(a.x, 141.6));
        assert!(a.y.abs() < 1e-9);
    }

    #[test]
    fn test_decode_target_negative_range() {
        // Raw zero decodes to -500 m, left unclamped.
        let target = decode_target(&[9, 0, 0, 0, 0, 0x07, 0x08, 0]).unwrap();
        assert!(close(target.x, -500.0));
    }

    #[test]
    fn test_decode_target_round_trip() {
        for (distance, bearing) in [(12.0, 0.0), (28.0, -45.0), (60.0, 30.5), (4.0, 120.0)] {
            let msg = target_payload(3, distance, bearing);
            let target = decode_target(&msg).unwrap();
            let rad = f64::to_radians(bearing);
            assert!((target.x - distance * rad.cos()).abs() < 1e-6);
            assert!((target.y - distance * rad.sin()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_target_short() {
        assert!(matches!(
            decode_target(&[0x05, 0x64, 0x00, 0, 0, 0x0A]),
            Err(Error::ShortPayload { needed: 7, got: 6 })
        ));
        assert!(decode_target(&[]).is_err());
        assert!(decode_target(&[0x05, 0x64, 0x00, 0, 0, 0x0A, 0x00]).is_ok());
    }

    #[test]
    fn test_decode_status() {
        let status = decode_status(&[0x3C, 0x78, 0x02, 0x05, 0, 0, 0, 0]).unwrap();
        assert_eq!(status.temperature, 20);
        assert!(close(status.voltage, 12.0));
        assert_eq!(status.error_code, 2);
        assert_eq!(status.output_type, 5);

        let status = decode_status(&[0x00, 0xFF, 0xFF, 0xF7]).unwrap();
        assert_eq!(status.temperature, -40);
        assert!(close(status.voltage, 25.5));
        assert_eq!(status.error_code, 255);
        assert_eq!(status.output_type, 7);

        assert!(decode_status(&[0x3C, 0x78, 0x02]).is_err());
    }

    #[test]
    fn test_encode_config() {
        assert_eq!(encode_config(0x01, 2), [2, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encode_config(0x05, 255), [255, 0, 0, 0, 0, 0, 0, 0]);
        // The parameter never changes the body.
        for parameter_code in 0x00..=0x07 {
            assert_eq!(encode_config(parameter_code, 3), encode_config(0x00, 3));
        }
    }

    #[test]
    fn test_classify() {
        let ids = FrameIds::default();
        assert_eq!(ids.classify(0x60A), FrameClass::Target);
        assert_eq!(ids.classify(0x60B), FrameClass::Target);
        assert_eq!(ids.classify(0x201), FrameClass::Status);
        assert_eq!(ids.classify(0x60C), FrameClass::Unrecognized);

        let ids = FrameIds {
            target: [0x500, 0x501],
            status: 0x600,
        };
        assert_eq!(ids.classify(0x60A), FrameClass::Unrecognized);
        assert_eq!(ids.classify(0x600), FrameClass::Status);
    }
}

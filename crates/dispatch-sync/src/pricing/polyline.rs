//! Encoded polyline codec (precision 5), the geometry format routing providers return.

use crate::model::LatLng;
use thiserror::Error;

const PRECISION: f64 = 1e5;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolylineError {
    #[error("invalid polyline character {0:?} at byte {1}")]
    InvalidChar(char, usize),
    #[error("polyline ends in the middle of a value")]
    Truncated,
}

/// Decodes an encoded polyline into points.
pub fn decode(encoded: &str) -> Result<Vec<LatLng>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let (mut lat, mut lon) = (0i64, 0i64);
    let mut pos = 0;

    while pos < bytes.len() {
        lat += next_value(bytes, &mut pos)?;
        lon += next_value(bytes, &mut pos)?;
        points.push(LatLng::new(lat as f64 / PRECISION, lon as f64 / PRECISION));
    }

    Ok(points)
}

fn next_value(bytes: &[u8], pos: &mut usize) -> Result<i64, PolylineError> {
    let mut result = 0i64;
    let mut shift = 0;

    loop {
        let byte = *bytes.get(*pos).ok_or(PolylineError::Truncated)?;
        if !(63..127).contains(&byte) || shift > 60 {
            return Err(PolylineError::InvalidChar(byte as char, *pos));
        }
        *pos += 1;

        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 == 1 { !(result >> 1) } else { result >> 1 })
}

/// Encodes points as a polyline.
pub fn encode(points: &[LatLng]) -> String {
    let mut out = String::new();
    let (mut prev_lat, mut prev_lon) = (0i64, 0i64);

    for point in points {
        let lat = (point.lat * PRECISION).round() as i64;
        let lon = (point.lon * PRECISION).round() as i64;
        push_value(&mut out, lat - prev_lat);
        push_value(&mut out, lon - prev_lon);
        prev_lat = lat;
        prev_lon = lon;
    }

    out
}

fn push_value(out: &mut String, value: i64) {
    let mut v = if value < 0 { !(value << 1) } else { value << 1 };
    while v >= 0x20 {
        out.push((((v & 0x1f) | 0x20) as u8 + 63) as char);
        v >>= 5;
    }
    out.push((v as u8 + 63) as char);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_reference_polyline() {
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(
            points,
            vec![
                LatLng::new(38.5, -120.2),
                LatLng::new(40.7, -120.95),
                LatLng::new(43.252, -126.453),
            ]
        );
    }

    #[test]
    fn test_encode_matches_reference() {
        let points = [
            LatLng::new(38.5, -120.2),
            LatLng::new(40.7, -120.95),
            LatLng::new(43.252, -126.453),
        ];
        assert_eq!(encode(&points), "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        assert_eq!(decode("_p~iF~ps|"), Err(PolylineError::Truncated));
        assert!(matches!(decode("_p~iF ps|U"), Err(PolylineError::InvalidChar(' ', _))));
    }

    #[test]
    fn test_empty_string_has_no_points() {
        assert!(decode("").unwrap().is_empty());
    }
}

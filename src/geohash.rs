use geo::{Coord, Rect};

use crate::error::{MatchError, Result};

/// Default hash length used for node identity (cells of about 5 m at the equator)
pub const DEFAULT_PRECISION: usize = 9;

/// Longest hash we produce; 12 characters already resolve 60 bits
pub const MAX_PRECISION: usize = 12;

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub type GeoHash = String;

/// Encode a position (x = longitude, y = latitude) into a base32 geohash of
/// `precision` characters.
///
/// Bits alternate longitude/latitude starting with longitude. A value lying exactly
/// on an interval midpoint falls in the lower half.
pub fn encode(position: Coord<f64>, precision: usize) -> Result<GeoHash> {
    validate_precision(precision)?;
    validate_position(position)?;

    let mut hash = String::with_capacity(precision);
    let mut lon_range = (-180.0, 180.0);
    let mut lat_range = (-90.0, 90.0);
    let mut bits = 0u8;
    let mut bit = 0;
    let mut is_lon = true;

    while hash.len() < precision {
        let (value, range) = if is_lon {
            (position.x, &mut lon_range)
        } else {
            (position.y, &mut lat_range)
        };

        let mid = (range.0 + range.1) / 2.0;
        bits <<= 1;
        if value > mid {
            bits |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }

        is_lon = !is_lon;
        bit += 1;
        if bit == 5 {
            hash.push(BASE32[bits as usize] as char);
            bits = 0;
            bit = 0;
        }
    }

    Ok(hash)
}

/// Decode a geohash into the rectangle of its cell.
pub fn decode_bounds(hash: &str) -> Result<Rect<f64>> {
    if hash.is_empty() {
        return Err(MatchError::InvalidGeoHash(hash.to_string()));
    }

    let mut lon_range = (-180.0, 180.0);
    let mut lat_range = (-90.0, 90.0);
    let mut is_lon = true;

    for c in hash.bytes() {
        let idx = BASE32
            .iter()
            .position(|&b| b == c)
            .ok_or_else(|| MatchError::InvalidGeoHash(hash.to_string()))?;

        for i in (0..5).rev() {
            let range = if is_lon {
                &mut lon_range
            } else {
                &mut lat_range
            };
            let mid = (range.0 + range.1) / 2.0;
            if (idx >> i) & 1 == 1 {
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            is_lon = !is_lon;
        }
    }

    Ok(Rect::new(
        Coord {
            x: lon_range.0,
            y: lat_range.0,
        },
        Coord {
            x: lon_range.1,
            y: lat_range.1,
        },
    ))
}

/// Decode a geohash into the centroid of its cell.
pub fn decode(hash: &str) -> Result<Coord<f64>> {
    Ok(decode_bounds(hash)?.center())
}

/// Check that `hash` is a non-empty string over the geohash alphabet.
pub fn is_valid(hash: &str) -> bool {
    !hash.is_empty() && hash.bytes().all(|c| BASE32.contains(&c))
}

/// Last `n` characters of a hash, handy for compact diagnostics.
pub fn hash_suffix(hash: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    // Cut on a char boundary so any string is safe, not only geohashes
    match hash.char_indices().rev().nth(n - 1) {
        Some((start, _)) => &hash[start..],
        None => hash,
    }
}

pub(crate) fn validate_precision(precision: usize) -> Result<()> {
    if precision < 1 || precision > MAX_PRECISION {
        return Err(MatchError::InvalidPrecision(precision));
    }
    Ok(())
}

pub(crate) fn validate_position(position: Coord<f64>) -> Result<()> {
    if !position.x.is_finite()
        || !position.y.is_finite()
        || position.x.abs() > 180.0
        || position.y.abs() > 90.0
    {
        return Err(MatchError::CoordinateOutOfRange {
            lon: position.x,
            lat: position.y,
        });
    }
    Ok(())
}

use std::path::Path;

use serde_json::Value;

use crate::geocode::{Address, AddressResolver, ReverseGeocoder};
use crate::media::MediaKind;
use crate::metadata::exif::GPS_INFO;

const ISO6709_TAG: &str = "com.apple.quicktime.location.ISO6709";

// EXIF GPS tag numbers
const GPS_LATITUDE_REF: &str = "1";
const GPS_LATITUDE: &str = "2";
const GPS_LONGITUDE_REF: &str = "3";
const GPS_LONGITUDE: &str = "4";

/// Resolve a place name for a file from its raw metadata.
///
/// Missing or malformed coordinates yield `Ok(None)`; only a geocoder
/// outage is returned as an error.
pub fn resolve_location<G: ReverseGeocoder>(
    path: &Path,
    raw_metadata: &Value,
    kind: MediaKind,
    resolver: &mut AddressResolver<G>,
) -> crate::Result<Option<String>> {
    let coordinates = match kind {
        MediaKind::Image => image_coordinates(path, raw_metadata),
        MediaKind::Movie => movie_coordinates(path, raw_metadata),
        MediaKind::Unknown => None,
    };
    let Some((latitude, longitude)) = coordinates else {
        return Ok(None);
    };

    let Some(address) = resolver.address(latitude, longitude)? else {
        log::warn!(
            "{}: Geocoder has no address for {}, {}",
            path.display(),
            latitude,
            longitude
        );
        return Ok(None);
    };
    let location = address_to_location(&address);
    if location.is_none() {
        log::warn!(
            "{}: Could not determine location from address: {:?}",
            path.display(),
            address
        );
    }
    Ok(location)
}

pub(crate) fn image_coordinates(path: &Path, raw_metadata: &Value) -> Option<(f64, f64)> {
    let gps = raw_metadata.get(GPS_INFO)?;

    let latitude = gps.get(GPS_LATITUDE).and_then(dms_to_degrees);
    let longitude = gps.get(GPS_LONGITUDE).and_then(dms_to_degrees);
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        log::error!("{}: GPSInfo not as expected: \"{}\"", path.display(), gps);
        return None;
    };

    let sign = |reference: &str, negative: &str| {
        match gps.get(reference).and_then(Value::as_str) {
            Some(r) if r.trim().eq_ignore_ascii_case(negative) => -1.0,
            _ => 1.0,
        }
    };
    Some((
        latitude * sign(GPS_LATITUDE_REF, "S"),
        longitude * sign(GPS_LONGITUDE_REF, "W"),
    ))
}

/// `[degrees, minutes, seconds]` to decimal degrees.
fn dms_to_degrees(value: &Value) -> Option<f64> {
    let parts = value.as_array()?;
    let [degrees, minutes, seconds] = parts.as_slice() else {
        return None;
    };
    Some(degrees.as_f64()? + minutes.as_f64()? / 60.0 + seconds.as_f64()? / 3600.0)
}

fn movie_coordinates(path: &Path, raw_metadata: &Value) -> Option<(f64, f64)> {
    let tags = raw_metadata.get("format")?.get("tags")?;
    let location = tags
        .get("location")
        .or_else(|| tags.get(ISO6709_TAG))?
        .as_str()?;

    let parts = split_iso6709(location);
    let parsed = match parts.as_slice() {
        [latitude, longitude, ..] => latitude.parse::<f64>().ok().zip(longitude.parse::<f64>().ok()),
        _ => None,
    };
    if parsed.is_none() {
        log::error!(
            "Unexpected location format in metadata of {}: \"{}\"",
            path.display(),
            location
        );
    }
    parsed
}

/// Split an ISO-6709 string such as `+48.8566+002.3522/` into its signed
/// fields. A sign starts a new field unless it is the first character of
/// one; a trailing `/` is dropped.
pub fn split_iso6709(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut part = String::new();
    for c in value.chars() {
        if (c == '+' || c == '-') && !part.is_empty() {
            parts.push(std::mem::take(&mut part));
        }
        part.push(c);
    }
    if let Some(last) = part.strip_suffix('/') {
        part = last.to_string();
    }
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}

/// Reduce an address to one place name.
///
/// Precedence: village+suburb, town+suburb, suburb, village, town, state.
pub fn address_to_location(address: &Address) -> Option<String> {
    let get = |key: &str| address.get(key).map(String::as_str).filter(|v| !v.is_empty());

    match (get("suburb"), get("village"), get("town"), get("state")) {
        (Some(suburb), Some(village), _, _) => Some(format!("{}_{}", village, suburb)),
        (Some(suburb), None, Some(town), _) => Some(format!("{}_{}", town, suburb)),
        (Some(suburb), None, None, _) => Some(suburb.to_string()),
        (None, Some(village), _, _) => Some(village.to_string()),
        (None, None, Some(town), _) => Some(town.to_string()),
        (None, None, None, Some(state)) => Some(state.to_string()),
        (None, None, None, None) => None,
    }
}

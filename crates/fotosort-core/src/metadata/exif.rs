use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{Context, Field, In, Reader, Value as ExifValue};
use serde_json::{Map, Value};

/// Key under which GPS-context tags are collected, keyed by tag number.
pub const GPS_INFO: &str = "GPSInfo";

/// Read the EXIF block of an image into a JSON object.
///
/// Only tags with a known name are kept. A missing EXIF block or an
/// unreadable file yields an empty object.
pub fn read_exif(path: &Path) -> Value {
    match read_fields(path) {
        Ok(map) => Value::Object(map),
        Err(exif::Error::NotFound(_)) => {
            log::debug!("{}: no EXIF data", path.display());
            super::empty()
        }
        Err(e) => {
            log::error!("{}: {}", path.display(), e);
            super::empty()
        }
    }
}

fn read_fields(path: &Path) -> Result<Map<String, Value>, exif::Error> {
    let file = File::open(path)?;
    let exif = Reader::new().read_from_container(&mut BufReader::new(file))?;

    let mut map = Map::new();
    let mut gps = Map::new();
    for field in exif.fields() {
        if field.ifd_num != In::PRIMARY || field.tag.description().is_none() {
            continue;
        }
        if field.tag.context() == Context::Gps {
            gps.insert(field.tag.number().to_string(), field_value(field));
        } else {
            map.insert(field.tag.to_string(), field_value(field));
        }
    }
    if !gps.is_empty() {
        map.insert(GPS_INFO.to_string(), Value::Object(gps));
    }
    Ok(map)
}

/// Convert a field into JSON: strings stay strings, numeric values become
/// numbers (arrays when multi-valued).
fn field_value(field: &Field) -> Value {
    match &field.value {
        ExifValue::Ascii(parts) => parts
            .first()
            .map(|s| Value::String(String::from_utf8_lossy(s).trim_end_matches('\0').to_string()))
            .unwrap_or(Value::Null),
        ExifValue::Rational(v) => numbers(v.iter().map(|r| r.to_f64())),
        ExifValue::SRational(v) => numbers(v.iter().map(|r| r.to_f64())),
        ExifValue::Byte(v) => numbers(v.iter().map(|&n| f64::from(n))),
        ExifValue::Short(v) => numbers(v.iter().map(|&n| f64::from(n))),
        ExifValue::Long(v) => numbers(v.iter().map(|&n| f64::from(n))),
        ExifValue::SByte(v) => numbers(v.iter().map(|&n| f64::from(n))),
        ExifValue::SShort(v) => numbers(v.iter().map(|&n| f64::from(n))),
        ExifValue::SLong(v) => numbers(v.iter().map(|&n| f64::from(n))),
        ExifValue::Float(v) => numbers(v.iter().map(|&n| f64::from(n))),
        ExifValue::Double(v) => numbers(v.iter().copied()),
        _ => Value::String(field.display_value().to_string()),
    }
}

fn numbers(values: impl Iterator<Item = f64>) -> Value {
    let mut list: Vec<Value> = values.map(Value::from).collect();
    if list.len() == 1 {
        list.remove(0)
    } else {
        Value::Array(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use chrono::NaiveDate;
    use exif::experimental::Writer;
    use exif::{Rational, Tag};
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    fn field(tag: Tag, value: ExifValue) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    #[test]
    fn test_gps_triple_becomes_float_array() {
        let f = field(
            Tag::GPSLatitude,
            ExifValue::Rational(vec![
                Rational { num: 48, denom: 1 },
                Rational { num: 51, denom: 1 },
                Rational { num: 2376, denom: 100 },
            ]),
        );
        assert_eq!(field_value(&f), serde_json::json!([48.0, 51.0, 23.76]));
    }

    #[test]
    fn test_ascii_keeps_raw_datetime() {
        let f = field(
            Tag::DateTimeOriginal,
            ExifValue::Ascii(vec![b"2023:04:01 12:30:00".to_vec()]),
        );
        assert_eq!(field_value(&f), Value::String("2023:04:01 12:30:00".into()));
    }

    #[test]
    fn test_single_short_is_scalar() {
        let f = field(Tag::Orientation, ExifValue::Short(vec![6]));
        assert_eq!(field_value(&f), serde_json::json!(6.0));
    }

    #[test]
    fn test_jpeg_without_exif_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.jpg");
        // SOI followed directly by EOI
        File::create(&path)
            .unwrap()
            .write_all(&[0xFF, 0xD8, 0xFF, 0xD9])
            .unwrap();
        assert_eq!(read_exif(&path), serde_json::json!({}));
    }

    #[test]
    fn test_garbage_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        File::create(&path).unwrap().write_all(b"not an image").unwrap();
        assert_eq!(read_exif(&path), serde_json::json!({}));
    }

    fn rationals(parts: &[(u32, u32)]) -> ExifValue {
        ExifValue::Rational(
            parts
                .iter()
                .map(|&(num, denom)| Rational { num, denom })
                .collect(),
        )
    }

    /// A JPEG holding nothing but an APP1 segment with the given fields.
    fn jpeg_with_exif(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for f in fields {
            writer.push_field(f);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn test_read_exif_feeds_date_and_location() {
        let fields = [
            field(
                Tag::DateTimeOriginal,
                ExifValue::Ascii(vec![b"2021:08:15 17:45:02".to_vec()]),
            ),
            field(Tag::GPSLatitudeRef, ExifValue::Ascii(vec![b"N".to_vec()])),
            field(Tag::GPSLatitude, rationals(&[(48, 1), (51, 1), (2376, 100)])),
            field(Tag::GPSLongitudeRef, ExifValue::Ascii(vec![b"W".to_vec()])),
            field(Tag::GPSLongitude, rationals(&[(2, 1), (21, 1), (792, 100)])),
        ];
        let dir = tempdir().unwrap();
        let path = dir.path().join("DSC_0001.jpg");
        File::create(&path)
            .unwrap()
            .write_all(&jpeg_with_exif(&fields))
            .unwrap();

        let raw = read_exif(&path);
        assert_eq!(raw["DateTimeOriginal"], "2021:08:15 17:45:02");
        assert_eq!(
            raw[GPS_INFO],
            serde_json::json!({
                "1": "N",
                "2": [48.0, 51.0, 23.76],
                "3": "W",
                "4": [2.0, 21.0, 7.92],
            })
        );

        let date = crate::date::resolve_date(&path, "DSC_0001", &raw, MediaKind::Image);
        let expected = NaiveDate::from_ymd_opt(2021, 8, 15).and_then(|d| d.and_hms_opt(17, 45, 2));
        assert_eq!(date, expected);

        let (latitude, longitude) = crate::location::image_coordinates(&path, &raw).unwrap();
        assert!((latitude - 48.8566).abs() < 1e-9);
        assert!((longitude + 2.3522).abs() < 1e-9);
    }
}

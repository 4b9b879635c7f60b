pub mod guess;

use std::path::Path;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::media::MediaKind;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Tried in order against a movie's `creation_time` tag.
const CREATION_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];

/// Resolve the capture date of a file.
///
/// A date in the file name is trusted over embedded metadata. `None` means
/// the date is unknown.
pub fn resolve_date(
    path: &Path,
    stem: &str,
    raw_metadata: &Value,
    kind: MediaKind,
) -> Option<NaiveDateTime> {
    if let Some(date) = guess::guess_date_from_stem(stem) {
        return Some(date);
    }

    match kind {
        MediaKind::Image => exif_date(path, raw_metadata),
        MediaKind::Movie => creation_time(path, raw_metadata),
        MediaKind::Unknown => None,
    }
}

fn exif_date(path: &Path, raw_metadata: &Value) -> Option<NaiveDateTime> {
    let original = raw_metadata.get("DateTimeOriginal")?.as_str()?;
    match NaiveDateTime::parse_from_str(original.trim(), EXIF_DATETIME_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            log::error!(
                "Unknown datetime in exif data of {}: \"{}\"",
                path.display(),
                original
            );
            None
        }
    }
}

fn creation_time(path: &Path, raw_metadata: &Value) -> Option<NaiveDateTime> {
    let created = raw_metadata
        .get("format")?
        .get("tags")?
        .get("creation_time")?
        .as_str()?;

    let parsed = CREATION_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(created, format).ok());
    if parsed.is_none() {
        log::error!(
            "Unknown date format in metadata of {}: \"{}\"",
            path.display(),
            created
        );
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    fn resolve(stem: &str, raw: &Value, kind: MediaKind) -> Option<NaiveDateTime> {
        resolve_date(Path::new("test"), stem, raw, kind)
    }

    #[test]
    fn test_filename_wins_over_exif() {
        let raw = json!({ "DateTimeOriginal": "2099:01:01 00:00:00" });
        assert_eq!(
            resolve("IMG_20230401_1234", &raw, MediaKind::Image),
            Some(at(2023, 4, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_exif_date_used_without_filename_date() {
        let raw = json!({ "DateTimeOriginal": "2021:08:15 17:45:02" });
        assert_eq!(
            resolve("DSC_0042", &raw, MediaKind::Image),
            Some(at(2021, 8, 15, 17, 45, 2))
        );
    }

    #[test]
    fn test_rejected_filename_year_falls_back_to_exif() {
        let raw = json!({ "DateTimeOriginal": "2021:08:15 17:45:02" });
        assert_eq!(
            resolve("IMG_19850101_0001", &raw, MediaKind::Image),
            Some(at(2021, 8, 15, 17, 45, 2))
        );
    }

    #[test]
    fn test_malformed_exif_date_is_unknown() {
        let raw = json!({ "DateTimeOriginal": "2021-08-15T17:45:02" });
        assert_eq!(resolve("DSC_0042", &raw, MediaKind::Image), None);
        assert_eq!(resolve("DSC_0042", &json!({}), MediaKind::Image), None);
    }

    #[test]
    fn test_movie_creation_time_formats() {
        let with = |t: &str| json!({ "format": { "tags": { "creation_time": t } } });

        assert_eq!(
            resolve("clip", &with("2020-02-29T10:11:12.000000"), MediaKind::Movie),
            Some(at(2020, 2, 29, 10, 11, 12))
        );
        assert_eq!(
            resolve("clip", &with("2020-02-29 10:11:12"), MediaKind::Movie),
            Some(at(2020, 2, 29, 10, 11, 12))
        );
        assert_eq!(
            resolve("clip", &with("2020-02-29T10:11:12.000000Z"), MediaKind::Movie),
            Some(at(2020, 2, 29, 10, 11, 12))
        );
        assert_eq!(resolve("clip", &with("29/02/2020"), MediaKind::Movie), None);
    }

    #[test]
    fn test_movie_without_tags_is_unknown() {
        assert_eq!(resolve("clip", &json!({ "format": {} }), MediaKind::Movie), None);
        assert_eq!(resolve("clip", &json!({}), MediaKind::Movie), None);
    }

    #[test]
    fn test_image_metadata_ignored_for_movies() {
        let raw = json!({ "DateTimeOriginal": "2021:08:15 17:45:02" });
        assert_eq!(resolve("clip", &raw, MediaKind::Movie), None);
    }
}

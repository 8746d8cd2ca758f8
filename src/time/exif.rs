//! EXIF capture dates for images

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::trace;

/// Date tags in priority order
const DATE_TAGS: &[Tag] = &[Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Read the capture date stored in an image's EXIF block
pub fn extract_exif_time(path: &Path) -> Result<NaiveDateTime> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| Error::ExifRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    DATE_TAGS
        .iter()
        .find_map(|tag| {
            let field = exif.get_field(*tag, In::PRIMARY)?;
            let text = match &field.value {
                Value::Ascii(parts) => parts
                    .first()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())?,
                _ => field.display_value().to_string(),
            };
            let dt = parse_exif_datetime(&text)?;
            trace!(?path, ?tag, "Found EXIF date");
            Some(dt)
        })
        .ok_or_else(|| Error::ExifRead {
            path: path.to_path_buf(),
            message: "No valid date tag found in EXIF data".to_string(),
        })
}

/// Parse "YYYY:MM:DD HH:MM:SS" and the common variants cameras write instead
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim().trim_matches('"').trim_end_matches('\0');
    [
        "%Y:%m:%d %H:%M:%S",
        "%Y:%m:%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_exif_datetime() {
        let dt = parse_exif_datetime("2024:01:15 14:30:00").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 15));
        assert_eq!((dt.hour(), dt.minute()), (14, 30));

        assert!(parse_exif_datetime("\"2024:01:15 14:30:00\"").is_some());
        assert!(parse_exif_datetime("2024-01-15T14:30:00").is_some());
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("invalid").is_none());
    }

    #[test]
    fn test_file_without_exif_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not an image").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            extract_exif_time(file.path()),
            Err(Error::ExifRead { .. })
        ));
    }
}

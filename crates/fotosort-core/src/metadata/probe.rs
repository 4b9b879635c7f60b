use std::path::Path;
use std::process::Command;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
enum ProbeError {
    #[error("could not run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ffprobe exited with {status}: {stderr}")]
    Status { status: String, stderr: String },
    #[error("unexpected ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Probe a movie container with `ffprobe` and return its JSON report.
///
/// Failures are logged and yield an empty object.
pub fn probe(ffprobe: &Path, path: &Path) -> Value {
    match run_probe(ffprobe, path) {
        Ok(value) => value,
        Err(e) => {
            log::error!("{}: Reading metadata failed: {}", path.display(), e);
            super::empty()
        }
    }
}

fn run_probe(ffprobe: &Path, path: &Path) -> Result<Value, ProbeError> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()?;

    if !output.status.success() {
        return Err(ProbeError::Status {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let value: Value = serde_json::from_slice(&output.stdout)?;
    if value.is_object() {
        Ok(value)
    } else {
        Ok(super::empty())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use chrono::NaiveDate;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_probe_output_handling() {
        let dir = tempdir().unwrap();
        let report = script(
            dir.path(),
            "report",
            r#"echo '{"format":{"tags":{"creation_time":"2020-01-01T10:00:00.000000Z"}}}'"#,
        );
        let failing = script(dir.path(), "failing", "echo 'Invalid data' >&2\nexit 1");
        let chatty = script(dir.path(), "chatty", "echo 'not json'");
        let clip = Path::new("clip.mp4");

        let raw = probe(&report, clip);
        assert_eq!(raw["format"]["tags"]["creation_time"], "2020-01-01T10:00:00.000000Z");
        let date = crate::date::resolve_date(clip, "clip", &raw, MediaKind::Movie);
        let expected = NaiveDate::from_ymd_opt(2020, 1, 1).and_then(|d| d.and_hms_opt(10, 0, 0));
        assert_eq!(date, expected);

        assert_eq!(probe(&failing, clip), super::super::empty());
        assert_eq!(probe(&chatty, clip), super::super::empty());
        assert!(matches!(
            run_probe(&failing, clip),
            Err(ProbeError::Status { stderr, .. }) if stderr == "Invalid data"
        ));
    }
}

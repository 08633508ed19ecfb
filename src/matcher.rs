use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;

use crate::data::model::TrainingPair;
use crate::error::{Error, Result};
use crate::settings::TIMESTAMP_PLACEHOLDER;

// ---------------------------------------------------------------------------
// Template → pattern
// ---------------------------------------------------------------------------

/// Compile a file name template into a regex that captures the timestamp.
///
/// The template must contain `TIMESTAMP` exactly once. The rest of the
/// template is matched literally and the pattern spans the whole name.
pub fn template_pattern(template: &str, timestamp_length: usize) -> Result<Regex> {
    if timestamp_length == 0 {
        return Err(Error::Configuration("timestamp_length must be at least 1".into()));
    }
    let parts: Vec<&str> = template.split(TIMESTAMP_PLACEHOLDER).collect();
    if parts.len() != 2 {
        return Err(Error::Configuration(format!(
            "file name template '{template}' must contain '{TIMESTAMP_PLACEHOLDER}' exactly once"
        )));
    }
    let pattern = format!(
        "^{}(.{{{timestamp_length}}}){}$",
        regex::escape(parts[0]),
        regex::escape(parts[1])
    );
    Regex::new(&pattern)
        .map_err(|e| Error::Configuration(format!("bad template '{template}': {e}")))
}

fn key_of(pattern: &Regex, name: &str) -> Option<String> {
    pattern
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ---------------------------------------------------------------------------
// Folder scan
// ---------------------------------------------------------------------------

/// Pair satellite and label files in `folder` by their timestamp.
///
/// Each name is tried against the satellite template first; a name matching
/// both templates counts as a satellite file. Timestamps found on one side
/// only produce no pair. Pairs come out ordered by timestamp.
pub fn match_files(
    folder: &Path,
    sat_template: &str,
    label_template: &str,
    timestamp_length: usize,
) -> Result<Vec<TrainingPair>> {
    let sat_pattern = template_pattern(sat_template, timestamp_length)?;
    let label_pattern = template_pattern(label_template, timestamp_length)?;

    let mut names: Vec<String> = fs::read_dir(folder)
        .map_err(|e| Error::io(folder, e))?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()
        .map_err(|e| Error::io(folder, e))?;
    names.sort();

    let mut sat_files = BTreeMap::new();
    let mut label_files = BTreeMap::new();
    for name in names {
        if let Some(key) = key_of(&sat_pattern, &name) {
            sat_files.insert(key, folder.join(&name));
        } else if let Some(key) = key_of(&label_pattern, &name) {
            label_files.insert(key, folder.join(&name));
        }
    }

    let mut pairs = Vec::new();
    for (key, sat) in sat_files {
        match label_files.remove(&key) {
            Some(labels) => pairs.push(TrainingPair::new(sat, labels)),
            None => log::debug!("No label file for timestamp {key}"),
        }
    }
    for key in label_files.keys() {
        log::debug!("No satellite file for timestamp {key}");
    }

    log::info!("Matched {} file pairs in {}", pairs.len(), folder.display());
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"").unwrap();
        }
    }

    #[test]
    fn test_unmatched_timestamps_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &["sat_20200101.nc", "lab_20200101.nc", "sat_99999999.nc", "lab_11111111.nc"],
        );

        let pairs = match_files(dir.path(), "sat_TIMESTAMP.nc", "lab_TIMESTAMP.nc", 8).unwrap();
        assert_eq!(
            pairs,
            vec![TrainingPair::new(
                dir.path().join("sat_20200101.nc"),
                dir.path().join("lab_20200101.nc")
            )]
        );
    }

    #[test]
    fn test_pairs_ordered_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &["lab_0002.nc", "sat_0002.nc", "sat_0001.nc", "lab_0001.nc", "notes.txt"],
        );
        let pairs = match_files(dir.path(), "sat_TIMESTAMP.nc", "lab_TIMESTAMP.nc", 4).unwrap();
        let sats: Vec<_> = pairs.iter().map(|p| p.satellite.file_name().unwrap()).collect();
        assert_eq!(sats, vec!["sat_0001.nc", "sat_0002.nc"]);
    }

    #[test]
    fn test_name_matching_both_counts_as_satellite() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["a_12_1.nc", "12_1_1.nc"]);
        // "a_12_1.nc" fits both templates (keys "12_1" and "a_12")
        let pairs = match_files(dir.path(), "a_TIMESTAMP.nc", "TIMESTAMP_1.nc", 4).unwrap();
        assert_eq!(
            pairs,
            vec![TrainingPair::new(
                dir.path().join("a_12_1.nc"),
                dir.path().join("12_1_1.nc")
            )]
        );
    }

    #[test]
    fn test_timestamp_width_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["sat_202001011200.nc", "lab_202001011200.nc"]);
        let pairs = match_files(dir.path(), "sat_TIMESTAMP.nc", "lab_TIMESTAMP.nc", 8).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_template_literals_are_escaped() {
        let pattern = template_pattern("sat_TIMESTAMP.nc", 4).unwrap();
        assert!(pattern.is_match("sat_2020.nc"));
        assert!(!pattern.is_match("sat_2020xnc"));
    }

    #[test]
    fn test_template_without_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let err = match_files(dir.path(), "sat.nc", "lab_TIMESTAMP.nc", 8).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = template_pattern("TIMESTAMP_TIMESTAMP", 8).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_missing_folder() {
        let err = match_files(Path::new("/no/such/folder"), "s_TIMESTAMP", "l_TIMESTAMP", 2)
            .unwrap_err();
        assert!(matches!(err, Error::DataAccess(_)));
    }
}

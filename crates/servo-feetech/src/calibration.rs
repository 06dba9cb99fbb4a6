//! Per-motor calibration records and their on-disk form.
//!
//! A calibration is produced once by the interactive procedure and read back
//! on every later construction. The file is a JSON object keyed by motor
//! name and must round-trip exactly.

use crate::{Result, ServoError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Calibration for a single motor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCalibration {
    pub id: u8,
    pub drive_mode: u8,
    /// Encoder reading recorded at the physical mid-position, written to the
    /// servo so later reads are centered on it.
    pub homing_offset: i32,
    pub range_min: i32,
    pub range_max: i32,
}

/// Calibration for every motor on a bus, keyed by motor name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationSet(pub BTreeMap<String, MotorCalibration>);

impl CalibrationSet {
    pub fn get(&self, motor: &str) -> Option<&MotorCalibration> {
        self.0.get(motor)
    }

    pub fn insert(&mut self, motor: impl Into<String>, calibration: MotorCalibration) {
        self.0.insert(motor.into(), calibration);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Directory of calibration files, one JSON file per logical device name.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    dir: PathBuf,
}

impl CalibrationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    pub fn load(&self, name: &str) -> Result<CalibrationSet> {
        let path = self.path_for(name);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ServoError::Calibration(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ServoError::Calibration(format!("{}: {e}", path.display())))
    }

    /// Write `set` for `name`, overwriting any previous file.
    pub fn save(&self, name: &str, set: &CalibrationSet) -> Result<()> {
        if let Some(parent) = self.path_for(name).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ServoError::Calibration(format!("{}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(set)
            .map_err(|e| ServoError::Calibration(e.to_string()))?;
        let path = self.path_for(name);
        std::fs::write(&path, json)
            .map_err(|e| ServoError::Calibration(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "calibration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> CalibrationSet {
        let mut set = CalibrationSet::default();
        set.insert(
            "shoulder_pan",
            MotorCalibration {
                id: 1,
                drive_mode: 0,
                homing_offset: -312,
                range_min: 741,
                range_max: 3292,
            },
        );
        set.insert(
            "gripper",
            MotorCalibration {
                id: 6,
                drive_mode: 0,
                homing_offset: 87,
                range_min: 2010,
                range_max: 3508,
            },
        );
        set
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path());
        let set = sample_set();
        store.save("so101_leader.json", &set).unwrap();
        let loaded = store.load("so101_leader.json").unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn test_save_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path());
        store.save("leader.json", &sample_set()).unwrap();

        let mut updated = sample_set();
        updated.insert(
            "shoulder_pan",
            MotorCalibration {
                id: 1,
                drive_mode: 0,
                homing_offset: 5,
                range_min: 100,
                range_max: 4000,
            },
        );
        store.save("leader.json", &updated).unwrap();
        let loaded = store.load("leader.json").unwrap();
        assert_eq!(loaded.get("shoulder_pan").unwrap().homing_offset, 5);
    }

    #[test]
    fn test_missing_file_is_reported_not_invented() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path());
        assert!(!store.exists("nope.json"));
        assert!(store.load("nope.json").is_err());
    }
}

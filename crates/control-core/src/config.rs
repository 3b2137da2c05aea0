//! Configuration Store
//!
//! Reads and writes the on-disk JSON configuration document (spec §4.9,
//! §6). Unlike the teacher's INI-based `PrinterConfig::load`, which fails
//! the whole process on a missing field, numeric validation here is
//! permissive-then-fallback: an out-of-range or malformed field falls back
//! to the last-known-good in-memory value, then to the compiled default
//! (spec §3, §7). Unknown keys round-trip unchanged.

use crate::constants::*;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, warn};

/// The classifier's observed machine state, persisted so external
/// observers can read it without subscribing to the event stream (spec
/// §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStateLabel {
    Off,
    Heating,
    Ready,
    Unknown,
}

impl Default for MachineStateLabel {
    fn default() -> Self {
        MachineStateLabel::Unknown
    }
}

/// The recognized, validated configuration fields (spec §3 table).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub target_temperature: f64,
    pub espresso_temperature: f64,
    pub steam_temperature: f64,
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
    pub recovery_proportional: f64,
    pub recovery_integral: f64,
    pub recovery_derivative: f64,
    pub machine_state: MachineStateLabel,
    pub machine_state_updated: Option<String>,
    /// Any key not recognized above, preserved verbatim on write-back.
    pub unknown: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_temperature: 100.0,
            espresso_temperature: 100.0,
            steam_temperature: 140.0,
            proportional: 4.0,
            integral: 0.1,
            derivative: 5.0,
            recovery_proportional: 6.0,
            recovery_integral: 0.2,
            recovery_derivative: 8.0,
            machine_state: MachineStateLabel::Unknown,
            machine_state_updated: None,
            unknown: Map::new(),
        }
    }
}

struct FieldSpec {
    key: &'static str,
    min: f64,
    max: f64,
}

const NUMERIC_FIELDS: &[FieldSpec] = &[
    FieldSpec { key: "target_temperature", min: TARGET_TEMP_MIN, max: TARGET_TEMP_MAX },
    FieldSpec { key: "espresso_temperature", min: PER_MODE_TEMP_MIN, max: PER_MODE_TEMP_MAX },
    FieldSpec { key: "steam_temperature", min: PER_MODE_TEMP_MIN, max: PER_MODE_TEMP_MAX },
    FieldSpec { key: "proportional", min: 0.0, max: KP_MAX },
    FieldSpec { key: "integral", min: 0.0, max: KI_MAX },
    FieldSpec { key: "derivative", min: 0.0, max: KD_MAX },
    FieldSpec { key: "recovery_proportional", min: 0.0, max: KP_MAX },
    FieldSpec { key: "recovery_integral", min: 0.0, max: KI_MAX },
    FieldSpec { key: "recovery_derivative", min: 0.0, max: KD_MAX },
];

fn get_field(value: &Value, spec: &FieldSpec, lkg: f64) -> f64 {
    let parsed = value.get(spec.key).and_then(Value::as_f64);
    match parsed {
        Some(n) if n >= spec.min && n <= spec.max => n,
        Some(n) => {
            warn!(field = spec.key, value = n, "config field out of range, using last-known-good");
            lkg
        }
        None => {
            warn!(field = spec.key, "config field missing or not numeric, using last-known-good");
            lkg
        }
    }
}

/// Parses a raw JSON document into a validated `Config`, falling back field
/// by field to `lkg` (which is already default-seeded on first load).
fn parse_config(raw: &Value, lkg: &Config) -> Config {
    let mut unknown = Map::new();
    if let Value::Object(map) = raw {
        let known: std::collections::HashSet<&str> = NUMERIC_FIELDS
            .iter()
            .map(|f| f.key)
            .chain(["machine_state", "machine_state_updated"])
            .collect();
        for (k, v) in map {
            if !known.contains(k.as_str()) {
                unknown.insert(k.clone(), v.clone());
            }
        }
    }

    let lkg_values = [
        lkg.target_temperature,
        lkg.espresso_temperature,
        lkg.steam_temperature,
        lkg.proportional,
        lkg.integral,
        lkg.derivative,
        lkg.recovery_proportional,
        lkg.recovery_integral,
        lkg.recovery_derivative,
    ];
    let mut fields = [0.0_f64; NUMERIC_FIELDS.len()];
    for (i, spec) in NUMERIC_FIELDS.iter().enumerate() {
        fields[i] = get_field(raw, spec, lkg_values[i]);
    }

    let machine_state = raw
        .get("machine_state")
        .and_then(Value::as_str)
        .and_then(|s| match s {
            "off" => Some(MachineStateLabel::Off),
            "heating" => Some(MachineStateLabel::Heating),
            "ready" => Some(MachineStateLabel::Ready),
            "unknown" => Some(MachineStateLabel::Unknown),
            _ => None,
        })
        .unwrap_or(lkg.machine_state);

    let machine_state_updated = raw
        .get("machine_state_updated")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| lkg.machine_state_updated.clone());

    Config {
        target_temperature: fields[0],
        espresso_temperature: fields[1],
        steam_temperature: fields[2],
        proportional: fields[3],
        integral: fields[4],
        derivative: fields[5],
        recovery_proportional: fields[6],
        recovery_integral: fields[7],
        recovery_derivative: fields[8],
        machine_state,
        machine_state_updated,
        unknown,
    }
}

impl Config {
    fn to_json(&self) -> Value {
        let mut map = self.unknown.clone();
        map.insert("target_temperature".into(), self.target_temperature.into());
        map.insert("espresso_temperature".into(), self.espresso_temperature.into());
        map.insert("steam_temperature".into(), self.steam_temperature.into());
        map.insert("proportional".into(), self.proportional.into());
        map.insert("integral".into(), self.integral.into());
        map.insert("derivative".into(), self.derivative.into());
        map.insert("recovery_proportional".into(), self.recovery_proportional.into());
        map.insert("recovery_integral".into(), self.recovery_integral.into());
        map.insert("recovery_derivative".into(), self.recovery_derivative.into());
        let state_str = match self.machine_state {
            MachineStateLabel::Off => "off",
            MachineStateLabel::Heating => "heating",
            MachineStateLabel::Ready => "ready",
            MachineStateLabel::Unknown => "unknown",
        };
        map.insert("machine_state".into(), state_str.into());
        if let Some(updated) = &self.machine_state_updated {
            map.insert("machine_state_updated".into(), updated.clone().into());
        }
        Value::Object(map)
    }
}

/// Owns the config file path and the last-known-good in-memory snapshot.
/// Safe for concurrent access from multiple Command Interface threads and
/// the Control Loop's reload timer (spec §5).
pub struct ConfigStore {
    path: PathBuf,
    last_known_good: parking_lot::Mutex<Config>,
    last_mtime: parking_lot::Mutex<Option<SystemTime>>,
}

impl ConfigStore {
    /// Loads the configuration file at `path`, creating it with compiled
    /// defaults if it doesn't exist yet (spec §3 "created once on first
    /// install").
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let store = Self {
            path: path.clone(),
            last_known_good: parking_lot::Mutex::new(Config::default()),
            last_mtime: parking_lot::Mutex::new(None),
        };

        if !path.exists() {
            store.write(Config::default())?;
        } else {
            store.reload()?;
        }
        Ok(store)
    }

    /// Re-reads the file if its modification time changed since the last
    /// reload; otherwise a no-op (spec §4.9).
    pub fn reload(&self) -> Result<Config, ConfigError> {
        let metadata = fs::metadata(&self.path).map_err(ConfigError::Io)?;
        let mtime = metadata.modified().map_err(ConfigError::Io)?;

        {
            let last = self.last_mtime.lock();
            if *last == Some(mtime) {
                return Ok(self.last_known_good.lock().clone());
            }
        }

        let raw_text = fs::read_to_string(&self.path).map_err(ConfigError::Io)?;
        let raw: Value = match serde_json::from_str(&raw_text) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "configuration file corrupt, keeping last-known-good");
                return Ok(self.last_known_good.lock().clone());
            }
        };

        let lkg = self.last_known_good.lock().clone();
        let parsed = parse_config(&raw, &lkg);
        *self.last_known_good.lock() = parsed.clone();
        *self.last_mtime.lock() = Some(mtime);
        Ok(parsed)
    }

    /// Returns the last successfully validated configuration without
    /// touching disk.
    pub fn current(&self) -> Config {
        self.last_known_good.lock().clone()
    }

    /// Writes `config` as a whole-file replacement via temp-file-then-rename
    /// (spec §4.9). On `PermissionDenied`, attempts one permission repair
    /// and retries.
    pub fn write(&self, config: Config) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(&config.to_json()).map_err(ConfigError::Serialization)?;

        match self.write_atomic(&json) {
            Ok(()) => {}
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!("permission denied writing config, attempting repair");
                self.attempt_permission_repair();
                self.write_atomic(&json).map_err(|_| ConfigError::PermissionDenied(e))?;
            }
            Err(e) => return Err(e),
        }

        *self.last_known_good.lock() = config;
        if let Ok(metadata) = fs::metadata(&self.path) {
            if let Ok(mtime) = metadata.modified() {
                *self.last_mtime.lock() = Some(mtime);
            }
        }
        Ok(())
    }

    fn write_atomic(&self, json: &str) -> Result<(), ConfigError> {
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).map_err(ConfigError::Io)?;
        file.write_all(json.as_bytes()).map_err(ConfigError::Io)?;
        file.sync_all().map_err(ConfigError::Io)?;
        fs::rename(&tmp_path, &self.path).map_err(ConfigError::Io)?;
        Ok(())
    }

    #[cfg(unix)]
    fn attempt_permission_repair(&self) {
        use std::os::unix::fs::PermissionsExt;
        if let Some(parent) = self.path.parent() {
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o755));
        }
        let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o644));
    }

    #[cfg(not(unix))]
    fn attempt_permission_repair(&self) {}

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Minimal scratch-file helper so tests don't need a `tempfile`
    /// dev-dependency for something this small.
    struct TempJsonFile {
        path: PathBuf,
    }

    impl TempJsonFile {
        fn new(name: &str) -> Self {
            let mut path = std::env::temp_dir();
            path.push(format!("boiler-control-core-test-{}-{}.json", std::process::id(), name));
            Self { path }
        }
    }

    impl Drop for TempJsonFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    #[test]
    fn creates_defaults_on_first_load() {
        let tmp = TempJsonFile::new("defaults");
        let store = ConfigStore::load(&tmp.path).unwrap();
        let cfg = store.current();
        assert_eq!(cfg.target_temperature, 100.0);
        assert_eq!(cfg.proportional, 4.0);
    }

    #[test]
    fn unknown_keys_round_trip() {
        let tmp = TempJsonFile::new("unknown-keys");
        std::fs::write(
            &tmp.path,
            r#"{"target_temperature":90,"proportional":3.0,"integral":0.1,"derivative":5.0,
               "recovery_proportional":6.0,"recovery_integral":0.2,"recovery_derivative":8.0,
               "espresso_temperature":100,"steam_temperature":140,
               "custom_field":"keep-me"}"#,
        )
        .unwrap();
        let store = ConfigStore::load(&tmp.path).unwrap();
        let cfg = store.reload().unwrap();
        assert_eq!(cfg.unknown.get("custom_field").unwrap(), "keep-me");
        store.write(cfg).unwrap();
        let roundtrip = std::fs::read_to_string(&tmp.path).unwrap();
        assert!(roundtrip.contains("custom_field"));
    }

    #[test]
    fn out_of_range_falls_back_to_last_known_good() {
        let tmp = TempJsonFile::new("out-of-range");
        let store = ConfigStore::load(&tmp.path).unwrap();
        let mut good = store.current();
        good.proportional = 7.0;
        store.write(good).unwrap();

        std::fs::write(
            &tmp.path,
            r#"{"proportional": 999.0, "target_temperature": 95,
               "integral":0.1,"derivative":5.0,
               "recovery_proportional":6.0,"recovery_integral":0.2,"recovery_derivative":8.0,
               "espresso_temperature":100,"steam_temperature":140}"#,
        )
        .unwrap();
        let cfg = store.reload().unwrap();
        assert_eq!(cfg.proportional, 7.0, "out-of-range value should fall back to LKG, not default");
        assert_eq!(cfg.target_temperature, 95.0);
    }

    #[test]
    fn corrupt_file_keeps_last_known_good_without_rewriting_disk() {
        let tmp = TempJsonFile::new("corrupt");
        let store = ConfigStore::load(&tmp.path).unwrap();
        let before = store.current();
        std::fs::write(&tmp.path, "{ not json").unwrap();
        let after = store.reload().unwrap();
        assert_eq!(before, after);
    }
}

use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

use crate::dump::DumpLimits;

pub mod store;

pub use store::{ConfigItem, ConfigStore, TomlStore, Project, ProjectConfig};

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Default for Config {
    /// Built-in defaults only; no rc file, no environment.
    fn default() -> Self {
        Self { inner: default_map(), config_path: default_config_path() }
    }
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .protopadrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                let key = k.strip_prefix("PROTOPAD_").unwrap_or(&k).to_string();
                map.insert(key, v);
            }
        }

        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from)
    }

    pub fn timeout(&self, key: &str) -> Duration {
        Duration::from_secs(self.get(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(60))
    }

    pub fn dump_depth(&self) -> usize {
        self.get_usize("DUMP_DEPTH").unwrap_or(crate::dump::DEFAULT_DEPTH)
    }

    pub fn dump_max_items(&self) -> usize {
        self.get_usize("DUMP_MAX_ITEMS").unwrap_or(crate::dump::DEFAULT_MAX_ITEMS)
    }

    pub fn dump_limits(&self) -> DumpLimits {
        DumpLimits { depth: self.dump_depth(), max_items: self.dump_max_items() }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.get_path("WORK_DIR").unwrap_or_else(|| env::temp_dir().join("protopad"))
    }

    pub fn reference_assemblies_dir(&self) -> PathBuf {
        self.get_path("REFERENCE_ASSEMBLIES_DIR").unwrap_or_else(|| {
            PathBuf::from("/Library/Frameworks/Mono.framework/External/xbuild-frameworks")
        })
    }

    /// Directory holding the global `protopad.toml`.
    pub fn store_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn is_config_key(k: &str) -> bool {
    // Accept known keys or PROTOPAD_* for forward-compat
    const KEYS: &[&str] = &[
        "COMPILER",
        "COMPILE_TIMEOUT",
        "LOCAL_RUNNER",
        "LOCAL_RUNNER_HOST",
        "REQUEST_TIMEOUT",
        "DEVICE_ADDRESS",
        "DEFAULT_TARGET",
        "DUMP_DEPTH",
        "DUMP_MAX_ITEMS",
        "REFERENCE_ASSEMBLIES_DIR",
        "PIXATE_DLL",
        "PRETTIFY_MARKDOWN",
        "WORK_DIR",
    ];

    KEYS.contains(&k) || k.starts_with("PROTOPAD_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("protopad").join(".protopadrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Programs
    m.insert("COMPILER".into(), "mcs".into());
    m.insert("LOCAL_RUNNER".into(), "mono".into());
    m.insert("LOCAL_RUNNER_HOST".into(), "protopad-host.exe".into());

    // Numbers
    m.insert("COMPILE_TIMEOUT".into(), "60".into());
    m.insert("REQUEST_TIMEOUT".into(), "60".into());
    m.insert("DUMP_DEPTH".into(), crate::dump::DEFAULT_DEPTH.to_string());
    m.insert("DUMP_MAX_ITEMS".into(), crate::dump::DEFAULT_MAX_ITEMS.to_string());

    // Strings
    m.insert("DEFAULT_TARGET".into(), "local".into());

    // Bools as strings
    m.insert("PRETTIFY_MARKDOWN".into(), "false".into());

    m
}

use std::{collections::HashMap, fs, path::Path, time::Duration};

const SETTINGS_FILE: &str = "robot.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub robot_url: String,
    pub poll_interval_ms: u64,
    pub restart_grace_secs: u64,
    pub offset_poll_attempts: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            robot_url: "http://127.0.0.1:31950".into(),
            poll_interval_ms: 1000,
            restart_grace_secs: 5,
            offset_poll_attempts: 10,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.restart_grace_secs)
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// File values override defaults; environment values override the file.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("robot_url") {
                settings.robot_url = v.clone();
            }
            if let Some(v) = file_cfg.get("poll_interval_ms") {
                set_parsed(&mut settings.poll_interval_ms, v);
            }
            if let Some(v) = file_cfg.get("restart_grace_secs") {
                set_parsed(&mut settings.restart_grace_secs, v);
            }
            if let Some(v) = file_cfg.get("offset_poll_attempts") {
                set_parsed(&mut settings.offset_poll_attempts, v);
            }
        }
    }

    if let Some(v) = env("ROBOT_URL") {
        settings.robot_url = v;
    }
    if let Some(v) = env("APP__ROBOT_URL") {
        settings.robot_url = v;
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        set_parsed(&mut settings.poll_interval_ms, &v);
    }
    if let Some(v) = env("APP__RESTART_GRACE_SECS") {
        set_parsed(&mut settings.restart_grace_secs, &v);
    }
    if let Some(v) = env("APP__OFFSET_POLL_ATTEMPTS") {
        set_parsed(&mut settings.offset_poll_attempts, &v);
    }

    settings
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, raw: &str) {
    if let Ok(parsed) = raw.trim().parse::<T>() {
        *slot = parsed;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

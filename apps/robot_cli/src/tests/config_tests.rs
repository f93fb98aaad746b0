use super::{load_settings_from, Settings};

use std::{
    collections::HashMap,
    env, fs,
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn missing_file_keeps_defaults() {
    let settings = load_settings_from(Path::new("/nonexistent/robot.toml"), no_env);
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.restart_grace(), Duration::from_secs(5));
}

#[test]
fn file_then_env_overrides() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("robot_cli_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("robot.toml");
    fs::write(
        &path,
        "robot_url = \"http://10.0.0.5:31950\"\npoll_interval_ms = \"250\"\nrestart_grace_secs = \"soon\"\n",
    )
    .expect("write settings");

    let from_file = load_settings_from(&path, no_env);
    assert_eq!(from_file.robot_url, "http://10.0.0.5:31950");
    assert_eq!(from_file.poll_interval(), Duration::from_millis(250));
    assert_eq!(from_file.restart_grace_secs, 5);

    let env_vars: HashMap<&str, &str> = HashMap::from([
        ("ROBOT_URL", "http://robot-a:31950"),
        ("APP__ROBOT_URL", "http://robot-b:31950"),
        ("APP__RESTART_GRACE_SECS", "2"),
        ("APP__OFFSET_POLL_ATTEMPTS", "3"),
    ]);
    let from_env = load_settings_from(&path, |key| env_vars.get(key).map(|v| v.to_string()));
    assert_eq!(from_env.robot_url, "http://robot-b:31950");
    assert_eq!(from_env.poll_interval_ms, 250);
    assert_eq!(from_env.restart_grace_secs, 2);
    assert_eq!(from_env.offset_poll_attempts, 3);

    fs::remove_dir_all(temp_root).expect("cleanup");
}

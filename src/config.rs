use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::gestures::GestureKind;
use crate::modes::Mode;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

/// Engine tuning. Distances are normalized [0,1] unless the name says px.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub pinch_distance_threshold: f32,
    pub swipe_min_displacement_px: f32,
    pub hold_min_duration_s: f32,
    pub gesture_cooldown_s: f32,
    pub confidence_min: f32,
    pub stability_frames: usize,
    pub mode_switch_hold_s: f32,
    pub mode_switch_cooldown_s: f32,
    pub wrist_history_frames: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pinch_distance_threshold: 0.05,
            swipe_min_displacement_px: 160.0,
            hold_min_duration_s: 2.0,
            gesture_cooldown_s: 0.9,
            confidence_min: 0.85,
            stability_frames: 5,
            mode_switch_hold_s: 3.0,
            mode_switch_cooldown_s: 1.2,
            wrist_history_frames: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tracking {
    /// Flip Left/Right labels for mirrored webcams.
    pub swap_handedness: bool,
}

impl Default for Tracking {
    fn default() -> Self {
        Self {
            swap_handedness: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub tracking: Tracking,

    // Accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> PathBuf {
    let home = UserDirs::new().unwrap().home_dir().to_path_buf();
    home.join(".config").join("handctl")
}

pub fn profiles_dir() -> PathBuf {
    config_dir().join("profiles")
}

fn active_ptr_path() -> PathBuf {
    config_dir().join("active")
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir();
        let profdir = profiles_dir();
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = active_ptr_path();
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = Self::load_profile(&active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.profile = Self::load_profile(&self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.reload()?;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    fn load_profile(name: &str) -> Result<Profile> {
        let path = profiles_dir().join(format!("{name}.toml"));
        let txt = fs::read_to_string(&path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        let profile: Profile =
            toml::from_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "control_socket": crate::ipc::runtime::socket_path(),
            "frames_socket": crate::ipc::runtime::frames_socket_path(),
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input",
                "provider": "stream newline-delimited landmark frames into the frames socket"
            }
        })
    }
}

pub fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if th.stability_frames == 0 {
        return Err(anyhow!("thresholds.stability_frames must be at least 1"));
    }
    if th.wrist_history_frames < 2 {
        return Err(anyhow!("thresholds.wrist_history_frames must be at least 2"));
    }
    for (name, v) in [
        ("pinch_distance_threshold", th.pinch_distance_threshold),
        ("swipe_min_displacement_px", th.swipe_min_displacement_px),
        ("hold_min_duration_s", th.hold_min_duration_s),
        ("gesture_cooldown_s", th.gesture_cooldown_s),
        ("mode_switch_hold_s", th.mode_switch_hold_s),
        ("mode_switch_cooldown_s", th.mode_switch_cooldown_s),
    ] {
        if !(v.is_finite() && v > 0.0) {
            return Err(anyhow!("thresholds.{name} must be a positive number"));
        }
    }
    if !(0.0..=1.0).contains(&th.confidence_min) {
        return Err(anyhow!("thresholds.confidence_min must be within [0,1]"));
    }

    for (k, v) in &p.bindings {
        validate_binding_key(k)?;
        validate_binding_action(k, v, p.meta.allow_commands)?;
    }
    Ok(())
}

/// Binding keys look like "system.fist" or "browser.open_palm.hold".
fn validate_binding_key(key: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    if !(parts.len() == 2 || parts.len() == 3) {
        return Err(anyhow!(
            "binding '{}' must be mode.gesture or mode.gesture.hold",
            key
        ));
    }
    if Mode::from_key(parts[0]).is_none() {
        return Err(anyhow!("binding '{}' has unknown mode '{}'", key, parts[0]));
    }
    match GestureKind::from_key(parts[1]) {
        None | Some(GestureKind::Unknown) => {
            return Err(anyhow!(
                "binding '{}' has unknown gesture '{}'",
                key,
                parts[1]
            ));
        }
        Some(_) => {}
    }
    if parts.len() == 3 && parts[2] != "hold" {
        return Err(anyhow!(
            "binding '{}' third segment must be 'hold', got '{}'",
            key,
            parts[2]
        ));
    }
    Ok(())
}

fn validate_binding_action(key: &str, action: &str, allow_commands: bool) -> Result<()> {
    if action.trim().is_empty() {
        return Err(anyhow!("binding '{}' has empty action", key));
    }
    // an optional "@SECONDS" suffix overrides the action's cooldown
    let (body, cooldown) = match action.rsplit_once('@') {
        Some((body, secs)) => (body, Some(secs)),
        None => (action, None),
    };
    if let Some(secs) = cooldown {
        let parsed: f32 = secs
            .parse()
            .map_err(|_| anyhow!("binding '{}' has invalid cooldown '@{}'", key, secs))?;
        if !(parsed.is_finite() && parsed >= 0.0) {
            return Err(anyhow!("binding '{}' cooldown must be non-negative", key));
        }
    }

    let ok = body.starts_with("key:") || body.starts_with("cmd:");
    if !ok {
        return Err(anyhow!("binding '{}' has invalid action '{}'", key, action));
    }
    if body.starts_with("cmd:") && !allow_commands {
        return Err(anyhow!(
            "binding '{}' uses cmd: but allow_commands=false",
            key
        ));
    }
    Ok(())
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Profile {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn embedded_default_profile_is_valid() {
        let p = parse(default_profile_text());
        validate_profile(&p).unwrap();
        assert!(p.bindings.contains_key("system.fist"));
        assert!(p.bindings.contains_key("browser.open_palm.hold"));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let p = parse("[meta]\n[bindings]\n");
        assert_eq!(p.thresholds.stability_frames, 5);
        assert_eq!(p.thresholds.swipe_min_displacement_px, 160.0);
        assert!(p.tracking.swap_handedness);
    }

    #[test]
    fn nested_binding_tables_flatten() {
        let p = parse(
            r#"
[meta]
[bindings.media]
fist = "key:PLAYPAUSE"
[bindings.media.open_palm]
hold = "key:F5"
"#,
        );
        assert_eq!(p.bindings["media.fist"], "key:PLAYPAUSE");
        assert_eq!(p.bindings["media.open_palm.hold"], "key:F5");
    }

    #[test]
    fn unknown_gesture_in_binding_is_rejected() {
        let p = parse("[meta]\n[bindings]\n\"system.wave\" = \"key:TAB\"\n");
        assert!(validate_profile(&p).is_err());
    }

    #[test]
    fn binding_to_unknown_kind_is_rejected() {
        let p = parse("[meta]\n[bindings]\n\"system.unknown\" = \"key:TAB\"\n");
        assert!(validate_profile(&p).is_err());
    }

    #[test]
    fn cmd_bindings_require_allow_commands() {
        let denied = parse("[meta]\n[bindings]\n\"system.fist\" = \"cmd:loginctl lock-session\"\n");
        assert!(validate_profile(&denied).is_err());

        let allowed = parse(
            "[meta]\nallow_commands = true\n[bindings]\n\"system.fist\" = \"cmd:loginctl lock-session\"\n",
        );
        validate_profile(&allowed).unwrap();
    }

    #[test]
    fn cooldown_suffix_is_validated() {
        let good = parse("[meta]\n[bindings]\n\"media.thumbs_up\" = \"key:VOLUMEUP@0.25\"\n");
        validate_profile(&good).unwrap();

        let bad = parse("[meta]\n[bindings]\n\"media.thumbs_up\" = \"key:VOLUMEUP@fast\"\n");
        assert!(validate_profile(&bad).is_err());
    }

    #[test]
    fn non_positive_thresholds_are_rejected() {
        let p = parse("[meta]\n[thresholds]\nhold_min_duration_s = 0.0\n[bindings]\n");
        assert!(validate_profile(&p).is_err());
    }
}

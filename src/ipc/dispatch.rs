use anyhow::{Result, anyhow};
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::actions::{self, UinputSink};
use crate::config::Profile;
use crate::gestures::{GestureKind, GestureResult};
use crate::modes::Mode;
use crate::util::CooldownManager;

/// What a binding resolves to before execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Key(String),
    Command(String),
}

/// Look up the binding for this gesture in this mode, along with its
/// cooldown interval. A held gesture prefers its ".hold" variant and
/// falls back to the plain binding.
pub fn resolve_binding(
    profile: &Profile,
    mode: Mode,
    kind: GestureKind,
    is_hold: bool,
) -> Result<Option<(Action, Duration)>> {
    if kind == GestureKind::Unknown {
        return Ok(None);
    }
    let base = format!("{}.{}", mode.as_key(), kind.as_key());
    let raw = if is_hold {
        profile
            .bindings
            .get(&format!("{base}.hold"))
            .or_else(|| profile.bindings.get(&base))
    } else {
        profile.bindings.get(&base)
    };
    let Some(raw) = raw else {
        return Ok(None);
    };

    let (body, interval) = match raw.rsplit_once('@') {
        Some((body, secs)) => {
            let secs: f32 = secs
                .parse()
                .map_err(|_| anyhow!("binding '{base}' has invalid cooldown '@{secs}'"))?;
            (body, Duration::from_secs_f32(secs))
        }
        None => (
            raw.as_str(),
            Duration::from_secs_f32(profile.thresholds.gesture_cooldown_s),
        ),
    };

    let action = if let Some(rest) = body.strip_prefix("key:") {
        Action::Key(rest.trim().to_string())
    } else if let Some(rest) = body.strip_prefix("cmd:") {
        if !profile.meta.allow_commands {
            return Err(anyhow!("binding '{base}' uses cmd: but allow_commands=false"));
        }
        Action::Command(rest.trim().to_string())
    } else {
        return Err(anyhow!("unknown action mapping for {base} -> '{raw}'"));
    };
    Ok(Some((action, interval)))
}

/// Execute the active gesture's binding if its cooldown allows. Returns
/// a short description of what ran, if anything did.
pub fn dispatch_gesture(
    mode: Mode,
    result: &GestureResult,
    profile_arc: &Arc<Mutex<Profile>>,
    cooldown: &mut CooldownManager<(Mode, GestureKind)>,
    sink: &mut UinputSink,
    now: Instant,
) -> Result<Option<String>> {
    let resolved = {
        let p = profile_arc.lock().unwrap();
        resolve_binding(&p, mode, result.kind, result.is_hold)?
    };
    let Some((action, interval)) = resolved else {
        return Ok(None);
    };

    let key = (mode, result.kind);
    if !cooldown.ready(&key, now) {
        debug!(
            "cooling down: {}.{}",
            mode.as_key(),
            result.kind.as_key()
        );
        return Ok(None);
    }

    let desc = match &action {
        Action::Key(chord) => {
            sink.key_chord(chord)?;
            format!("key:{chord}")
        }
        Action::Command(cmdline) => {
            actions::run_command(cmdline)?;
            format!("cmd:{cmdline}")
        }
    };
    cooldown.trigger(key, now, Some(interval));
    Ok(Some(desc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        toml::from_str(
            r#"
[meta]
allow_commands = true

[bindings.system]
fist = "key:SUPER+L@1.5"
thumbs_up = "key:ENTER"
"fist.hold" = "cmd:systemctl suspend"

[bindings.media]
fist = "key:PLAYPAUSE"
"#,
        )
        .unwrap()
    }

    #[test]
    fn plain_binding_uses_default_cooldown() {
        let p = profile();
        let (action, interval) =
            resolve_binding(&p, Mode::System, GestureKind::ThumbsUp, false)
                .unwrap()
                .unwrap();
        assert_eq!(action, Action::Key("ENTER".into()));
        assert_eq!(interval, Duration::from_secs_f32(0.9));
    }

    #[test]
    fn suffix_overrides_cooldown() {
        let p = profile();
        let (action, interval) = resolve_binding(&p, Mode::System, GestureKind::Fist, false)
            .unwrap()
            .unwrap();
        assert_eq!(action, Action::Key("SUPER+L".into()));
        assert_eq!(interval, Duration::from_secs_f32(1.5));
    }

    #[test]
    fn hold_prefers_hold_variant() {
        let p = profile();
        let (action, _) = resolve_binding(&p, Mode::System, GestureKind::Fist, true)
            .unwrap()
            .unwrap();
        assert_eq!(action, Action::Command("systemctl suspend".into()));
    }

    #[test]
    fn hold_falls_back_to_plain_binding() {
        let p = profile();
        let (action, _) = resolve_binding(&p, Mode::System, GestureKind::ThumbsUp, true)
            .unwrap()
            .unwrap();
        assert_eq!(action, Action::Key("ENTER".into()));
    }

    #[test]
    fn unbound_and_unknown_resolve_to_none() {
        let p = profile();
        assert!(
            resolve_binding(&p, Mode::Browser, GestureKind::Fist, false)
                .unwrap()
                .is_none()
        );
        assert!(
            resolve_binding(&p, Mode::System, GestureKind::Unknown, false)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn same_gesture_in_another_mode_is_separate() {
        let p = profile();
        let (sys, _) = resolve_binding(&p, Mode::System, GestureKind::Fist, false)
            .unwrap()
            .unwrap();
        let (media, _) = resolve_binding(&p, Mode::Media, GestureKind::Fist, false)
            .unwrap()
            .unwrap();
        assert_ne!(sys, media);
    }
}

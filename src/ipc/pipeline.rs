use anyhow::Result;
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::dispatch;
use super::runtime;
use super::server::DaemonEvent;
use crate::actions::UinputSink;
use crate::config::Profile;
use crate::gestures::{GestureClassifier, GestureKind, GestureResult};
use crate::landmarks::{HandLabel, LandmarkFrame};
use crate::modes::{Mode, ModeManager};
use crate::util::{CooldownManager, FpsMeter};

/// Live engine state published for the `status` op. The pipeline thread
/// writes it once per frame; control clients only read.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub provider_connected: bool,
    pub mode: Mode,
    pub right: GestureKind,
    pub left: GestureKind,
    pub mode_progress: f32,
    pub fps: f32,
    pub last_action: String,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            provider_connected: false,
            mode: Mode::System,
            right: GestureKind::Unknown,
            left: GestureKind::Unknown,
            mode_progress: 0.0,
            fps: 0.0,
            last_action: String::new(),
        }
    }
}

/// Accept provider connections on the frames socket and run the engine
/// over each one. One provider at a time; per-hand state is rebuilt per
/// connection so a fresh provider starts from a clean window.
pub fn run_pipeline(
    profile: Arc<Mutex<Profile>>,
    status: Arc<Mutex<StatusSnapshot>>,
    tx_evt: std::sync::mpsc::Sender<DaemonEvent>,
) -> Result<()> {
    let sock = runtime::frames_socket_path();
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("pipeline: frames socket at {}", sock.display());

    let mut sink = UinputSink::new().unwrap_or_else(|_| UinputSink::noop());
    let default_cooldown = {
        let th = profile.lock().unwrap().thresholds.clone();
        Duration::from_secs_f32(th.gesture_cooldown_s)
    };
    let mut cooldown: CooldownManager<(Mode, GestureKind)> =
        CooldownManager::new(default_cooldown);

    loop {
        let (stream, _) = listener.accept()?;
        info!("pipeline: provider connected");
        if let Err(e) = serve_provider(stream, &profile, &status, &mut sink, &mut cooldown, &tx_evt)
        {
            warn!("pipeline: provider stream ended with error: {e}");
        }
        info!("pipeline: provider disconnected");
        status.lock().unwrap().provider_connected = false;
    }
}

fn serve_provider(
    stream: UnixStream,
    profile: &Arc<Mutex<Profile>>,
    status: &Arc<Mutex<StatusSnapshot>>,
    sink: &mut UinputSink,
    cooldown: &mut CooldownManager<(Mode, GestureKind)>,
    tx_evt: &std::sync::mpsc::Sender<DaemonEvent>,
) -> Result<()> {
    let (th, swap) = {
        let p = profile.lock().unwrap();
        (p.thresholds.clone(), p.tracking.swap_handedness)
    };

    let start = Instant::now();
    let mut right = GestureClassifier::new(th.clone(), start);
    let mut left = GestureClassifier::new(th.clone(), start);
    let mut modes = ModeManager::new(&th);
    let mut fps = FpsMeter::new(0.9);
    status.lock().unwrap().provider_connected = true;

    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: LandmarkFrame = match serde_json::from_str(&line) {
            Ok(f) => f,
            Err(e) => {
                warn!("pipeline: skipping undecodable frame: {e}");
                continue;
            }
        };

        let now = Instant::now();
        let frame_size = (frame.width, frame.height);

        let mut right_res = GestureResult::unknown();
        let mut left_res = GestureResult::unknown();
        for hand in &frame.hands {
            let label = if swap {
                hand.label.swapped()
            } else {
                hand.label
            };
            let clf = match label {
                HandLabel::Right => &mut right,
                HandLabel::Left => &mut left,
                HandLabel::Unknown => {
                    debug!("pipeline: unlabelled hand ignored");
                    continue;
                }
            };
            match hand.pose() {
                Ok(pose) => {
                    let res = clf.infer(&pose, frame_size, now);
                    match label {
                        HandLabel::Right => right_res = res,
                        HandLabel::Left => left_res = res,
                        HandLabel::Unknown => {}
                    }
                }
                // fail closed: the hand reports nothing this frame and
                // its temporal buffers stay untouched
                Err(e) => warn!("pipeline: dropped {label:?} hand: {e}"),
            }
        }

        // the right hand wins ties, as the more common control hand
        let active = if right_res.confidence >= left_res.confidence {
            right_res
        } else {
            left_res
        };

        // a sustained pinch on either hand drives the global mode; any
        // other signal interrupts a pending switch
        let signal = if right_res.kind == GestureKind::Pinch || left_res.kind == GestureKind::Pinch
        {
            GestureKind::Pinch
        } else {
            active.kind
        };
        if let Some(new_mode) = modes.observe(signal, now) {
            let _ = tx_evt.send(DaemonEvent::Log(format!("mode -> {}", new_mode.as_key())));
        }
        let mode = modes.current();

        let mut executed = None;
        if active.confidence >= th.confidence_min {
            match dispatch::dispatch_gesture(mode, &active, profile, cooldown, sink, now) {
                Ok(desc) => executed = desc,
                Err(e) => error!("dispatch failed: {e}"),
            }
        }
        if let Some(desc) = &executed {
            info!(
                "{}: {} ({}) -> {desc}",
                mode.as_key(),
                active.kind.as_key(),
                if active.is_hold { "hold" } else { "tap" },
            );
        }

        let fps_now = fps.tick(now);
        let mut st = status.lock().unwrap();
        st.mode = mode;
        st.right = right_res.kind;
        st.left = left_res.kind;
        st.mode_progress = modes.mode_switch_progress(now);
        st.fps = fps_now;
        if let Some(desc) = executed {
            st.last_action = desc;
        }
    }
    Ok(())
}

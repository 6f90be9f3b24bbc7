use anyhow::Result;
use log::{error, info, warn};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
    sync::{Arc, Mutex, mpsc},
    thread,
    time::Duration,
};

use super::pipeline::{StatusSnapshot, run_pipeline};
use super::runtime::socket_path;
use crate::config::{DaemonConfigState, Profile};

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path();
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut state = DaemonState::new()?;
    info!("daemon: active profile '{}'", state.cfg.active_name);

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonEvent>();

    // SIGINT/SIGTERM behave like a shutdown request
    spawn_signal_handler(tx_req.clone())?;

    // editing a profile on disk reloads it without a CLI round-trip
    let _watcher = watch_profiles(state.cfg.profiles_dir.clone(), tx_req.clone())?;

    // pipeline thread
    let pipeline = PipelineThread::start(state.cfg.profile.clone(), tx_evt.clone())?;

    // accept loop
    listener.set_nonblocking(true)?;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                let tx = tx_req.clone();
                let st_snapshot = state.clone_shallow();
                let status = pipeline.status.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, st_snapshot, status, tx) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(_) => {}
        }

        while let Ok(evt) = rx_evt.try_recv() {
            let DaemonEvent::Log(s) = evt;
            info!("[pipeline] {s}");
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload => {
                    if let Err(e) = state.cfg.reload() {
                        error!("reload failed: {e}");
                    } else {
                        pipeline.update_profile(state.cfg.profile.clone());
                        info!("profile reloaded");
                    }
                }
                IpcMsg::UseProfile(name) => {
                    if let Err(e) = state.cfg.set_active(&name) {
                        error!("use profile failed: {e}");
                    } else {
                        pipeline.update_profile(state.cfg.profile.clone());
                        info!("switched active profile to {}", state.cfg.active_name);
                    }
                }
                IpcMsg::Shutdown => {
                    let _ = std::fs::remove_file(&sock);
                    let _ = std::fs::remove_file(super::runtime::frames_socket_path());
                    return Ok(());
                }
            }
        }

        thread::sleep(Duration::from_millis(5));
    }
}

fn spawn_signal_handler(tx: mpsc::Sender<IpcMsg>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        for sig in signals.forever() {
            info!("daemon: received signal {sig}, shutting down");
            let _ = tx.send(IpcMsg::Shutdown);
        }
    });
    Ok(())
}

fn watch_profiles(
    dir: PathBuf,
    tx: mpsc::Sender<IpcMsg>,
) -> Result<notify::RecommendedWatcher> {
    use notify::{Event, EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(ev) => {
            if matches!(
                ev.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                let _ = tx.send(IpcMsg::Reload);
            }
        }
        Err(e) => warn!("profile watcher error: {e}"),
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

fn handle_client(
    mut stream: UnixStream,
    st: DaemonState,
    status: Arc<Mutex<StatusSnapshot>>,
    tx_req: mpsc::Sender<IpcMsg>,
) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = match op {
        "status" => {
            let snap = status.lock().unwrap().clone();
            serde_json::json!({"ok": true, "data": {
                "enabled": st.enabled,
                "active_profile": st.cfg.active_name,
                "provider_connected": snap.provider_connected,
                "mode": snap.mode.as_key(),
                "gesture": {"right": snap.right.as_key(), "left": snap.left.as_key()},
                "mode_switch_progress": snap.mode_progress,
                "fps": snap.fps,
                "last_action": snap.last_action,
                "control_socket": super::runtime::socket_path(),
                "frames_socket": super::runtime::frames_socket_path(),
            }})
        }
        "reload" => {
            let _ = tx_req.send(IpcMsg::Reload);
            serde_json::json!({"ok": true, "data": {"active_profile": st.cfg.active_name}})
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            let _ = tx_req.send(IpcMsg::UseProfile(name.to_string()));
            serde_json::json!({"ok": true, "data": {"active_profile": name}})
        }
        "list" => {
            let list = st.cfg.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": st.cfg.active_name}})
        }
        "doctor" => {
            let report = st.cfg.doctor_report();
            serde_json::json!({"ok": true, "data": report})
        }
        "shutdown" => {
            let _ = tx_req.send(IpcMsg::Shutdown);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };

    write!(stream, "{}\n", resp)?;
    Ok(())
}

struct DaemonState {
    pub enabled: bool,
    pub cfg: DaemonConfigState,
}

impl DaemonState {
    fn new() -> Result<Self> {
        let cfg = DaemonConfigState::load_or_install_default()?;
        Ok(Self { enabled: true, cfg })
    }
    fn clone_shallow(&self) -> Self {
        Self {
            enabled: self.enabled,
            cfg: self.cfg.clone(),
        }
    }
}

enum IpcMsg {
    Reload,
    UseProfile(String),
    Shutdown,
}

pub enum DaemonEvent {
    Log(String),
}

struct PipelineThread {
    profile: Arc<Mutex<Profile>>,
    status: Arc<Mutex<StatusSnapshot>>,
    _thread: thread::JoinHandle<()>,
}

impl PipelineThread {
    fn start(profile: Profile, tx_evt: mpsc::Sender<DaemonEvent>) -> Result<Self> {
        let profile_arc = Arc::new(Mutex::new(profile));
        let status = Arc::new(Mutex::new(StatusSnapshot::default()));
        let prof_clone = profile_arc.clone();
        let status_clone = status.clone();
        let handle = thread::spawn(move || {
            if let Err(e) = run_pipeline(prof_clone, status_clone, tx_evt) {
                error!("gesture pipeline failed: {e}");
            }
        });
        Ok(Self {
            profile: profile_arc,
            status,
            _thread: handle,
        })
    }

    fn update_profile(&self, new_profile: Profile) {
        if let Ok(mut p) = self.profile.lock() {
            *p = new_profile;
        }
    }
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;
    let sock = super::runtime::socket_path();
    if !sock.exists() {
        return Err(anyhow::anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}

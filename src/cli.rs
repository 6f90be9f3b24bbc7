use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{env, process::Command};

use crate::ipc;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("handctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"shutdown"}))?;
            print_response(&r);
            Ok(())
        }

        Some("status") => {
            let r = ipc::client_request(serde_json::json!({"op":"status"}))?;
            print_response(&r);
            Ok(())
        }

        Some("reload") => {
            let r = ipc::client_request(serde_json::json!({"op":"reload"}))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("list") => {
            let r = ipc::client_request(serde_json::json!({"op":"list"}))?;
            print_response(&r);
            Ok(())
        }

        Some("doctor") => {
            let r = ipc::client_request(serde_json::json!({"op":"doctor"}))?;
            print_response(&r);
            Ok(())
        }

        Some("emit") => {
            // usage: handctl emit key CTRL+SHIFT+TAB
            let what: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit key <CHORD>"))?;
            match what.as_str() {
                "key" => {
                    let chord: String = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit key CTRL+SHIFT+TAB"))?;
                    let mut sink = crate::actions::UinputSink::new()?;
                    sink.key_chord(&chord)?;
                    println!("ok: sent key chord {chord}");
                }
                other => return Err(anyhow!("unknown emit kind: {other}")),
            }
            Ok(())
        }

        Some("feed") => {
            // Stream a recorded frame file into the daemon, paced at
            // roughly camera rate. Useful for testing without a provider.
            let path: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl feed <frames.jsonl>"))?;
            feed_frames(&path)?;
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn feed_frames(path: &str) -> Result<()> {
    use std::io::Write;

    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {path}: {e}"))?;
    let sock = crate::ipc::runtime::frames_socket_path();
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (frames socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = std::os::unix::net::UnixStream::connect(sock)?;
    let mut sent = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        sent += 1;
        std::thread::sleep(std::time::Duration::from_millis(33));
    }
    println!("ok: fed {sent} frames");
    Ok(())
}

fn print_help() {
    println!(
        r#"handctl — hand-gesture control daemon

USAGE:
  handctl help [command]          Show general or command-specific help
  handctl start                   Start the daemon
  handctl stop                    Stop the daemon
  handctl status                  Show mode, per-hand gestures, fps
  handctl reload                  Reload active profile
  handctl use <name>              Switch active profile
  handctl list                    List profiles
  handctl doctor                  Diagnose permissions/sockets
  handctl emit key <CHORD>        Emit a key chord (e.g. CTRL+T)
  handctl feed <frames.jsonl>     Stream recorded landmark frames

TIPS:
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
  - Landmark providers connect to ~/.local/run/handctl-frames.sock and
    stream one JSON frame per line
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: handctl start\nStarts the background daemon."),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows active profile, current mode, per-hand gestures, mode-switch progress, fps."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => {
            println!("usage: handctl list\nLists available profiles.")
        }
        "doctor" => println!(
            "usage: handctl doctor\nChecks uinput permissions and reports socket locations."
        ),
        "emit" => println!("usage: handctl emit key CTRL+SHIFT+TAB"),
        "feed" => println!(
            "usage: handctl feed <frames.jsonl>\nStreams a recorded landmark frame file into the running daemon at ~30 fps."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}

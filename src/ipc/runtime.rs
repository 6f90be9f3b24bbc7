use directories::UserDirs;
use std::{fs, path::PathBuf};

pub fn runtime_dir() -> PathBuf {
    let home = UserDirs::new().unwrap().home_dir().to_path_buf();
    let dir = home.join(".local").join("run");
    let _ = fs::create_dir_all(&dir);
    dir
}

/// Control socket: one-line JSON requests from the CLI.
pub fn socket_path() -> PathBuf {
    runtime_dir().join("handctl.sock")
}

/// Frames socket: the landmark provider streams newline-delimited JSON
/// frames here.
pub fn frames_socket_path() -> PathBuf {
    runtime_dir().join("handctl-frames.sock")
}

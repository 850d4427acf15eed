#![allow(dead_code)]

use assert_cmd::prelude::*;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Spawns `relay <subcommand>` in `dir` and returns the child plus the
/// address it printed on its "listening on" line.
pub fn spawn_relay(dir: &Path, subcommand: &str) -> (Child, String) {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    cmd.current_dir(dir)
        .arg(subcommand)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().expect("failed to spawn relay");
    let stdout = child.stdout.take().expect("no stdout captured");
    let mut reader = BufReader::new(stdout);

    let mut line = String::new();
    let start = Instant::now();
    let addr = loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            if start.elapsed() > Duration::from_secs(5) {
                let _ = child.kill();
                panic!("timed out waiting for 'listening on …'");
            }
            std::thread::sleep(Duration::from_millis(20));
            continue;
        }
        if let Some(rest) = line.trim().strip_prefix("listening on ") {
            break rest.to_string();
        }
        if start.elapsed() > Duration::from_secs(5) {
            let _ = child.kill();
            panic!("did not see 'listening on …'; last line: {line}");
        }
    };
    (child, addr)
}

pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

/// Sends SIGTERM and expects the process to exit on its own.
pub fn terminate(mut child: Child) {
    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).expect("failed to send SIGTERM");
    match child
        .wait_timeout(Duration::from_secs(5))
        .expect("wait_timeout failed")
    {
        Some(status) => assert!(
            status.success() || status.signal().is_some(),
            "unexpected exit status: {status:?}"
        ),
        None => {
            let _ = child.kill();
            panic!("process did not exit within timeout after SIGTERM");
        }
    }
}

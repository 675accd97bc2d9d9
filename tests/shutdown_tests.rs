//! Signal handling for the daemon loop. Kept in its own test binary since the
//! handler can be installed only once per process.

#![cfg(unix)]

use std::process::Command;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use mailfeed::daemon::shutdown_flag;

#[test]
fn sigterm_clears_running_flag() {
    let running = shutdown_flag().expect("Failed to install signal handler");
    assert!(running.load(Ordering::SeqCst));

    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("Failed to run kill");
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(!running.load(Ordering::SeqCst));
}

//! Drives the real `dutyvisor worker` binary through [`OsLauncher`].
//!
//! `try_reap` waits for any child, so this binary keeps to a single test.

use std::time::{Duration, Instant};

use dutyvisor::{ControlSignal, ExitKind, LaunchSpec, Launcher, Mode, ModeProfiles, OsLauncher};
use nix::unistd::Pid;

fn wait_exit(launcher: &mut OsLauncher, pid: Pid, limit: Duration) -> Option<ExitKind> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        match launcher.try_reap() {
            Some((p, kind)) if p == pid => return Some(kind),
            Some(_) => {}
            None => std::thread::sleep(Duration::from_millis(20)),
        }
    }
    None
}

#[test]
fn worker_survives_control_signals_sent_right_after_launch() {
    let mut launcher = OsLauncher::new(env!("CARGO_BIN_EXE_dutyvisor"));
    let spec = LaunchSpec {
        slot: 0,
        mode: Mode::Heavy,
        profiles: ModeProfiles::default(),
        channel: None,
        status_every: Duration::from_millis(100),
    };

    let pid = launcher.launch(&spec).unwrap();
    // No pause: the worker has not registered any handler yet.
    launcher.signal(pid, ControlSignal::ModeLight).unwrap();
    launcher.signal(pid, ControlSignal::Reload).unwrap();
    launcher.signal(pid, ControlSignal::ModeHeavy).unwrap();

    std::thread::sleep(Duration::from_millis(300));
    launcher.signal(pid, ControlSignal::Terminate).unwrap();

    let exit = wait_exit(&mut launcher, pid, Duration::from_secs(5));
    if exit.is_none() {
        let _ = launcher.signal(pid, ControlSignal::ForceKill);
        let _ = wait_exit(&mut launcher, pid, Duration::from_secs(1));
    }
    assert_eq!(exit, Some(ExitKind::Exited(0)));
}

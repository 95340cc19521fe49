//! Process-table access for the SIGTERM cascade.

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use sysinfo::System;

/// Read and signal access to the host process table.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTree: Send + Sync {
    /// Direct children of `pid` at the time of the call.
    fn children(&self, pid: u32) -> Vec<u32>;

    /// Force-kills `pid`.
    fn kill(&self, pid: u32) -> Result<(), Errno>;
}

/// [`ProcessTree`] backed by the live process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTree;

impl ProcessTree for SystemProcessTree {
    fn children(&self, pid: u32) -> Vec<u32> {
        let mut sys = System::new();
        sys.refresh_processes();
        let parent = sysinfo::Pid::from_u32(pid);
        let mut children: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(_, process)| process.parent() == Some(parent))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        children.sort_unstable();
        children
    }

    fn kill(&self, pid: u32) -> Result<(), Errno> {
        kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
    }
}

/// Force-kills every direct child of `pid`, one at a time, without waiting
/// for them to exit. A child that is already gone counts as killed. Our own
/// pid is never signalled. Returns the pids that were handled.
pub fn kill_children(tree: &dyn ProcessTree, pid: u32) -> Vec<u32> {
    let own = std::process::id();
    let mut killed = Vec::new();
    for child in tree.children(pid) {
        if child == own || child == pid {
            continue;
        }
        match tree.kill(child) {
            Ok(()) => {
                warn!("Killed child process {child} of {pid}");
                killed.push(child);
            }
            Err(Errno::ESRCH) => {
                debug!("Child process {child} already exited");
                killed.push(child);
            }
            Err(e) => warn!("Failed to kill child process {child}: {e}"),
        }
    }
    killed
}

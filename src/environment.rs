//! Child environment and host preflight checks.

use log::debug;
use nix::unistd::{AccessFlags, access};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::net::ToSocketAddrs;
use std::path::Path;

use crate::error::{Result, RunnerError};

const KVM_DEVICE: &str = "/dev/kvm";

/// Environment for the deployment tool: the ambient environment with
/// chromite's `bin` on `PATH` and the build defaults the tool expects.
pub fn setup_env(chromite_path: &Path) -> HashMap<OsString, OsString> {
    setup_env_from(std::env::vars_os(), chromite_path)
}

fn setup_env_from<I>(vars: I, chromite_path: &Path) -> HashMap<OsString, OsString>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: HashMap<OsString, OsString> = vars.into_iter().collect();

    let mut path = env.remove(OsStr::new("PATH")).unwrap_or_default();
    path.push(":");
    path.push(chromite_path.join("bin"));
    env.insert("PATH".into(), path);

    // An empty value counts as unset.
    for (key, default) in [("GN_ARGS", "enable_nacl = true"), ("USE", "highdpi")] {
        let value = env.entry(key.into()).or_default();
        if value.is_empty() {
            *value = default.into();
        }
    }
    env
}

/// VMs need a writable `/dev/kvm`.
pub fn check_kvm() -> Result<()> {
    check_kvm_at(Path::new(KVM_DEVICE))
}

fn check_kvm_at(device: &Path) -> Result<()> {
    if !device.exists() {
        return Err(RunnerError::Preflight(format!(
            "{} is missing. Is KVM installed on this machine?",
            device.display()
        )));
    }
    access(device, AccessFlags::W_OK).map_err(|_| {
        RunnerError::Preflight(format!(
            "{} is not writable by the current user. Is it in the kvm group?",
            device.display()
        ))
    })?;
    debug!("{} is usable", device.display());
    Ok(())
}

/// Without an explicit device the run targets the lab DUT, whose hostname
/// only resolves on lab bots.
pub fn check_lab_dut(hostname: &str) -> Result<()> {
    match (hostname, 22).to_socket_addrs() {
        Ok(addrs) if addrs.len() > 0 => Ok(()),
        _ => Err(RunnerError::Preflight(format!(
            "The default lab DUT hostname {hostname} is unresolvable. Pass --device or --use-vm."
        ))),
    }
}

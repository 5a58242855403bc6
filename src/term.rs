use std::os::unix::io::RawFd;

use anyhow::{Context, Result};
use nix::libc;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{self, Pid};
use once_cell::sync::OnceCell;

/// Controlling-terminal state, captured once at startup.
#[derive(Debug)]
struct Terminal {
    fd: RawFd,
    shell_pgid: Pid,
    interactive: bool,
}

static TERMINAL: OnceCell<Terminal> = OnceCell::new();

/// Puts the shell in its own process group and takes ownership of the
/// controlling terminal. Must run before any job is launched and before
/// the shell's signal dispositions are installed (the foreground handshake
/// relies on SIGTTIN stopping us).
///
/// When stdin is not a terminal the shell stays usable for scripted input;
/// all terminal-ownership transfers become no-ops.
pub fn init() -> Result<()> {
    let fd = libc::STDIN_FILENO;
    let interactive = unistd::isatty(fd).unwrap_or(false);

    if interactive {
        // Stop until the parent shell places us in the foreground.
        while unistd::tcgetpgrp(fd).context("tcgetpgrp failed")? != unistd::getpgrp() {
            kill(unistd::getpid(), Signal::SIGTTIN).context("cannot signal own process")?;
        }

        let pid = unistd::getpid();
        unistd::setpgid(pid, pid).context("cannot become a process group leader")?;
        unistd::tcsetpgrp(fd, pid).context("cannot claim the controlling terminal")?;
    } else {
        log::warn!("stdin is not a terminal; terminal job control disabled");
    }

    let terminal = Terminal {
        fd,
        shell_pgid: unistd::getpgrp(),
        interactive,
    };
    let _ = TERMINAL.set(terminal);
    Ok(())
}

/// Hands the controlling terminal to the given process group.
pub fn give_to(pgid: Pid) {
    if let Some(terminal) = TERMINAL.get() {
        if terminal.interactive {
            if let Err(err) = unistd::tcsetpgrp(terminal.fd, pgid) {
                log::warn!("tcsetpgrp({pgid}) failed: {err}");
            }
        }
    }
}

/// Returns the controlling terminal to the shell's own process group.
pub fn reclaim() {
    if let Some(terminal) = TERMINAL.get() {
        if terminal.interactive {
            if let Err(err) = unistd::tcsetpgrp(terminal.fd, terminal.shell_pgid) {
                log::warn!("tcsetpgrp(shell) failed: {err}");
            }
        }
    }
}

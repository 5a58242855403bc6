use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use signal_hook::consts::signal::SIGCHLD;
use signal_hook::iterator::Signals;

use crate::jobs::{JobStatus, JobTable};
use crate::term;

/// Signals the shell suppresses for itself. Terminal-generated signals go
/// to the foreground job's process group, never to the shell; children
/// restore the default dispositions before exec.
const SHELL_IGNORED: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Installs the shell's own signal dispositions.
pub fn install_shell_signals() {
    for sig in SHELL_IGNORED {
        unsafe {
            let _ = signal::signal(sig, SigHandler::SigIgn);
        }
    }
}

/// Restores default dispositions in a forked child, before exec.
pub fn reset_child_signals() {
    for sig in SHELL_IGNORED {
        unsafe {
            let _ = signal::signal(sig, SigHandler::SigDfl);
        }
    }
}

/// Spawns the SIGCHLD relay: a dedicated thread that reaps every child
/// whose state changed and applies the transition to the job table under
/// its lock. Keeping the reaping out of handler context means the relay
/// shares the table through the same mutex as everyone else.
pub fn spawn_sigchld_relay(jobs: Arc<Mutex<JobTable>>) -> Result<()> {
    let mut signals = Signals::new([SIGCHLD]).context("cannot register SIGCHLD handler")?;
    thread::spawn(move || {
        for _ in signals.forever() {
            reap_children(&jobs);
        }
    });
    Ok(())
}

/// Collects every pending child state change without blocking. One SIGCHLD
/// can stand for several changed children, so this loops until the kernel
/// has nothing more to report.
fn reap_children(jobs: &Mutex<JobTable>) {
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::StillAlive) => break,
            Err(Errno::ECHILD) => break,
            Err(err) => {
                log::warn!("waitpid failed: {err}");
                break;
            }
            Ok(status) => {
                // Print after the lock is gone: a slow terminal write must
                // not extend the critical section the foreground poll
                // contends on.
                let notice = {
                    let mut table = jobs.lock().unwrap();
                    apply_wait_status(&mut table, status)
                };
                if let Some(notice) = notice {
                    println!("\n{notice}");
                }
            }
        }
    }
}

/// Applies one reaped child status to the job table and returns the
/// user-visible notice, if any. Statuses for processes the table does not
/// track are ignored.
///
/// The relay is the only place children are reaped; the foreground wait
/// loop watches the table instead of calling waitpid itself.
pub(crate) fn apply_wait_status(table: &mut JobTable, status: WaitStatus) -> Option<String> {
    match status {
        WaitStatus::Exited(pid, _) => {
            let was_foreground = table.find_by_pid(pid)?.status == JobStatus::Foreground;
            let job = table.remove_by_pid(pid)?;
            term::reclaim();
            if was_foreground {
                // The scheduler's wait loop observes the removal directly.
                None
            } else {
                Some(format!("[{}]+  Done\t   {}", job.id, job.name))
            }
        }
        WaitStatus::Signaled(pid, _, _) => {
            let job = table.remove_by_pid(pid)?;
            term::reclaim();
            Some(format!("[{}]+  Killed\t   {}", job.id, job.name))
        }
        WaitStatus::Stopped(pid, _) => {
            let was_background = table.find_by_pid(pid)?.status == JobStatus::Background;
            term::reclaim();
            let status = if was_background {
                JobStatus::WaitingInput
            } else {
                JobStatus::Suspended
            };
            table.set_status(pid, status);
            let job = table.find_by_pid(pid)?;
            if was_background {
                Some(format!(
                    "[{}]+  suspended [wants input]\t   {}",
                    job.id, job.name
                ))
            } else {
                Some(format!("[{}]+  stopped\t   {}", job.id, job.name))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    fn table_with(status: JobStatus) -> (JobTable, Pid) {
        let mut table = JobTable::new();
        let p = pid(4242);
        table.insert(p, p, "sleep 5", None, status);
        (table, p)
    }

    #[test]
    fn background_exit_removes_job_and_notices_once() {
        let (mut table, p) = table_with(JobStatus::Background);
        let notice = apply_wait_status(&mut table, WaitStatus::Exited(p, 0));
        assert!(notice.unwrap().contains("Done"));
        assert!(table.is_empty());
    }

    #[test]
    fn foreground_exit_removes_job_silently() {
        let (mut table, p) = table_with(JobStatus::Foreground);
        let notice = apply_wait_status(&mut table, WaitStatus::Exited(p, 0));
        assert!(notice.is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_pid_is_ignored() {
        let (mut table, _) = table_with(JobStatus::Background);
        let notice = apply_wait_status(&mut table, WaitStatus::Exited(pid(1), 0));
        assert!(notice.is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn signal_termination_removes_job_with_kill_notice() {
        let (mut table, p) = table_with(JobStatus::Background);
        let notice =
            apply_wait_status(&mut table, WaitStatus::Signaled(p, Signal::SIGKILL, false));
        assert!(notice.unwrap().contains("Killed"));
        assert!(table.is_empty());
    }

    #[test]
    fn stopped_background_job_waits_for_input() {
        let (mut table, p) = table_with(JobStatus::Background);
        let notice = apply_wait_status(&mut table, WaitStatus::Stopped(p, Signal::SIGSTOP));
        assert!(notice.unwrap().contains("wants input"));
        assert_eq!(
            table.find_by_pid(p).unwrap().status,
            JobStatus::WaitingInput
        );
    }

    #[test]
    fn stopped_foreground_job_is_suspended() {
        let (mut table, p) = table_with(JobStatus::Foreground);
        let notice = apply_wait_status(&mut table, WaitStatus::Stopped(p, Signal::SIGTSTP));
        assert!(notice.unwrap().contains("stopped"));
        assert_eq!(table.find_by_pid(p).unwrap().status, JobStatus::Suspended);
    }
}

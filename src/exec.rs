use std::convert::Infallible;
use std::ffi::CString;
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use nix::fcntl::{open, OFlag};
use nix::libc;
use nix::sys::signal::{killpg, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{self, dup2, fork, ForkResult, Pid};

use crate::jobs::{JobStatus, JobTable};
use crate::signals;
use crate::term;

/// Sleep between job-table polls while waiting on a foreground job.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A single optional redirection applied to a launched program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    None,
    Stdin(String),
    Stdout(String),
}

impl Redirect {
    /// The redirection target recorded in the job table, if any.
    pub fn descriptor(&self) -> Option<String> {
        match self {
            Redirect::None => None,
            Redirect::Stdin(file) | Redirect::Stdout(file) => Some(file.clone()),
        }
    }
}

/// Forks and execs `argv` in its own process group, registering the child
/// as a job and placing it in the foreground or background per `mode`.
///
/// The table lock is held from before the fork until the record is
/// inserted, so the SIGCHLD relay can never observe a child the table does
/// not yet know about. Fork failure is returned to the caller; a shell
/// that cannot spawn one command should still accept the next one.
pub fn launch_job(
    argv: &[String],
    redirect: Redirect,
    mode: JobStatus,
    jobs: &Arc<Mutex<JobTable>>,
) -> Result<()> {
    if argv.is_empty() {
        return Ok(());
    }
    let foreground = mode == JobStatus::Foreground;

    let mut table = jobs.lock().unwrap();
    match unsafe { fork() }.context("fork failed")? {
        ForkResult::Child => {
            // This copy of the lock guards nothing on the child side.
            drop(table);
            run_child(argv, &redirect, foreground)
        }
        ForkResult::Parent { child } => {
            // Mirror the child's own setpgid so neither side races ahead.
            let _ = unistd::setpgid(child, child);
            let id = table.insert(child, child, &argv.join(" "), redirect.descriptor(), mode);
            if !foreground {
                println!("[{id}] {child}");
            }
            drop(table);
            if foreground {
                put_foreground(jobs, child, false)
            } else {
                put_background(jobs, child, false)
            }
        }
    }
}

/// Child-side setup between fork and exec: default signal dispositions,
/// own process group, terminal claim for foreground launches, redirection.
/// Never returns to shell logic; any failure exits the child.
fn run_child(argv: &[String], redirect: &Redirect, foreground: bool) -> ! {
    signals::reset_child_signals();
    let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
    if foreground {
        term::give_to(unistd::getpid());
    }
    let err = match apply_redirect(redirect).and_then(|()| exec_program(argv)) {
        Err(err) => err,
        Ok(never) => match never {},
    };
    eprintln!("msh: {err:#}");
    process::exit(1);
}

fn apply_redirect(redirect: &Redirect) -> Result<()> {
    let (file, target, flags) = match redirect {
        Redirect::None => return Ok(()),
        Redirect::Stdin(file) => (file, libc::STDIN_FILENO, OFlag::O_RDONLY),
        Redirect::Stdout(file) => (
            file,
            libc::STDOUT_FILENO,
            OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_WRONLY,
        ),
    };
    let fd = open(file.as_str(), flags, Mode::from_bits_truncate(0o600))
        .with_context(|| format!("cannot open {file}"))?;
    dup2(fd, target).context("cannot rebind standard stream")?;
    let _ = unistd::close(fd);
    Ok(())
}

fn exec_program(argv: &[String]) -> Result<Infallible> {
    let args = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .context("argument contains a NUL byte")?;
    unistd::execvp(&args[0], &args).with_context(|| format!("{}: command not found", argv[0]))
}

/// Hands the job the terminal, continues its group when `cont`, marks it
/// foreground, then waits for it to finish or stop.
///
/// The wait is a non-suspending poll over the job table: the SIGCHLD relay
/// removes the record when the process is reaped and marks it Suspended
/// when it stops, and either transition ends the wait.
pub fn put_foreground(jobs: &Arc<Mutex<JobTable>>, pid: Pid, cont: bool) -> Result<()> {
    {
        let mut table = jobs.lock().unwrap();
        let pgid = match table.find_by_pid(pid) {
            Some(job) => job.pgid,
            // Already reaped; nothing to wait for.
            None => return Ok(()),
        };
        // Terminal first: a resumed job that touches the terminal before
        // the transfer would take SIGTTIN and stop again.
        term::give_to(pgid);
        if cont {
            if let Err(err) = killpg(pgid, Signal::SIGCONT) {
                term::reclaim();
                return Err(err)
                    .with_context(|| format!("cannot continue process group {pgid}"));
            }
        }
        table.set_status(pid, JobStatus::Foreground);
    }

    loop {
        thread::sleep(POLL_INTERVAL);
        let table = jobs.lock().unwrap();
        match table.find_by_pid(pid) {
            // Reaped and removed by the relay.
            None => break,
            // Stopped; the relay already reclaimed the terminal.
            Some(job) if job.status == JobStatus::Suspended => return Ok(()),
            Some(_) => {}
        }
    }
    term::reclaim();
    Ok(())
}

/// Leaves the job in the background, resuming its process group first when
/// `cont`. The terminal always stays with the shell.
pub fn put_background(jobs: &Arc<Mutex<JobTable>>, pid: Pid, cont: bool) -> Result<()> {
    term::reclaim();
    if !cont {
        return Ok(());
    }
    let mut table = jobs.lock().unwrap();
    if let Some(job) = table.find_by_pid(pid) {
        let pgid = job.pgid;
        killpg(pgid, Signal::SIGCONT)
            .with_context(|| format!("cannot continue process group {pgid}"))?;
        table.set_status(pid, JobStatus::WaitingInput);
    }
    Ok(())
}

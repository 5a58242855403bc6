use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use nix::sys::signal::{kill, Signal};
use nix::unistd;

use crate::exec::{self, Redirect};
use crate::jobs::{JobStatus, JobTable};

/// Dispatches shell-internal verbs. Returns true when `argv` named a
/// built-in and it was handled.
pub fn handle_builtin(argv: &[String], jobs: &Arc<Mutex<JobTable>>) -> bool {
    if argv.is_empty() {
        return false;
    }
    match argv[0].as_str() {
        "exit" => process::exit(0),
        "cd" => {
            change_directory(argv.get(1).map(String::as_str));
            true
        }
        "jobs" => {
            jobs.lock().unwrap().print_jobs();
            true
        }
        "fg" => {
            foreground(&argv[1..], jobs);
            true
        }
        "bg" => {
            background(&argv[1..], jobs);
            true
        }
        "kill" => {
            kill_job(&argv[1..], jobs);
            true
        }
        _ => false,
    }
}

/// `cd [dir]`: with no argument, changes to the home directory.
fn change_directory(target: Option<&str>) {
    let dir = match target {
        Some(path) => PathBuf::from(path),
        None => match dirs_next::home_dir() {
            Some(home) => home,
            None => {
                eprintln!("msh: cd: cannot determine home directory");
                return;
            }
        },
    };
    if let Err(err) = unistd::chdir(dir.as_path()) {
        eprintln!("msh: cd: {}: no such directory", dir.display());
        log::debug!("chdir failed: {err}");
    }
}

/// `fg <id>`: brings a job to the foreground. Stopped jobs are continued;
/// a running background job only gets the terminal.
fn foreground(args: &[String], jobs: &Arc<Mutex<JobTable>>) {
    let id = match args.first().and_then(|arg| arg.parse::<i32>().ok()) {
        Some(id) => id,
        None => {
            eprintln!("msh: fg: usage: fg <job-id>");
            return;
        }
    };
    let (pid, resume) = {
        let table = jobs.lock().unwrap();
        match table.find_by_jid(id) {
            Some(job) => (
                job.pid,
                matches!(job.status, JobStatus::Suspended | JobStatus::WaitingInput),
            ),
            None => {
                eprintln!("msh: fg: no such job: {id}");
                return;
            }
        }
    };
    if let Err(err) = exec::put_foreground(jobs, pid, resume) {
        eprintln!("msh: fg: {err:#}");
    }
}

/// `bg <id>` resumes a stopped job in the background;
/// `bg [in|out <file>] <command...>` launches a background command with an
/// optional redirected standard stream.
fn background(args: &[String], jobs: &Arc<Mutex<JobTable>>) {
    if args.is_empty() {
        eprintln!("msh: bg: usage: bg <job-id> | bg [in|out <file>] <command...>");
        return;
    }
    if let Ok(id) = args[0].parse::<i32>() {
        resume_in_background(id, jobs);
        return;
    }
    let (redirect, command) = match args[0].as_str() {
        "in" if args.len() >= 3 => (Redirect::Stdin(args[1].clone()), &args[2..]),
        "out" if args.len() >= 3 => (Redirect::Stdout(args[1].clone()), &args[2..]),
        _ => (Redirect::None, args),
    };
    if let Err(err) = exec::launch_job(command, redirect, JobStatus::Background, jobs) {
        eprintln!("msh: bg: {err:#}");
    }
}

fn resume_in_background(id: i32, jobs: &Arc<Mutex<JobTable>>) {
    let pid = {
        let table = jobs.lock().unwrap();
        match table.find_by_jid(id) {
            Some(job) if matches!(job.status, JobStatus::Suspended | JobStatus::WaitingInput) => {
                job.pid
            }
            Some(_) => {
                eprintln!("msh: bg: job {id} is already running");
                return;
            }
            None => {
                eprintln!("msh: bg: no such job: {id}");
                return;
            }
        }
    };
    if let Err(err) = exec::put_background(jobs, pid, true) {
        eprintln!("msh: bg: {err:#}");
    }
}

/// `kill <id>`: sends SIGKILL to the job's process. The table entry is
/// removed at the next SIGCHLD reap, which also prints the kill notice.
fn kill_job(args: &[String], jobs: &Arc<Mutex<JobTable>>) {
    let id = match args.first().and_then(|arg| arg.parse::<i32>().ok()) {
        Some(id) => id,
        None => {
            eprintln!("msh: kill: usage: kill <job-id>");
            return;
        }
    };
    let pid = {
        let table = jobs.lock().unwrap();
        match table.find_by_jid(id) {
            Some(job) => job.pid,
            None => {
                eprintln!("msh: kill: no such job: {id}");
                return;
            }
        }
    };
    if let Err(err) = kill(pid, Signal::SIGKILL) {
        eprintln!("msh: kill: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_jobs() -> Arc<Mutex<JobTable>> {
        Arc::new(Mutex::new(JobTable::new()))
    }

    #[test]
    fn unknown_commands_are_not_builtins() {
        let jobs = empty_jobs();
        let argv = vec!["sleep".to_string(), "5".to_string()];
        assert!(!handle_builtin(&argv, &jobs));
        assert!(!handle_builtin(&[], &jobs));
    }

    #[test]
    fn jobs_and_job_control_verbs_are_builtins() {
        let jobs = empty_jobs();
        for verb in ["jobs", "fg", "bg", "kill"] {
            let argv = vec![verb.to_string()];
            assert!(handle_builtin(&argv, &jobs));
        }
        // Referencing a missing job must leave the table untouched.
        let argv = vec!["kill".to_string(), "7".to_string()];
        assert!(handle_builtin(&argv, &jobs));
        assert!(jobs.lock().unwrap().is_empty());
    }

    #[test]
    fn cd_to_missing_directory_keeps_cwd() {
        let before = std::env::current_dir().unwrap();
        change_directory(Some("/definitely/not/a/directory"));
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}

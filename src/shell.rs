use std::env;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::builtins::handle_builtin;
use crate::exec;
use crate::jobs::{JobStatus, JobTable};
use crate::parser::parse_command_line;
use crate::signals;

/// Runs the read-eval loop until end-of-file or `exit`.
pub fn run_shell(emit_prompt: bool) -> Result<()> {
    // The single shared piece of mutable state: the job table, guarded by
    // one mutex shared with the SIGCHLD relay thread.
    let jobs = Arc::new(Mutex::new(JobTable::new()));
    signals::spawn_sigchld_relay(Arc::clone(&jobs))?;

    let mut editor = DefaultEditor::new()?;
    loop {
        let prompt = if emit_prompt {
            prompt_string()
        } else {
            String::new()
        };
        match editor.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                evaluate(&line, &jobs);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                log::error!("readline failed: {err}");
                break;
            }
        }
    }
    Ok(())
}

fn prompt_string() -> String {
    let cwd = env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|_| "?".to_string());
    format!("{cwd} msh> ")
}

/// Parses one line and routes it: built-in handler, or external launch in
/// the mode the trailing `&` selects.
fn evaluate(line: &str, jobs: &Arc<Mutex<JobTable>>) {
    let (argv, redirect, bg) = match parse_command_line(line) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("msh: {err}");
            return;
        }
    };
    log::debug!("command: {argv:?} redirect: {redirect:?} bg: {bg}");

    if handle_builtin(&argv, jobs) {
        return;
    }
    let mode = if bg {
        JobStatus::Background
    } else {
        JobStatus::Foreground
    };
    if let Err(err) = exec::launch_job(&argv, redirect, mode, jobs) {
        eprintln!("msh: {err:#}");
    }
}

use std::fmt;

use nix::unistd::Pid;

/// Scheduling state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Foreground,
    Background,
    Suspended,
    WaitingInput,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Foreground => "foreground",
            JobStatus::Background => "background",
            JobStatus::Suspended => "suspended",
            JobStatus::WaitingInput => "waiting input",
        };
        f.write_str(label)
    }
}

/// One tracked child process group.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i32,
    pub pid: Pid,
    pub pgid: Pid,
    pub name: String,
    /// Redirection target, if the job was launched with one.
    pub descriptor: Option<String>,
    pub status: JobStatus,
}

impl Job {
    /// Listing label for the redirection column.
    pub fn descriptor_label(&self) -> &str {
        self.descriptor.as_deref().unwrap_or("STANDARD")
    }
}

/// The shell's job table. Owns every job record; callers get borrows that
/// are only valid until the next mutation.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable { jobs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Registers a new job and returns its assigned id: one past the
    /// highest id currently in the table, starting at 1.
    pub fn insert(
        &mut self,
        pid: Pid,
        pgid: Pid,
        name: &str,
        descriptor: Option<String>,
        status: JobStatus,
    ) -> i32 {
        let id = self.jobs.iter().map(|job| job.id).max().unwrap_or(0) + 1;
        self.jobs.push(Job {
            id,
            pid,
            pgid,
            name: name.to_string(),
            descriptor,
            status,
        });
        log::debug!("added job [{id}] pid {pid}");
        id
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|job| job.pid == pid)
    }

    pub fn find_by_jid(&self, id: i32) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn find_by_status(&self, status: JobStatus) -> Option<&Job> {
        self.jobs.iter().find(|job| job.status == status)
    }

    /// Updates the status of the job owning `pid` in place. Returns whether
    /// a matching job was found.
    pub fn set_status(&mut self, pid: Pid, status: JobStatus) -> bool {
        match self.jobs.iter_mut().find(|job| job.pid == pid) {
            Some(job) => {
                job.status = status;
                true
            }
            None => false,
        }
    }

    /// Unlinks and returns the job owning `pid`, regardless of its position
    /// in the table.
    pub fn remove_by_pid(&mut self, pid: Pid) -> Option<Job> {
        let index = self.jobs.iter().position(|job| job.pid == pid)?;
        let job = self.jobs.remove(index);
        log::debug!("removed job [{}] pid {}", job.id, job.pid);
        Some(job)
    }

    pub fn remove_by_jid(&mut self, id: i32) -> Option<Job> {
        let index = self.jobs.iter().position(|job| job.id == id)?;
        Some(self.jobs.remove(index))
    }

    /// Prints the tabular job listing for the `jobs` built-in.
    pub fn print_jobs(&self) {
        println!("\nActive jobs:");
        let rule = "-".repeat(81);
        println!("{rule}");
        println!(
            "| {:>7} | {:>30} | {:>6} | {:>10} | {:>13} |",
            "job no.", "name", "pid", "descriptor", "status"
        );
        println!("{rule}");
        if self.jobs.is_empty() {
            println!("| {:<77} |", "No jobs.");
        } else {
            for job in &self.jobs {
                println!(
                    "| {:>7} | {:>30} | {:>6} | {:>10} | {:>13} |",
                    job.id,
                    job.name,
                    job.pid,
                    job.descriptor_label(),
                    job.status
                );
            }
        }
        println!("{rule}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    fn insert_bg(table: &mut JobTable, n: i32) -> i32 {
        table.insert(pid(n), pid(n), "sleep 5", None, JobStatus::Background)
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let mut table = JobTable::new();
        for n in 1..=5 {
            assert_eq!(insert_bg(&mut table, 100 + n), n);
        }
        assert_eq!(table.len(), 5);
        let ids: Vec<i32> = table.iter().map(|job| job.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn find_returns_inserted_fields() {
        let mut table = JobTable::new();
        insert_bg(&mut table, 101);
        let id = table.insert(
            pid(202),
            pid(202),
            "wc -l",
            Some("out.txt".into()),
            JobStatus::Foreground,
        );
        let job = table.find_by_jid(id).unwrap();
        assert_eq!(job.pid, pid(202));
        assert_eq!(job.name, "wc -l");
        assert_eq!(job.descriptor_label(), "out.txt");
        assert_eq!(table.find_by_pid(pid(202)).unwrap().id, id);
        assert_eq!(
            table.find_by_status(JobStatus::Foreground).unwrap().pid,
            pid(202)
        );
    }

    #[test]
    fn set_status_touches_only_the_matching_job() {
        let mut table = JobTable::new();
        insert_bg(&mut table, 101);
        insert_bg(&mut table, 102);
        assert!(table.set_status(pid(102), JobStatus::Suspended));
        assert_eq!(
            table.find_by_pid(pid(102)).unwrap().status,
            JobStatus::Suspended
        );
        let other = table.find_by_pid(pid(101)).unwrap();
        assert_eq!(other.status, JobStatus::Background);
        assert_eq!(other.name, "sleep 5");
        assert!(!table.set_status(pid(999), JobStatus::Suspended));
    }

    #[test]
    fn remove_unlinks_head_and_interior_entries() {
        let mut table = JobTable::new();
        insert_bg(&mut table, 101);
        insert_bg(&mut table, 102);
        insert_bg(&mut table, 103);

        // Removing the head really shrinks the table.
        let head = table.remove_by_pid(pid(101)).unwrap();
        assert_eq!(head.id, 1);
        assert_eq!(table.len(), 2);
        assert!(table.find_by_pid(pid(101)).is_none());
        assert!(table.find_by_jid(1).is_none());

        // Survivors keep their ids.
        assert_eq!(table.find_by_pid(pid(102)).unwrap().id, 2);
        assert_eq!(table.find_by_pid(pid(103)).unwrap().id, 3);

        assert!(table.remove_by_jid(3).is_some());
        assert!(table.remove_by_jid(3).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn next_id_is_max_plus_one() {
        let mut table = JobTable::new();
        insert_bg(&mut table, 101);
        insert_bg(&mut table, 102);
        table.remove_by_pid(pid(101)).unwrap();
        // Highest surviving id is 2, so the next insert gets 3.
        assert_eq!(insert_bg(&mut table, 103), 3);
    }
}

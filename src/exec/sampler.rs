// src/exec/sampler.rs

//! Periodic resource sampling of a step's process tree.
//!
//! On Linux the tree is discovered through `/proc`: every process whose
//! parent chain leads back to the step's root pid is included. Other
//! platforms have no sampler and produce no snapshots.

use chrono::Utc;

use crate::message::ProcessTreeStatus;

/// Samples the process tree rooted at one pid.
///
/// The sampler remembers the largest rss seen so far, so successive
/// snapshots carry a historical maximum.
#[derive(Debug)]
pub struct ProcessTreeSampler {
    root: u32,
    max_rss_bytes: u64,
    oom_baseline: Option<u64>,
    oom_killed: bool,
}

impl ProcessTreeSampler {
    pub fn new(root: u32) -> Self {
        Self {
            root,
            max_rss_bytes: 0,
            oom_baseline: platform::oom_kill_count(),
            oom_killed: false,
        }
    }

    /// Take one snapshot, or `None` when the tree cannot be observed (it is
    /// gone, or the platform has no sampler).
    pub fn sample(&mut self) -> Option<ProcessTreeStatus> {
        let usage = platform::tree_usage(self.root)?;
        self.max_rss_bytes = self.max_rss_bytes.max(usage.rss_bytes);
        let oom_killed = self.check_oom();

        Some(ProcessTreeStatus {
            timestamp: Utc::now(),
            rss_bytes: usage.rss_bytes,
            max_rss_bytes: self.max_rss_bytes,
            cpu_seconds: usage.cpu_seconds,
            oom_killed,
        })
    }

    /// Whether the kernel OOM killer fired in our cgroup since the sampler
    /// was created. Sticky once observed.
    pub fn check_oom(&mut self) -> bool {
        if !self.oom_killed {
            if let (Some(base), Some(now)) = (self.oom_baseline, platform::oom_kill_count()) {
                self.oom_killed = now > base;
            }
        }
        self.oom_killed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TreeUsage {
    pub rss_bytes: u64,
    pub cpu_seconds: f64,
}

/// Fields of `/proc/<pid>/stat` that the sampler needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProcStat {
    pub pid: u32,
    pub ppid: u32,
    /// utime + stime, in clock ticks.
    pub cpu_ticks: u64,
    /// Resident set, in pages.
    pub rss_pages: u64,
}

/// Parse one `/proc/<pid>/stat` line.
///
/// The command name is wrapped in parentheses and may itself contain spaces
/// or parentheses, so fields are counted from the last `)`.
pub(crate) fn parse_proc_stat(line: &str) -> Option<ProcStat> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    let pid = line[..open].trim().parse().ok()?;
    let fields: Vec<&str> = line.get(close + 1..)?.split_whitespace().collect();

    // fields[0] is field 3 (state) in proc(5) numbering.
    let ppid = fields.get(1)?.parse().ok()?;
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let rss_pages: i64 = fields.get(21)?.parse().ok()?;

    Some(ProcStat {
        pid,
        ppid,
        cpu_ticks: utime + stime,
        rss_pages: rss_pages.max(0) as u64,
    })
}

/// Sum usage over `root` and all of its descendants in `stats`.
pub(crate) fn aggregate_tree(
    root: u32,
    stats: &[ProcStat],
    page_size: u64,
    ticks_per_second: f64,
) -> Option<TreeUsage> {
    if !stats.iter().any(|s| s.pid == root) {
        return None;
    }

    let mut members = vec![root];
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for child in stats.iter().filter(|s| s.ppid == parent && s.pid != parent) {
            if !members.contains(&child.pid) {
                members.push(child.pid);
                frontier.push(child.pid);
            }
        }
    }

    let mut usage = TreeUsage::default();
    for stat in stats.iter().filter(|s| members.contains(&s.pid)) {
        usage.rss_bytes += stat.rss_pages * page_size;
        usage.cpu_seconds += stat.cpu_ticks as f64 / ticks_per_second;
    }
    Some(usage)
}

#[cfg(target_os = "linux")]
mod platform {
    use std::fs;
    use std::path::PathBuf;

    use super::{ProcStat, TreeUsage, aggregate_tree, parse_proc_stat};

    pub(super) fn tree_usage(root: u32) -> Option<TreeUsage> {
        let stats = read_all_stats();
        aggregate_tree(root, &stats, page_size(), ticks_per_second())
    }

    fn read_all_stats() -> Vec<ProcStat> {
        let Ok(entries) = fs::read_dir("/proc") else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.bytes().all(|b| b.is_ascii_digit()))
            })
            // Processes may exit between listing and reading.
            .filter_map(|entry| fs::read_to_string(entry.path().join("stat")).ok())
            .filter_map(|line| parse_proc_stat(&line))
            .collect()
    }

    fn page_size() -> u64 {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as u64 } else { 4096 }
    }

    fn ticks_per_second() -> f64 {
        // SAFETY: sysconf has no memory-safety preconditions.
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if ticks > 0 { ticks as f64 } else { 100.0 }
    }

    /// `oom_kill` counter of our cgroup-v2 `memory.events`, if available.
    pub(super) fn oom_kill_count() -> Option<u64> {
        let cgroup = fs::read_to_string("/proc/self/cgroup").ok()?;
        let rel = cgroup.lines().find_map(|l| l.strip_prefix("0::"))?;
        let mut path = PathBuf::from("/sys/fs/cgroup");
        path.push(rel.trim_start_matches('/'));
        path.push("memory.events");

        let events = fs::read_to_string(path).ok()?;
        events.lines().find_map(|line| {
            let (key, value) = line.split_once(' ')?;
            (key == "oom_kill").then(|| value.trim().parse().ok()).flatten()
        })
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use super::TreeUsage;

    pub(super) fn tree_usage(_root: u32) -> Option<TreeUsage> {
        None
    }

    pub(super) fn oom_kill_count() -> Option<u64> {
        None
    }
}

//! Process scanning from a procfs tree.
//!
//! Reads `/proc/<pid>/{stat,cmdline,exe,io,fd,limits}` into
//! [`ProcessObservation`]s. The root is configurable so tests can point it at
//! a fake tree.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::model::{Filedesc, Memory, ProcId, ProcMetrics, ProcStatic, ProcessObservation};
use super::source::{ProcIter, ProcReadError, ScanError};

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    100.0
}

fn get_page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        unsafe {
            let size = libc::sysconf(libc::_SC_PAGESIZE);
            if size > 0 {
                return size as u64;
            }
        }
    }
    4096
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Memory page size in bytes (for RSS calculation).
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

/// Fields of `/proc/<pid>/stat` used by the exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct StatFields {
    pub comm: String,
    pub ppid: u32,
    pub minflt: u64,
    pub majflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub num_threads: u64,
    /// Jiffies since boot.
    pub starttime: u64,
    pub vsize: u64,
    pub rss_pages: u64,
}

/// Parses the content of `/proc/<pid>/stat`.
///
/// The comm field may itself contain spaces and parentheses, so it is taken
/// as everything between the first `(` and the last `)`.
pub fn parse_stat(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = content[open + 1..close].to_string();

    // Field 3 (state) onwards.
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if rest.len() < 22 {
        return None;
    }
    let field = |idx: usize| rest[idx].parse::<u64>().ok();
    // rss is signed in the kernel's format; a negative value means zero.
    let rss_pages = rest[21].parse::<i64>().ok()?.max(0) as u64;

    Some(StatFields {
        comm,
        ppid: rest[1].parse().ok()?,
        minflt: field(7)?,
        majflt: field(9)?,
        utime: field(11)?,
        stime: field(12)?,
        num_threads: field(17)?,
        starttime: field(19)?,
        vsize: field(20)?,
        rss_pages,
    })
}

/// Reads Block I/O statistics from /proc/[pid]/io.
/// Returns (read_bytes, write_bytes) from storage devices.
/// Note: Requires appropriate permissions (usually root or CAP_SYS_PTRACE).
pub fn read_block_io(proc_path: &Path) -> Result<(u64, u64), io::Error> {
    let content = fs::read_to_string(proc_path.join("io"))?;

    let mut read_bytes = None;
    let mut write_bytes = None;
    for line in content.lines() {
        if let Some(v) = line.strip_prefix("read_bytes:") {
            read_bytes = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("write_bytes:") {
            write_bytes = v.trim().parse().ok();
        }

        if read_bytes.is_some() && write_bytes.is_some() {
            break;
        }
    }

    match (read_bytes, write_bytes) {
        (Some(r), Some(w)) => Ok((r, w)),
        _ => Err(io::Error::other("Invalid io format")),
    }
}

/// Soft limit on open files from `/proc/<pid>/limits`. Zero if unlimited or
/// unreadable.
pub fn read_fd_limit(proc_path: &Path) -> u64 {
    let Ok(content) = fs::read_to_string(proc_path.join("limits")) else {
        return 0;
    };
    content
        .lines()
        .find_map(|line| line.strip_prefix("Max open files"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|soft| soft.parse().ok())
        .unwrap_or(0)
}

/// Number of entries in `/proc/<pid>/fd`, if readable.
pub fn count_open_fds(proc_path: &Path) -> Option<u64> {
    fs::read_dir(proc_path.join("fd"))
        .ok()
        .map(|entries| entries.count() as u64)
}

/// Reads the NUL-separated command line.
pub fn read_cmdline(proc_path: &Path) -> Vec<String> {
    match fs::read(proc_path.join("cmdline")) {
        Ok(content) => content
            .split(|&b| b == 0u8)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Reads the boot time (unix seconds) from the `btime` line of `<root>/stat`.
pub fn read_boot_time(root: &Path) -> Result<u64, io::Error> {
    let content = fs::read_to_string(root.join("stat"))?;
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| io::Error::other("btime not found"))
}

/// Scans numeric entries of the procfs root.
pub fn collect_pids(root: &Path) -> Result<Vec<u32>, io::Error> {
    let mut pids: Vec<u32> = fs::read_dir(root)?
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();
    Ok(pids)
}

/// A procfs tree.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    boot_time: u64,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let boot_time = match read_boot_time(&root) {
            Ok(v) => v,
            Err(e) => {
                debug!("Failed to read boot time under {}: {}", root.display(), e);
                0
            }
        };
        Self { root, boot_time }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn boot_time(&self) -> u64 {
        self.boot_time
    }

    /// Reads every process under the root. Processes are read in parallel on
    /// the rayon pool and yielded in pid order.
    pub fn all_procs(&self) -> FsIter {
        match collect_pids(&self.root) {
            Ok(pids) => {
                debug!("Collected {} pids from {}", pids.len(), self.root.display());
                let results: Vec<_> = pids.par_iter().map(|&pid| self.read_proc(pid)).collect();
                FsIter {
                    items: results.into_iter(),
                    list_error: None,
                }
            }
            Err(source) => FsIter {
                items: Vec::new().into_iter(),
                list_error: Some(ScanError::List {
                    root: self.root.clone(),
                    source,
                }),
            },
        }
    }

    /// Reads one process. Only `stat` is mandatory; everything else degrades
    /// to an unavailable or empty value.
    pub fn read_proc(&self, pid: u32) -> Result<ProcessObservation, ProcReadError> {
        let proc_path = self.root.join(pid.to_string());
        let content = fs::read_to_string(proc_path.join("stat"))
            .map_err(|e| ProcReadError::from_io(pid, &e))?;
        let stat = parse_stat(&content)
            .ok_or_else(|| ProcReadError::parse(pid, "invalid stat format"))?;

        let (read_bytes, write_bytes) = match read_block_io(&proc_path) {
            Ok((r, w)) => (Some(r), Some(w)),
            Err(e) => {
                debug!("I/O counters unavailable for pid {}: {}", pid, e);
                (None, None)
            }
        };

        let exe = fs::read_link(proc_path.join("exe"))
            .ok()
            .map(|p| p.to_string_lossy().into_owned());

        let static_info = ProcStatic {
            name: stat.comm.clone(),
            cmdline: read_cmdline(&proc_path),
            exe,
            parent_pid: stat.ppid,
            start_time_seconds: self.boot_time as f64 + stat.starttime as f64 / *CLK_TCK,
        };

        let metrics = ProcMetrics {
            cpu_seconds: (stat.utime + stat.stime) as f64 / *CLK_TCK,
            read_bytes,
            write_bytes,
            major_page_faults: stat.majflt,
            minor_page_faults: stat.minflt,
            memory: Memory {
                resident_bytes: stat.rss_pages * *PAGE_SIZE,
                virtual_bytes: stat.vsize,
            },
            filedesc: Filedesc {
                open: count_open_fds(&proc_path),
                limit: read_fd_limit(&proc_path),
            },
            num_threads: stat.num_threads,
        };

        Ok(ProcessObservation::new(
            ProcId::new(pid, stat.starttime),
            static_info,
            metrics,
        ))
    }
}

/// A completed procfs scan. Listing failures surface on `close`.
pub struct FsIter {
    items: std::vec::IntoIter<Result<ProcessObservation, ProcReadError>>,
    list_error: Option<ScanError>,
}

impl ProcIter for FsIter {
    fn next_proc(&mut self) -> Option<Result<ProcessObservation, ProcReadError>> {
        self.items.next()
    }

    fn close(&mut self) -> Result<(), ScanError> {
        match self.list_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // Typical /proc/<pid>/stat format:
    // pid (comm) state ppid pgrp session tty_nr tpgid flags minflt cminflt majflt cmajflt utime stime ...
    const STAT: &str = "1234 (test_process) S 1 1234 1234 0 -1 4194304 100 0 7 0 1000 500 0 0 20 0 3 0 12345 12345678 1234 18446744073709551615 4194304 4238788 140736466511168 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0";

    #[test]
    fn test_parse_stat() {
        let stat = parse_stat(STAT).expect("valid stat");
        assert_eq!(stat.comm, "test_process");
        assert_eq!(stat.ppid, 1);
        assert_eq!(stat.minflt, 100);
        assert_eq!(stat.majflt, 7);
        assert_eq!(stat.utime, 1000);
        assert_eq!(stat.stime, 500);
        assert_eq!(stat.num_threads, 3);
        assert_eq!(stat.starttime, 12345);
        assert_eq!(stat.vsize, 12345678);
        assert_eq!(stat.rss_pages, 1234);
    }

    #[test]
    fn test_parse_stat_comm_with_spaces_and_parens() {
        let content = STAT.replace("(test_process)", "(tmux: server (1))");
        let stat = parse_stat(&content).expect("valid stat");
        assert_eq!(stat.comm, "tmux: server (1)");
        assert_eq!(stat.ppid, 1);
        assert_eq!(stat.starttime, 12345);
    }

    #[test]
    fn test_parse_stat_invalid() {
        assert_eq!(parse_stat("1234 (test) S 1 2 3"), None);
        assert_eq!(parse_stat(""), None);
        assert_eq!(parse_stat("garbage without parens"), None);
    }

    #[test]
    fn test_read_block_io() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(
            dir.path().join("io"),
            "rchar: 100\nwchar: 200\nsyscr: 1\nsyscw: 2\nread_bytes: 4096\nwrite_bytes: 8192\ncancelled_write_bytes: 0\n",
        )
        .expect("Failed to write io file");
        assert_eq!(read_block_io(dir.path()).unwrap(), (4096, 8192));
    }

    #[test]
    fn test_read_block_io_missing_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        assert!(read_block_io(dir.path()).is_err());
    }

    #[test]
    fn test_read_fd_limit() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(
            dir.path().join("limits"),
            "Limit                     Soft Limit           Hard Limit           Units\n\
             Max processes             63432                63432                processes\n\
             Max open files            1024                 524288               files\n",
        )
        .expect("Failed to write limits file");
        assert_eq!(read_fd_limit(dir.path()), 1024);

        std::fs::write(
            dir.path().join("limits"),
            "Max open files            unlimited            unlimited            files\n",
        )
        .expect("Failed to write limits file");
        assert_eq!(read_fd_limit(dir.path()), 0);
    }

    #[test]
    fn test_read_cmdline() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("cmdline"), b"nginx: worker\0-g\0daemon off;\0")
            .expect("Failed to write cmdline");
        assert_eq!(
            read_cmdline(dir.path()),
            vec!["nginx: worker", "-g", "daemon off;"]
        );
    }
}

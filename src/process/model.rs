//! Value types produced by one process scan.
//!
//! A [`ProcessObservation`] is what a scanner yields for a single process:
//! its identity, the facts that never change while it runs, and one reading
//! of its counters. Counters that could not be read are `None`, never zero;
//! zero is a legitimate reading.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Identity of one process instance.
///
/// `start_time` is the kernel start time in clock ticks since boot. The kernel
/// may hand the same pid to a new process, but never with the same start time,
/// so the pair stays unique for the life of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcId {
    pub pid: u32,
    pub start_time: u64,
}

impl ProcId {
    pub fn new(pid: u32, start_time: u64) -> Self {
        Self { pid, start_time }
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pid, self.start_time)
    }
}

/// Facts captured once when a process is discovered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcStatic {
    pub name: String,
    #[serde(default)]
    pub cmdline: Vec<String>,
    #[serde(default)]
    pub exe: Option<String>,
    #[serde(default)]
    pub parent_pid: u32,
    /// Start time in seconds since the unix epoch.
    #[serde(default)]
    pub start_time_seconds: f64,
}

/// Resident and virtual memory, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

/// Open file descriptors and the soft limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filedesc {
    /// `None` when the fd directory could not be read.
    pub open: Option<u64>,
    /// Zero when unknown or unlimited.
    pub limit: u64,
}

impl Filedesc {
    /// Fraction of the limit in use, if both sides are known.
    pub fn ratio(&self) -> Option<f64> {
        match self.open {
            Some(open) if self.limit > 0 => Some(open as f64 / self.limit as f64),
            _ => None,
        }
    }
}

/// One scan's reading of a process's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcMetrics {
    /// User plus system CPU time since the process started.
    pub cpu_seconds: f64,
    /// `None` when `/proc/<pid>/io` is not readable (usually permissions).
    pub read_bytes: Option<u64>,
    pub write_bytes: Option<u64>,
    #[serde(default)]
    pub major_page_faults: u64,
    #[serde(default)]
    pub minor_page_faults: u64,
    #[serde(default)]
    pub memory: Memory,
    #[serde(default)]
    pub filedesc: Filedesc,
    #[serde(default)]
    pub num_threads: u64,
}

/// Static facts plus the latest counter reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcInfo {
    #[serde(flatten)]
    pub static_info: ProcStatic,
    pub metrics: ProcMetrics,
}

/// Everything a scan reports about one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessObservation {
    pub id: ProcId,
    #[serde(flatten)]
    pub static_info: ProcStatic,
    pub metrics: ProcMetrics,
}

impl ProcessObservation {
    pub fn new(id: ProcId, static_info: ProcStatic, metrics: ProcMetrics) -> Self {
        Self {
            id,
            static_info,
            metrics,
        }
    }

    pub fn into_info(self) -> ProcInfo {
        ProcInfo {
            static_info: self.static_info,
            metrics: self.metrics,
        }
    }
}

/// Counter growth accumulated while a process (or a group) was tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Counts {
    pub cpu_seconds: f64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub major_page_faults: u64,
    pub minor_page_faults: u64,
}

impl Add for Counts {
    type Output = Counts;

    fn add(mut self, rhs: Counts) -> Counts {
        self += rhs;
        self
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Counts) {
        self.cpu_seconds += rhs.cpu_seconds;
        self.read_bytes += rhs.read_bytes;
        self.write_bytes += rhs.write_bytes;
        self.major_page_faults += rhs.major_page_faults;
        self.minor_page_faults += rhs.minor_page_faults;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filedesc_ratio() {
        let fd = Filedesc {
            open: Some(256),
            limit: 1024,
        };
        assert_eq!(fd.ratio(), Some(0.25));

        let unreadable = Filedesc {
            open: None,
            limit: 1024,
        };
        assert_eq!(unreadable.ratio(), None);

        let no_limit = Filedesc {
            open: Some(10),
            limit: 0,
        };
        assert_eq!(no_limit.ratio(), None);
    }

    #[test]
    fn test_counts_add() {
        let mut a = Counts {
            cpu_seconds: 1.5,
            read_bytes: 10,
            write_bytes: 20,
            major_page_faults: 1,
            minor_page_faults: 2,
        };
        a += Counts {
            cpu_seconds: 0.5,
            read_bytes: 1,
            write_bytes: 2,
            major_page_faults: 3,
            minor_page_faults: 4,
        };
        assert_eq!(a.cpu_seconds, 2.0);
        assert_eq!(a.read_bytes, 11);
        assert_eq!(a.write_bytes, 22);
        assert_eq!(a.major_page_faults, 4);
        assert_eq!(a.minor_page_faults, 6);
    }

    #[test]
    fn test_observation_json_keeps_unavailable_io() {
        let json = r#"{
            "id": {"pid": 42, "start_time": 1000},
            "name": "nginx",
            "cmdline": ["nginx", "-g", "daemon off;"],
            "parent_pid": 1,
            "metrics": {"cpu_seconds": 1.25, "read_bytes": null, "write_bytes": 7}
        }"#;
        let obs: ProcessObservation = serde_json::from_str(json).expect("valid observation");
        assert_eq!(obs.id, ProcId::new(42, 1000));
        assert_eq!(obs.static_info.name, "nginx");
        assert_eq!(obs.metrics.read_bytes, None);
        assert_eq!(obs.metrics.write_bytes, Some(7));
        assert_eq!(obs.metrics.filedesc.open, None);
    }
}

//! Check command implementation.
//!
//! Validates system requirements and configuration.

use herakles_process_exporter::process::{procfs, ProcFs};

use crate::config::{validate_effective_config, Config};

/// Validates system requirements and configuration.
pub fn command_check(
    proc: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Process Exporter - System Check");
    println!("============================================");

    let mut all_ok = true;

    // Check procfs
    if proc || all {
        let root = config.procfs_root();
        println!("\n📁 Checking procfs at {}...", root.display());
        match procfs::collect_pids(&root) {
            Ok(pids) if pids.is_empty() => {
                println!("   ❌ No process entries found");
                all_ok = false;
            }
            Ok(pids) => {
                println!("   ✅ Found {} process entries", pids.len());

                let fs = ProcFs::new(root.clone());
                if fs.boot_time() == 0 {
                    println!("   ⚠️  Boot time unavailable, start times will be relative");
                }

                let self_pid = std::process::id();
                match fs.read_proc(self_pid) {
                    Ok(obs) => {
                        println!(
                            "   ✅ Read own process: {} (cpu {:.2}s, {} threads)",
                            obs.static_info.name, obs.metrics.cpu_seconds, obs.metrics.num_threads
                        );
                        if obs.metrics.read_bytes.is_none() {
                            println!("   ⚠️  I/O counters not readable, I/O totals will not grow");
                        }
                    }
                    Err(e) => println!("   ⚠️  Cannot read own process: {}", e),
                }

                // pid 1 is owned by root; reading its io file tells us about privileges
                if let Ok(obs) = fs.read_proc(1) {
                    if obs.metrics.read_bytes.is_none() {
                        println!("   ⚠️  Cannot read I/O counters of other users' processes (run as root for full coverage)");
                    } else {
                        println!("   ✅ I/O counters of other users' processes readable");
                    }
                }
            }
            Err(e) => {
                println!("   ❌ Cannot list process entries: {}", e);
                all_ok = false;
            }
        }
    }

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    // Check group rules
    println!("\n📊 Checking group rules...");
    match config.group_matcher() {
        Ok(matcher) if matcher.rules().is_empty() => {
            println!("   ⚠️  No group rules configured");
        }
        Ok(matcher) => {
            println!("   ✅ {} group rules loaded", matcher.rules().len());
        }
        Err(e) => {
            println!("   ❌ Group rules invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}

//! Groups command implementation.
//!
//! Lists the loaded group rules.

use crate::config::Config;

/// Lists group rules in match order.
pub fn command_groups(
    verbose: bool,
    group_filter: Option<String>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let matcher = config.group_matcher()?;

    println!("📊 Herakles Process Exporter - Group Rules");
    println!("==========================================");
    let unmatched = if config.disable_others.unwrap_or(false) {
        "ignored"
    } else {
        "grouped as \"other\""
    };
    println!("First matching rule wins. Unmatched processes are {}.", unmatched);
    println!();

    let mut shown = 0;
    for (idx, rule) in matcher.rules().iter().enumerate() {
        if let Some(filter) = &group_filter {
            if !rule.name().contains(filter.as_str()) {
                continue;
            }
        }
        shown += 1;

        println!("{:>3}. {}", idx + 1, rule.name());
        if verbose {
            if !rule.comm().is_empty() {
                println!("     comm:    {}", rule.comm().join(", "));
            }
            if !rule.exe().is_empty() {
                println!("     exe:     {}", rule.exe().join(", "));
            }
            for pattern in rule.cmdline_patterns() {
                println!("     cmdline: {}", pattern);
            }
        }
    }

    println!();
    println!("Total rules: {} | Shown: {}", matcher.rules().len(), shown);

    Ok(())
}

//! Process classification into named groups.
//!
//! The grouper only needs a [`Classifier`]: something that maps a process's
//! static facts to a group name, or to nothing when the process should be
//! ignored. [`GroupMatcher`] is the rule-based implementation used by the
//! exporter, loaded from TOML files.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::model::ProcStatic;

/// Maps a process to the group it belongs to.
pub trait Classifier {
    fn classify(&self, info: &ProcStatic) -> Option<Arc<str>>;
}

impl<F> Classifier for F
where
    F: Fn(&ProcStatic) -> Option<Arc<str>>,
{
    fn classify(&self, info: &ProcStatic) -> Option<Arc<str>> {
        self(info)
    }
}

/// Built-in rules shipped with the binary.
pub const BUILTIN_RULES: &str = include_str!("../../data/groups.toml");

/// Rule files picked up automatically when present.
pub const DEFAULT_RULE_FILES: [&str; 2] = ["/etc/herakles/groups.toml", "./groups.toml"];

/// Group used for unmatched processes when the "other" bucket is enabled.
static OTHER_STR: Lazy<Arc<str>> = Lazy::new(|| Arc::from("other"));

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to read group rules from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse group rules from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("group '{name}': invalid cmdline pattern: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("group '{0}' has no comm, exe or cmdline criteria")]
    EmptyRule(String),
}

/// Rule as written in the TOML file.
#[derive(Debug, Deserialize)]
struct RuleConfig {
    name: String,
    #[serde(default)]
    comm: Vec<String>,
    #[serde(default)]
    exe: Vec<String>,
    #[serde(default)]
    cmdline: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    groups: Vec<RuleConfig>,
}

/// A compiled matching rule.
#[derive(Debug, Clone)]
pub struct GroupRule {
    name: String,
    /// Set when the name has no template placeholders.
    fixed_name: Option<Arc<str>>,
    comm: Vec<String>,
    exe: Vec<String>,
    cmdline: Vec<Regex>,
}

impl GroupRule {
    pub fn new(
        name: &str,
        comm: Vec<String>,
        exe: Vec<String>,
        cmdline: &[String],
    ) -> Result<Self, ClassifierError> {
        if comm.is_empty() && exe.is_empty() && cmdline.is_empty() {
            return Err(ClassifierError::EmptyRule(name.to_string()));
        }
        let cmdline = cmdline
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ClassifierError::Pattern {
                name: name.to_string(),
                source,
            })?;
        let fixed_name = (!name.contains('{')).then(|| Arc::from(name));
        Ok(Self {
            name: name.to_string(),
            fixed_name,
            comm,
            exe,
            cmdline,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comm(&self) -> &[String] {
        &self.comm
    }

    pub fn exe(&self) -> &[String] {
        &self.exe
    }

    pub fn cmdline_patterns(&self) -> impl Iterator<Item = &str> {
        self.cmdline.iter().map(Regex::as_str)
    }

    /// Returns the group name if `info` satisfies every criterion.
    pub fn apply(&self, info: &ProcStatic) -> Option<Arc<str>> {
        if !self.comm.is_empty() && !self.comm.iter().any(|c| *c == info.name) {
            return None;
        }

        let exe_base = exe_base(info);
        if !self.exe.is_empty() {
            let full = info.exe.as_deref().or(info.cmdline.first().map(String::as_str));
            let matched = self
                .exe
                .iter()
                .any(|e| Some(e.as_str()) == full || Some(e.as_str()) == exe_base);
            if !matched {
                return None;
            }
        }

        let mut captured: Option<String> = None;
        if !self.cmdline.is_empty() {
            let joined = info.cmdline.join(" ");
            for (idx, re) in self.cmdline.iter().enumerate() {
                let caps = re.captures(&joined)?;
                if idx == 0 {
                    let m = caps.get(1).or_else(|| caps.get(0));
                    captured = m.map(|m| m.as_str().to_string());
                }
            }
        }

        if let Some(name) = &self.fixed_name {
            return Some(Arc::clone(name));
        }
        let rendered = self
            .name
            .replace("{comm}", &info.name)
            .replace("{exe_base}", exe_base.unwrap_or(&info.name))
            .replace("{matched}", captured.as_deref().unwrap_or(""));
        Some(Arc::from(rendered))
    }
}

/// Basename of the executable, falling back to argv[0].
fn exe_base(info: &ProcStatic) -> Option<&str> {
    let path = info
        .exe
        .as_deref()
        .or_else(|| info.cmdline.first().map(String::as_str))?;
    Path::new(path).file_name().and_then(|s| s.to_str())
}

/// Substring include/exclude filter applied before any rule.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl NameFilter {
    /// Exclusion wins over inclusion; an empty include list admits everything.
    pub fn allows(&self, name: &str) -> bool {
        if let Some(ex) = &self.exclude {
            if ex.iter().any(|s| name.contains(s.as_str())) {
                return false;
            }
        }
        if let Some(inc) = &self.include {
            if !inc.is_empty() {
                return inc.iter().any(|s| name.contains(s.as_str()));
            }
        }
        true
    }
}

/// Rule-based classifier.
#[derive(Debug, Clone, Default)]
pub struct GroupMatcher {
    rules: Vec<GroupRule>,
    filter: NameFilter,
    others: bool,
}

impl GroupMatcher {
    pub fn new(rules: Vec<GroupRule>) -> Self {
        Self {
            rules,
            filter: NameFilter::default(),
            others: false,
        }
    }

    /// Parses rules from TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self, ClassifierError> {
        let mut rules = Vec::new();
        parse_rules_into(content, "<string>", &mut rules)?;
        Ok(Self::new(rules))
    }

    /// Built-in rules, then the default rule files that exist, then `extra`
    /// (which must exist). Earlier rules take precedence.
    pub fn load(extra: Option<&Path>) -> Result<Self, ClassifierError> {
        let mut rules = Vec::new();
        parse_rules_into(BUILTIN_RULES, "built-in rules", &mut rules)?;

        for path in DEFAULT_RULE_FILES.iter().map(Path::new) {
            if path.exists() {
                load_rules_file(path, &mut rules)?;
            }
        }
        if let Some(path) = extra {
            load_rules_file(path, &mut rules)?;
        }

        debug!("Loaded {} group rules", rules.len());
        Ok(Self::new(rules))
    }

    pub fn with_filter(mut self, filter: NameFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Routes unmatched processes to the `other` group instead of ignoring them.
    pub fn with_others(mut self, enabled: bool) -> Self {
        self.others = enabled;
        self
    }

    pub fn rules(&self) -> &[GroupRule] {
        &self.rules
    }
}

impl Classifier for GroupMatcher {
    fn classify(&self, info: &ProcStatic) -> Option<Arc<str>> {
        if !self.filter.allows(&info.name) {
            return None;
        }
        self.rules
            .iter()
            .find_map(|rule| rule.apply(info))
            .or_else(|| self.others.then(|| Arc::clone(&OTHER_STR)))
    }
}

fn parse_rules_into(
    content: &str,
    origin: &str,
    rules: &mut Vec<GroupRule>,
) -> Result<(), ClassifierError> {
    let parsed: RulesFile = toml::from_str(content).map_err(|source| ClassifierError::Parse {
        origin: origin.to_string(),
        source,
    })?;
    for rc in parsed.groups {
        rules.push(GroupRule::new(&rc.name, rc.comm, rc.exe, &rc.cmdline)?);
    }
    Ok(())
}

fn load_rules_file(path: &Path, rules: &mut Vec<GroupRule>) -> Result<(), ClassifierError> {
    let content = fs::read_to_string(path).map_err(|source| ClassifierError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rules_into(&content, &path.display().to_string(), rules)?;
    info!("Loaded additional group rules from {}", path.display());
    Ok(())
}

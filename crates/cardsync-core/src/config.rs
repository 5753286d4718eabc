use crate::error::{CardError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ManualEditPolicy
// ---------------------------------------------------------------------------

/// What a pass does when a Sub-Issues section holds lines it would drop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualEditPolicy {
    /// Regenerate the section and note the dropped lines in the plan.
    #[default]
    Overwrite,
    /// Refuse the pass with `ManualEditDetected`.
    Block,
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    #[default]
    File,
    Gh,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub kind: TrackerKind,
    /// Snapshot path for the file tracker, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// `owner/name`, passed to `gh --repo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default = "default_lanes")]
    pub lanes: Vec<String>,
    #[serde(default = "default_label_prefix")]
    pub status_label_prefix: String,
    #[serde(default)]
    pub manual_edits: ManualEditPolicy,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

fn default_version() -> u32 {
    1
}

fn default_lanes() -> Vec<String> {
    ["architecture", "platform", "product", "docs", "ops"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_label_prefix() -> String {
    "status:".to_string()
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            lanes: default_lanes(),
            status_label_prefix: default_label_prefix(),
            manual_edits: ManualEditPolicy::default(),
            tracker: TrackerConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CardError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// `InvalidLane` unless `lane` is one of the configured lanes.
    pub fn validate_lane(&self, lane: &str) -> Result<()> {
        if self.lanes.iter().any(|l| l == lane) {
            Ok(())
        } else {
            Err(CardError::InvalidLane {
                lane: lane.to_string(),
                allowed: self.lanes.clone(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.lanes.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "no lanes configured; every card will be rejected".to_string(),
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for lane in &self.lanes {
            if !seen.insert(lane.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("lane '{lane}' is listed more than once"),
                });
            }
        }

        if self.status_label_prefix.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "status_label_prefix is empty; every label would read as a status"
                    .to_string(),
            });
        }

        match self.tracker.kind {
            TrackerKind::Gh => {
                if which::which("gh").is_err() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: "tracker kind is 'gh' but no gh CLI was found on PATH"
                            .to_string(),
                    });
                }
                if self.tracker.path.is_some() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: "tracker.path is ignored by the gh tracker".to_string(),
                    });
                }
            }
            TrackerKind::File => {
                if self.tracker.repo.is_some() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: "tracker.repo is ignored by the file tracker".to_string(),
                    });
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("test-project");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.project.name, "test-project");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.lanes.len(), 5);
        assert_eq!(parsed.manual_edits, ManualEditPolicy::Overwrite);
        assert_eq!(parsed.tracker.kind, TrackerKind::File);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let yaml = "project:\n  name: my-project\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.status_label_prefix, "status:");
        assert!(cfg.lanes.contains(&"architecture".to_string()));
        assert!(cfg.tracker.path.is_none());

        let out = serde_yaml::to_string(&cfg).unwrap();
        assert!(!out.contains("repo"));
    }

    #[test]
    fn gh_tracker_with_block_policy() {
        let yaml = "\
project:
  name: p
manual_edits: block
tracker:
  kind: gh
  repo: orchard9/cards
";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.manual_edits, ManualEditPolicy::Block);
        assert_eq!(cfg.tracker.kind, TrackerKind::Gh);
        assert_eq!(cfg.tracker.repo.as_deref(), Some("orchard9/cards"));
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(CardError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("saved");
        cfg.lanes = vec!["ops".into()];
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.project.name, "saved");
        assert_eq!(loaded.lanes, vec!["ops".to_string()]);
    }

    #[test]
    fn lane_membership() {
        let cfg = Config::new("p");
        cfg.validate_lane("architecture").unwrap();
        assert!(matches!(
            cfg.validate_lane("marketing"),
            Err(CardError::InvalidLane { .. })
        ));
    }

    #[test]
    fn validate_default_config_no_warnings() {
        assert!(Config::new("p").validate().is_empty());
    }

    #[test]
    fn validate_flags_empty_lanes_and_prefix() {
        let mut cfg = Config::new("p");
        cfg.lanes.clear();
        cfg.status_label_prefix = " ".into();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Error));
    }

    #[test]
    fn validate_flags_duplicate_lane_and_stray_repo() {
        let mut cfg = Config::new("p");
        cfg.lanes.push("ops".into());
        cfg.tracker.repo = Some("a/b".into());
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("'ops'")));
        assert!(warnings.iter().any(|w| w.message.contains("tracker.repo")));
    }
}

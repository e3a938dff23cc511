use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable on-disk layout for C2's per-entity persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory under which jobs, rules, and calendar state are
    /// persisted as one file per entity.
    #[serde(default = "default_root")]
    pub root: String,

    /// Age, in days, after which completed/failed/cancelled jobs are
    /// swept by the retention sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_root() -> String {
    "./data".into()
}

fn default_retention_days() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = StorageConfig::default();
        assert_eq!(cfg.root, "./data");
        assert_eq!(cfg.retention_days, 30);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: StorageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.root, "./data");
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = StorageConfig {
            root: "/var/lib/scheduler-core".into(),
            retention_days: 14,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.root, "/var/lib/scheduler-core");
        assert_eq!(deserialized.retention_days, 14);
    }
}

//! Job configuration, loaded from a YAML file.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_derive::Deserialize;

use crate::queue_manager::QueueManagerConfig;

fn default_domains() -> Vec<String> {
    vec!["https://s3.amazonaws.com/revue".to_string(), "https://substackcdn.com".to_string()]
}

fn default_working_dir() -> String {
    "./".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(rename = "workingDir", default = "default_working_dir")]
    pub working_dir: String,
    #[serde(default)]
    pub queue: QueueManagerConfig,
    pub storage: StorageConfig,
    pub log: Option<LogSubConfig>,
}

impl MigrationConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file =
            File::open(path.as_ref()).map_err(|e| anyhow::anyhow!("config path could not be opened: {}", e))?;
        let reader = BufReader::new(file);
        let config: MigrationConfig =
            serde_yaml::from_reader(reader).map_err(|e| anyhow::anyhow!("config could not be parsed: {}", e))?;
        Ok(config)
    }

    /// Domains to scan for, falling back to the built-in defaults when the
    /// caller supplies none. An explicit empty list and an absent
    /// list are treated identically, as specified — there is no
    /// "disable scanning" sentinel.
    pub fn effective_domains(&self) -> Vec<String> {
        if self.domains.is_empty() {
            default_domains()
        } else {
            self.domains.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSubConfig {
    pub path: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

/// One filesystem root plus an extension allowlist per media class. A
/// standalone run of this crate uses a plain directory tree; the
/// `StorageAdapter` trait stays the extension point for a host CMS that
/// wants object storage or its own uniqueness rules instead.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub images: StorageClassConfig,
    pub media: StorageClassConfig,
    pub files: StorageClassConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageClassConfig {
    pub path: String,
    pub extensions: Vec<String>,
}

impl StorageConfig {
    pub fn extension_classes(&self) -> HashMap<String, crate::namer::MediaClass> {
        let mut map = HashMap::new();
        for ext in &self.images.extensions {
            map.insert(ext.to_lowercase(), crate::namer::MediaClass::Image);
        }
        for ext in &self.media.extensions {
            map.insert(ext.to_lowercase(), crate::namer::MediaClass::Media);
        }
        for ext in &self.files.extensions {
            map.insert(ext.to_lowercase(), crate::namer::MediaClass::File);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_storage() -> StorageConfig {
        StorageConfig {
            images: StorageClassConfig { path: "i".into(), extensions: vec![] },
            media: StorageClassConfig { path: "m".into(), extensions: vec![] },
            files: StorageClassConfig { path: "f".into(), extensions: vec![] },
        }
    }

    #[test]
    fn empty_domains_falls_back_to_defaults() {
        let config = MigrationConfig {
            domains: vec![],
            working_dir: default_working_dir(),
            queue: QueueManagerConfig::default(),
            storage: test_storage(),
            log: None,
        };
        assert_eq!(config.effective_domains(), default_domains());
    }

    #[test]
    fn explicit_domains_are_used_as_is() {
        let config = MigrationConfig {
            domains: vec!["https://example.com".to_string()],
            working_dir: default_working_dir(),
            queue: QueueManagerConfig::default(),
            storage: test_storage(),
            log: None,
        };
        assert_eq!(config.effective_domains(), vec!["https://example.com".to_string()]);
    }

    #[test]
    fn loads_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migration.yaml");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            "domains: [\"https://cdn.example\"]\n\
             storage:\n  images:\n    path: /data/images\n    extensions: [jpg, png]\n  media:\n    path: /data/media\n    extensions: [mp4]\n  files:\n    path: /data/files\n    extensions: [pdf]\n"
        )
        .unwrap();

        let config = MigrationConfig::load(&path).unwrap();
        assert_eq!(config.effective_domains(), vec!["https://cdn.example".to_string()]);
        assert_eq!(config.storage.images.path, "/data/images");
    }
}

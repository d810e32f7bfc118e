//! Default filesystem-backed `StorageAdapter`, good enough to run this
//! crate standalone. A host CMS is expected to supply its own adapter
//! (object storage, its own uniqueness rules) through the same trait.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::namer::{MediaClass, StorageAdapter, StorageAdapterSelector};

pub struct FsStorageAdapter {
    storage_path: String,
}

impl FsStorageAdapter {
    pub fn new(storage_path: impl Into<String>) -> Self {
        FsStorageAdapter { storage_path: storage_path.into() }
    }
}

#[async_trait]
impl StorageAdapter for FsStorageAdapter {
    fn storage_path(&self) -> &str {
        &self.storage_path
    }

    async fn get_target_dir(&self) -> String {
        self.storage_path.clone()
    }

    async fn get_unique_file_name(&self, name: &str, target_dir: &str) -> String {
        let path = Path::new(name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name).to_string();
        let ext = path.extension().and_then(|s| s.to_str()).map(|s| s.to_string());

        let mut attempt: u32 = 0;
        loop {
            let candidate = if attempt == 0 {
                name.to_string()
            } else {
                match &ext {
                    Some(e) => format!("{}-{}.{}", stem, attempt, e),
                    None => format!("{}-{}", stem, attempt),
                }
            };
            let full = Path::new(target_dir).join(&candidate);
            if !full.exists() {
                return full.to_string_lossy().to_string();
            }
            attempt += 1;
        }
    }

    async fn save_raw(&self, bytes: &[u8], relative_path: &str) -> anyhow::Result<String> {
        let full = Path::new(&self.storage_path).join(relative_path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(relative_path.to_string())
    }
}

pub struct FsStorageSelector {
    extension_classes: HashMap<String, MediaClass>,
    images: FsStorageAdapter,
    media: FsStorageAdapter,
    files: FsStorageAdapter,
}

impl FsStorageSelector {
    pub fn new(config: &StorageConfig) -> Self {
        FsStorageSelector {
            extension_classes: config.extension_classes(),
            images: FsStorageAdapter::new(&config.images.path),
            media: FsStorageAdapter::new(&config.media.path),
            files: FsStorageAdapter::new(&config.files.path),
        }
    }
}

impl StorageAdapterSelector for FsStorageSelector {
    fn classify(&self, extension: &str) -> Option<MediaClass> {
        self.extension_classes.get(&extension.to_lowercase()).copied()
    }

    fn adapter(&self, class: MediaClass) -> Option<&(dyn StorageAdapter)> {
        match class {
            MediaClass::Image => Some(&self.images),
            MediaClass::Media => Some(&self.media),
            MediaClass::File => Some(&self.files),
        }
    }
}

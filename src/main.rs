//! CLI entry point: parse args, load config, init logging, run once. This
//! job is a one-shot migrational batch, not a daemon, so it exits after one
//! pass rather than looping on an interval.
//!
//! The CMS resource repositories (`PostRepository` & co.) are external
//! collaborators — a host application links this crate as a library and
//! supplies its own. This binary wires up the fetch/store pipeline against
//! a CMS that returns no resources, so running it directly validates
//! config, logging and storage wiring without requiring a live CMS
//! connection.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, LevelFilter};

use media_reference_inliner::cms::{Page, PostMetaRepository, PostRepository, Resource, TagRepository, UserRepository};
use media_reference_inliner::config::{LogSubConfig, MigrationConfig};
use media_reference_inliner::fs_storage::FsStorageSelector;
use media_reference_inliner::orchestrator::InliningOrchestrator;
use media_reference_inliner::queue_manager::QueueManager;

#[derive(Parser, Debug, Clone)]
#[command(name = "media-reference-inliner", about = "Migrate externally-hosted media referenced from CMS content into local storage")]
struct CliArgs {
    /// Path to the migration config YAML file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured domains (may be passed more than once).
    #[arg(short, long = "domain")]
    domains: Vec<String>,
}

struct NoResource;

impl Resource for NoResource {
    fn id(&self) -> String {
        String::new()
    }

    fn get(&self, _field: &str) -> Option<String> {
        None
    }
}

/// Stands in for a CMS repository when no host application is embedding
/// this crate; always reports an empty, single-page result.
struct NullRepository;

#[async_trait::async_trait]
impl PostRepository for NullRepository {
    type Item = NoResource;

    async fn find_page(&self, _cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>> {
        Ok(Page { items: Vec::new(), cursor: None })
    }

    async fn edit(&self, _id: &str, _fields: HashMap<String, String>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl PostMetaRepository for NullRepository {
    type Item = NoResource;

    async fn find_page(&self, _cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>> {
        Ok(Page { items: Vec::new(), cursor: None })
    }

    async fn edit(&self, _id: &str, _fields: HashMap<String, String>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl TagRepository for NullRepository {
    type Item = NoResource;

    async fn find_page(&self, _cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>> {
        Ok(Page { items: Vec::new(), cursor: None })
    }

    async fn edit(&self, _id: &str, _fields: HashMap<String, String>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserRepository for NullRepository {
    type Item = NoResource;

    async fn find_page(&self, _cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>> {
        Ok(Page { items: Vec::new(), cursor: None })
    }

    async fn edit(&self, _id: &str, _fields: HashMap<String, String>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config = match MigrationConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("could not load config at {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    init_non_interactive_logging(config.log.as_ref());

    let domains = if args.domains.is_empty() { config.effective_domains() } else { args.domains.clone() };

    info!("starting media reference inliner for domains: {:?}", domains);

    let queue = QueueManager::new(config.queue.clone());
    let storage = Arc::new(FsStorageSelector::new(&config.storage));
    let orchestrator =
        InliningOrchestrator::new(NullRepository, NullRepository, NullRepository, NullRepository, queue, storage);

    match orchestrator.start_media_inliner(&domains).await {
        Ok(()) => info!("media reference inliner finished"),
        Err(e) => {
            error!("media reference inliner failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_non_interactive_logging(log_config: Option<&LogSubConfig>) {
    let (path, level) = if let Some(log_config) = log_config {
        let level = if log_config.debug { LevelFilter::Debug } else { LevelFilter::Info };
        (log_config.path.clone().unwrap_or_default(), level)
    } else {
        (String::new(), LevelFilter::Info)
    };

    if !path.is_empty() {
        simple_logging::log_to_file(path, level).unwrap();
    } else {
        simple_logging::log_to_stderr(level);
    }
}

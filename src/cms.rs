//! External CMS collaborator contracts. The host application
//! supplies implementations; this crate only depends on the trait
//! boundary, not a concrete database or API client.
//!
//! Fetching, persisting, and paging are intentionally left host-defined —
//! this crate's job is scanning and rewriting field values, not talking to
//! a CMS's database or API.

use std::collections::HashMap;

use async_trait::async_trait;

/// A single CMS record addressable by id, with named string fields that may
/// contain embedded media references.
pub trait Resource: Send + Sync {
    fn id(&self) -> String;
    fn get(&self, field: &str) -> Option<String>;
}

/// A page of resources plus whatever a repository needs to fetch the next
/// one. Repositories that return everything in one page leave `cursor`
/// `None` on the last (or only) page.
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    type Item: Resource;

    async fn find_page(&self, cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>>;
    async fn edit(&self, id: &str, fields: HashMap<String, String>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PostMetaRepository: Send + Sync {
    type Item: Resource;

    async fn find_page(&self, cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>>;
    async fn edit(&self, id: &str, fields: HashMap<String, String>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TagRepository: Send + Sync {
    type Item: Resource;

    async fn find_page(&self, cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>>;
    async fn edit(&self, id: &str, fields: HashMap<String, String>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    type Item: Resource;

    async fn find_page(&self, cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>>;
    async fn edit(&self, id: &str, fields: HashMap<String, String>) -> anyhow::Result<()>;
}

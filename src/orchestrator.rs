//! Drives scan -> fetch -> store -> rewrite across Post, PostMeta, Tag and
//! User resources, owns the shared URL cache, and isolates per-resource
//! failures so one bad resource never aborts the whole run.

use std::collections::HashMap;
use std::sync::Arc;

use log::{error, info, warn};

use crate::cms::{PostMetaRepository, PostRepository, Resource, TagRepository, UserRepository};
use crate::media_fetcher::MediaFetcher;
use crate::namer::{self, StorageAdapterSelector};
use crate::queue_manager::QueueManager;
use crate::reference_scanner::ReferenceScanner;
use crate::type_detector;
use crate::url_cache::{self, UrlCache};

const POST_SCALAR_FIELDS: &[&str] = &["feature_image"];
const POST_STRUCTURED_FIELDS: &[&str] = &["mobiledoc", "lexical"];
const POST_META_SCALAR_FIELDS: &[&str] = &["og_image", "twitter_image"];
const TAG_SCALAR_FIELDS: &[&str] = &["feature_image", "og_image", "twitter_image"];
const USER_SCALAR_FIELDS: &[&str] = &["profile_image", "cover_image"];

pub struct InliningOrchestrator<PR, PMR, TR, UR> {
    posts: PR,
    post_metas: PMR,
    tags: TR,
    users: UR,
    fetcher: MediaFetcher,
    queue: Arc<QueueManager>,
    cache: UrlCache,
    storage: Arc<dyn StorageAdapterSelector>,
}

impl<PR, PMR, TR, UR> InliningOrchestrator<PR, PMR, TR, UR>
where
    PR: PostRepository,
    PMR: PostMetaRepository,
    TR: TagRepository,
    UR: UserRepository,
{
    pub fn new(
        posts: PR,
        post_metas: PMR,
        tags: TR,
        users: UR,
        queue: Arc<QueueManager>,
        storage: Arc<dyn StorageAdapterSelector>,
    ) -> Self {
        InliningOrchestrator {
            posts,
            post_metas,
            tags,
            users,
            fetcher: MediaFetcher::new(queue.clone()),
            queue,
            cache: UrlCache::new(),
            storage,
        }
    }

    /// Job-entry surface. Runs every resource kind to completion,
    /// drains every host queue, then clears the cache so the next job
    /// starts cold.
    pub async fn start_media_inliner(&self, domains: &[String]) -> anyhow::Result<()> {
        info!("starting media inliner for domains: {:?}", domains);

        self.run_posts(domains).await;
        self.run_post_metas(domains).await;
        self.run_tags(domains).await;
        self.run_users(domains).await;

        self.queue.wait_for_all_queues().await;
        self.cache.clear().await;

        info!("media inliner finished");
        Ok(())
    }

    async fn run_posts(&self, domains: &[String]) {
        let mut cursor = None;
        loop {
            let page = match self.posts.find_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    error!("could not page posts: {}", e);
                    return;
                }
            };

            for post in &page.items {
                if let Err(e) = self.inline_post(post, domains).await {
                    error!("failed to inline post {}: {}", post.id(), e);
                }
            }

            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }
    }

    async fn inline_post(&self, post: &PR::Item, domains: &[String]) -> anyhow::Result<()> {
        let mut updates = self.inline_field(post, POST_SCALAR_FIELDS, domains).await;

        for field in POST_STRUCTURED_FIELDS {
            let Some(content) = post.get(field) else { continue };
            let rewritten = self.inline_content(&content, domains).await;
            if rewritten != content {
                updates.insert(field.to_string(), rewritten);
            }
        }

        if !updates.is_empty() {
            self.posts.edit(&post.id(), updates).await?;
        }
        Ok(())
    }

    async fn run_post_metas(&self, domains: &[String]) {
        let mut cursor = None;
        loop {
            let page = match self.post_metas.find_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    error!("could not page post metas: {}", e);
                    return;
                }
            };

            for meta in &page.items {
                let updates = self.inline_field(meta, POST_META_SCALAR_FIELDS, domains).await;
                if !updates.is_empty() {
                    if let Err(e) = self.post_metas.edit(&meta.id(), updates).await {
                        error!("failed to persist post meta {}: {}", meta.id(), e);
                    }
                }
            }

            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }
    }

    async fn run_tags(&self, domains: &[String]) {
        let mut cursor = None;
        loop {
            let page = match self.tags.find_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    error!("could not page tags: {}", e);
                    return;
                }
            };

            for tag in &page.items {
                let updates = self.inline_field(tag, TAG_SCALAR_FIELDS, domains).await;
                if !updates.is_empty() {
                    if let Err(e) = self.tags.edit(&tag.id(), updates).await {
                        error!("failed to persist tag {}: {}", tag.id(), e);
                    }
                }
            }

            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }
    }

    async fn run_users(&self, domains: &[String]) {
        let mut cursor = None;
        loop {
            let page = match self.users.find_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    error!("could not page users: {}", e);
                    return;
                }
            };

            for user in &page.items {
                let updates = self.inline_field(user, USER_SCALAR_FIELDS, domains).await;
                if !updates.is_empty() {
                    if let Err(e) = self.users.edit(&user.id(), updates).await {
                        error!("failed to persist user {}: {}", user.id(), e);
                    }
                }
            }

            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }
    }

    /// For each `(field, domain)` pair, rewrite the scalar value if it
    /// begins with `domain`, using the cache where possible.
    async fn inline_field(
        &self,
        resource: &impl Resource,
        fields: &[&str],
        domains: &[String],
    ) -> HashMap<String, String> {
        let mut updates = HashMap::new();

        for &field in fields {
            let Some(src) = resource.get(field) else { continue };
            let Some(_domain) = domains.iter().find(|d| src.starts_with(d.as_str())) else { continue };

            if let Some(stored_path) = self.resolve(&src).await {
                updates.insert(field.to_string(), format!("__GHOST_URL__{}", stored_path));
            }
        }

        updates
    }

    /// Scan content for every domain's references, dedupe, resolve each,
    /// and rewrite in place.
    async fn inline_content(&self, content: &str, domains: &[String]) -> String {
        let mut rewritten = content.to_string();

        for domain in domains {
            let matches = ReferenceScanner::find_matches(&rewritten, domain);
            for src in matches {
                if let Some(stored_path) = self.resolve(&src).await {
                    rewritten = ReferenceScanner::rewrite(&rewritten, &src, &stored_path);
                }
            }
        }

        rewritten
    }

    /// Fetch-detect-store a single URL, consulting and populating the
    /// shared cache keyed on its normalized form.
    async fn resolve(&self, src: &str) -> Option<String> {
        let normalized = url_cache::normalize(src);

        if let Some(cached) = self.cache.get(&normalized).await {
            return Some(cached);
        }

        let media = self.fetcher.fetch(src).await?;
        let detected = type_detector::detect(src, &media.headers, &media.file_buffer);

        let stored = match namer::store(self.storage.as_ref(), src, &detected.extension, &detected.bytes).await {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                warn!("failed to store media for {}: {}", src, e);
                return None;
            }
        };

        self.cache.insert(normalized, stored.clone()).await;
        Some(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::Page;
    use crate::fs_storage::FsStorageSelector;
    use crate::queue_manager::QueueManagerConfig;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeResource {
        id: String,
        fields: StdMutex<HashMap<String, String>>,
    }

    impl Resource for FakeResource {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn get(&self, field: &str) -> Option<String> {
            self.fields.lock().unwrap().get(field).cloned()
        }
    }

    struct FakePostRepository {
        posts: Vec<FakeResource>,
        edits: StdMutex<Vec<(String, HashMap<String, String>)>>,
    }

    #[async_trait]
    impl PostRepository for FakePostRepository {
        type Item = FakeResource;

        async fn find_page(&self, cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>> {
            if cursor.is_some() {
                return Ok(Page { items: Vec::new(), cursor: None });
            }
            let items = self
                .posts
                .iter()
                .map(|p| FakeResource { id: p.id.clone(), fields: StdMutex::new(p.fields.lock().unwrap().clone()) })
                .collect();
            Ok(Page { items, cursor: None })
        }

        async fn edit(&self, id: &str, fields: HashMap<String, String>) -> anyhow::Result<()> {
            self.edits.lock().unwrap().push((id.to_string(), fields));
            Ok(())
        }
    }

    struct EmptyRepository;

    #[async_trait]
    impl PostMetaRepository for EmptyRepository {
        type Item = FakeResource;

        async fn find_page(&self, _cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>> {
            Ok(Page { items: Vec::new(), cursor: None })
        }

        async fn edit(&self, _id: &str, _fields: HashMap<String, String>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl TagRepository for EmptyRepository {
        type Item = FakeResource;

        async fn find_page(&self, _cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>> {
            Ok(Page { items: Vec::new(), cursor: None })
        }

        async fn edit(&self, _id: &str, _fields: HashMap<String, String>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl UserRepository for EmptyRepository {
        type Item = FakeResource;

        async fn find_page(&self, _cursor: Option<&str>) -> anyhow::Result<Page<Self::Item>> {
            Ok(Page { items: Vec::new(), cursor: None })
        }

        async fn edit(&self, _id: &str, _fields: HashMap<String, String>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn storage(dir: &std::path::Path) -> Arc<dyn StorageAdapterSelector> {
        use crate::config::{StorageClassConfig, StorageConfig};
        Arc::new(FsStorageSelector::new(&StorageConfig {
            images: StorageClassConfig {
                path: dir.join("images").to_string_lossy().to_string(),
                extensions: vec!["png".into()],
            },
            media: StorageClassConfig { path: dir.join("media").to_string_lossy().to_string(), extensions: vec![] },
            files: StorageClassConfig { path: dir.join("files").to_string_lossy().to_string(), extensions: vec![] },
        }))
    }

    #[tokio::test]
    async fn one_post_with_url_in_scalar_and_body_fetches_once() {
        let server = MockServer::start().await;
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hits_clone = hits.clone();
        Mock::given(method("GET"))
            .respond_with(move |_: &wiremock::Request| {
                hits_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_bytes(
                    [0x89u8, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0].to_vec(),
                )
            })
            .mount(&server)
            .await;

        let url = format!("{}/a/b.png", server.uri());
        let domain = server.uri();

        let mut fields = HashMap::new();
        fields.insert("feature_image".to_string(), url.clone());
        fields.insert("lexical".to_string(), format!("{{\"src\":\"{}\",\"again\":\"{}\"}}", url, url));

        let post_repo =
            FakePostRepository { posts: vec![FakeResource { id: "p1".into(), fields: StdMutex::new(fields) }], edits: StdMutex::new(Vec::new()) };

        let dir = tempfile::tempdir().unwrap();
        let queue = QueueManager::new(QueueManagerConfig::default());
        let orchestrator = InliningOrchestrator::new(post_repo, EmptyRepository, EmptyRepository, EmptyRepository, queue, storage(dir.path()));

        orchestrator.start_media_inliner(&[domain]).await.unwrap();

        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
        let edits = orchestrator.posts.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        let (id, fields) = &edits[0];
        assert_eq!(id, "p1");
        assert!(fields.get("feature_image").unwrap().starts_with("__GHOST_URL__"));
        assert!(fields.get("lexical").unwrap().contains("__GHOST_URL__"));
        assert!(!fields.get("lexical").unwrap().contains(&url));
    }

    #[tokio::test]
    async fn empty_corpus_completes_with_no_fetches() {
        let post_repo = FakePostRepository { posts: Vec::new(), edits: StdMutex::new(Vec::new()) };
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueManager::new(QueueManagerConfig::default());
        let orchestrator = InliningOrchestrator::new(post_repo, EmptyRepository, EmptyRepository, EmptyRepository, queue, storage(dir.path()));

        orchestrator.start_media_inliner(&["https://substackcdn.com".to_string()]).await.unwrap();
        assert_eq!(orchestrator.cache.len().await, 0);
    }
}

//! Recording live portal traffic into a replayable fixture bundle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::fixture::{FixtureBundle, FixturePage, FixtureRawArtifact};
use crate::{BrowserError, Navigation, PortalBrowser, PortalPage};

#[derive(Debug, Clone)]
pub struct StoredPage {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub deduplicated: bool,
}

/// Hash-addressed page storage: `raw/<sha256>.html` under the archive root.
#[derive(Debug, Clone)]
pub struct PageArchive {
    root: PathBuf,
}

impl PageArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identical content is stored once under its hash.
    pub async fn store_html(&self, html: &str) -> anyhow::Result<StoredPage> {
        let content_hash = page_hash(html);
        let relative_path = PathBuf::from("raw").join(format!("{content_hash}.html"));
        let absolute_path = self.root.join(&relative_path);

        let deduplicated = fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking archive path {}", absolute_path.display()))?;
        if !deduplicated {
            publish(&absolute_path, html.as_bytes()).await?;
        }

        Ok(StoredPage {
            content_hash,
            relative_path,
            absolute_path,
            deduplicated,
        })
    }
}

/// Lowercase hex sha256 of a page body.
pub fn page_hash(html: &str) -> String {
    hex::encode(Sha256::digest(html.as_bytes()))
}

/// Write `bytes` next to `target` under a scratch name, then rename into
/// place. Readers never see a partial file under `target`.
async fn publish(target: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating archive directory {}", dir.display()))?;

    let scratch = dir.join(format!(".{}.part", Uuid::new_v4()));
    fs::write(&scratch, bytes)
        .await
        .with_context(|| format!("writing {}", scratch.display()))?;
    if let Err(err) = fs::rename(&scratch, target).await {
        let _ = fs::remove_file(&scratch).await;
        return Err(err).with_context(|| format!("publishing {}", target.display()));
    }
    Ok(())
}

/// Wraps another browser and archives every page it serves, so a live run
/// can later be replayed with [`crate::FixtureBrowser`].
pub struct RecordingBrowser {
    inner: Arc<dyn PortalBrowser>,
    archive: PageArchive,
    pages: Mutex<Vec<FixturePage>>,
}

impl RecordingBrowser {
    pub fn new(inner: Arc<dyn PortalBrowser>, archive: PageArchive) -> Self {
        Self {
            inner,
            archive,
            pages: Mutex::new(Vec::new()),
        }
    }

    /// Write `bundle.json` for everything recorded so far and return its path.
    pub async fn write_bundle(&self, fixture_id: &str, captured_from_url: &str) -> anyhow::Result<PathBuf> {
        let pages = self.pages.lock().await.clone();
        let count = pages.len();
        let bundle = FixtureBundle {
            fixture_id: fixture_id.to_string(),
            captured_from_url: captured_from_url.to_string(),
            captured_at: Utc::now(),
            pages,
            notes: None,
        };
        let path = self.archive.root().join("bundle.json");
        let json = serde_json::to_vec_pretty(&bundle).context("serializing fixture bundle")?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(pages = count, path = %path.display(), "fixture bundle written");
        Ok(path)
    }
}

#[async_trait]
impl PortalBrowser for RecordingBrowser {
    async fn navigate(&self, navigation: &Navigation) -> Result<PortalPage, BrowserError> {
        let page = self.inner.navigate(navigation).await?;
        let stored = self.archive.store_html(&page.html).await?;

        let mut pages = self.pages.lock().await;
        let trigger = navigation.trigger().cloned().unwrap_or_default();
        let already = pages.iter().any(|p| {
            p.method == navigation.method() && p.url == navigation.url() && p.trigger == trigger
        });
        if !already {
            pages.push(FixturePage {
                method: navigation.method(),
                url: navigation.url().to_string(),
                trigger,
                final_url: (page.url != navigation.url()).then(|| page.url.clone()),
                raw_artifact: FixtureRawArtifact {
                    path: Some(stored.relative_path.to_string_lossy().replace('\\', "/")),
                    inline_text: None,
                    sha256: Some(stored.content_hash),
                },
            });
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixtureBrowser;
    use tempfile::tempdir;

    struct StaticBrowser;

    #[async_trait]
    impl PortalBrowser for StaticBrowser {
        async fn navigate(&self, navigation: &Navigation) -> Result<PortalPage, BrowserError> {
            Ok(PortalPage {
                url: navigation.url().to_string(),
                html: format!("<html><body>{}</body></html>", navigation.url()),
            })
        }
    }

    #[test]
    fn page_hash_is_hex_sha256() {
        assert_eq!(
            page_hash("hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn identical_pages_are_stored_once() {
        let dir = tempdir().expect("tempdir");
        let archive = PageArchive::new(dir.path());

        let first = archive.store_html("<html>same</html>").await.expect("first store");
        let second = archive.store_html("<html>same</html>").await.expect("second store");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.relative_path, second.relative_path);
        assert!(first.absolute_path.exists());
    }

    #[tokio::test]
    async fn recorded_session_replays_offline() {
        let dir = tempdir().expect("tempdir");
        let recorder = RecordingBrowser::new(Arc::new(StaticBrowser), PageArchive::new(dir.path()));

        let live = recorder
            .navigate(&Navigation::get("https://portal/a"))
            .await
            .expect("live page");
        recorder
            .navigate(&Navigation::get("https://portal/a"))
            .await
            .expect("repeat page");
        let bundle_path = recorder
            .write_bundle("recorded", "https://portal")
            .await
            .expect("bundle");

        let replay = FixtureBrowser::load(&bundle_path).expect("load recorded bundle");
        let page = replay
            .navigate(&Navigation::get("https://portal/a"))
            .await
            .expect("replayed page");
        assert_eq!(page, live);
    }
}

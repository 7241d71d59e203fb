//! Offline replay of recorded portal pages.
//!
//! A bundle is a JSON index of recorded responses; each entry points at a raw
//! HTML file next to it (or carries the markup inline). Requests are matched
//! on method, URL and, for form postbacks, the parameters the clicked link
//! injected. View state and other form fields are ignored when matching.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{BrowserError, HttpMethod, Navigation, PortalBrowser, PortalPage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub fixture_id: String,
    pub captured_from_url: String,
    pub captured_at: DateTime<Utc>,
    pub pages: Vec<FixturePage>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturePage {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trigger: BTreeMap<String, String>,
    /// Address the response ended up at, when it differs from `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub raw_artifact: FixtureRawArtifact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRawArtifact {
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl FixturePage {
    fn matches(&self, navigation: &Navigation) -> bool {
        if self.method != navigation.method() || self.url != navigation.url() {
            return false;
        }
        match navigation.trigger() {
            Some(trigger) => &self.trigger == trigger,
            None => true,
        }
    }
}

pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle> {
    let path = path.as_ref();
    let mut bundle: FixtureBundle = read_json_file(path)?;
    for page in &mut bundle.pages {
        hydrate_raw_artifact(path, page)?;
    }
    Ok(bundle)
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn hydrate_raw_artifact(bundle_path: &Path, page: &mut FixturePage) -> Result<()> {
    if page.raw_artifact.inline_text.is_some() {
        return Ok(());
    }
    let Some(rel_path) = &page.raw_artifact.path else {
        anyhow::bail!("fixture page {} {} has neither path nor inline text", page.method, page.url);
    };
    let raw_path = bundle_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(rel_path);
    let raw = fs::read_to_string(&raw_path)
        .with_context(|| format!("reading fixture raw artifact {}", raw_path.display()))?;
    page.raw_artifact.inline_text = Some(raw);
    Ok(())
}

/// Serves recorded pages; a request with no recording is an error rather
/// than a silent empty page.
#[derive(Debug)]
pub struct FixtureBrowser {
    pages: Vec<FixturePage>,
    navigations: AtomicUsize,
}

impl FixtureBrowser {
    pub fn new(bundle: FixtureBundle) -> Self {
        Self {
            pages: bundle.pages,
            navigations: AtomicUsize::new(0),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_fixture_bundle(path)?))
    }

    /// `bundle.json` inside a fixture directory.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::load(dir.into().join("bundle.json"))
    }

    /// Number of navigations served so far.
    pub fn navigation_count(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortalBrowser for FixtureBrowser {
    async fn navigate(&self, navigation: &Navigation) -> Result<PortalPage, BrowserError> {
        let miss = || BrowserError::FixtureMiss {
            method: navigation.method(),
            url: navigation.url().to_string(),
        };
        let page = self.pages.iter().find(|p| p.matches(navigation)).ok_or_else(miss)?;
        let html = page.raw_artifact.inline_text.clone().ok_or_else(miss)?;
        self.navigations.fetch_add(1, Ordering::SeqCst);
        debug!(method = %navigation.method(), url = navigation.url(), "replayed fixture page");

        Ok(PortalPage {
            url: page.final_url.clone().unwrap_or_else(|| page.url.clone()),
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn inline_page(method: HttpMethod, url: &str, trigger: &[(&str, &str)], html: &str) -> FixturePage {
        FixturePage {
            method,
            url: url.to_string(),
            trigger: trigger
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            final_url: None,
            raw_artifact: FixtureRawArtifact {
                path: None,
                inline_text: Some(html.to_string()),
                sha256: None,
            },
        }
    }

    fn bundle(pages: Vec<FixturePage>) -> FixtureBundle {
        FixtureBundle {
            fixture_id: "test".into(),
            captured_from_url: "https://portal".into(),
            captured_at: Utc::now(),
            pages,
            notes: None,
        }
    }

    #[tokio::test]
    async fn postbacks_match_on_trigger_parameters_only() {
        let browser = FixtureBrowser::new(bundle(vec![
            inline_page(HttpMethod::Post, "https://portal/c.jsf", &[("id", "1")], "one"),
            inline_page(HttpMethod::Post, "https://portal/c.jsf", &[("id", "2")], "two"),
        ]));

        let nav = Navigation::SubmitForm {
            action: "https://portal/c.jsf".into(),
            fields: vec![("javax.faces.ViewState".into(), "j_id9".into()), ("id".into(), "2".into())],
            trigger: [("id".to_string(), "2".to_string())].into_iter().collect(),
        };
        let page = browser.navigate(&nav).await.unwrap();
        assert_eq!(page.html, "two");
        assert_eq!(browser.navigation_count(), 1);
    }

    #[tokio::test]
    async fn unrecorded_request_is_a_fixture_miss() {
        let browser = FixtureBrowser::new(bundle(vec![inline_page(
            HttpMethod::Get,
            "https://portal/a",
            &[],
            "a",
        )]));
        let err = browser.navigate(&Navigation::get("https://portal/b")).await.unwrap_err();
        assert!(matches!(err, BrowserError::FixtureMiss { method: HttpMethod::Get, .. }));
    }

    #[test]
    fn workspace_bundle_hydrates_every_page() {
        let bundle = load_fixture_bundle(workspace_root().join("fixtures/sigaa/bundle.json"))
            .expect("load sigaa bundle");
        assert!(!bundle.pages.is_empty());
        assert!(bundle.pages.iter().all(|p| p.raw_artifact.inline_text.is_some()));
    }
}

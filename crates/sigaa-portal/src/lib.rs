//! Portal substrate: page navigation, tab session, JSF click simulation and page parsers.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigaa_core::IngestError;
use thiserror::Error;

mod capture;
mod click;
mod fixture;
mod http;
pub mod parse;
mod session;

pub use capture::{PageArchive, RecordingBrowser, StoredPage};
pub use click::{resolve_click, ClickTarget, COMPONENT_LINK_TITLE, REPORT_LINK_TITLE};
pub use fixture::{load_fixture_bundle, FixtureBrowser, FixtureBundle, FixturePage, FixtureRawArtifact};
pub use http::{HttpPortalBrowser, PortalHttpConfig};
pub use session::{BrowserSession, TabId};

pub const DEFAULT_BASE_URL: &str = "https://sigaa.unb.br/sigaa/public";

/// A loaded document and the address it ended up at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalPage {
    pub url: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Get {
        url: String,
    },
    /// Postback of a whole form. `trigger` holds the parameters injected by the
    /// clicked link and is the stable part of the request; `fields` carries
    /// every successful control including them.
    SubmitForm {
        action: String,
        fields: Vec<(String, String)>,
        trigger: BTreeMap<String, String>,
    },
}

impl Navigation {
    pub fn get(url: impl Into<String>) -> Self {
        Self::Get { url: url.into() }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            Self::Get { .. } => HttpMethod::Get,
            Self::SubmitForm { .. } => HttpMethod::Post,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Get { url } => url,
            Self::SubmitForm { action, .. } => action,
        }
    }

    pub fn trigger(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Get { .. } => None,
            Self::SubmitForm { trigger, .. } => Some(trigger),
        }
    }
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("element not found: {what} on {url}")]
    ElementNotFound { what: String, url: String },
    #[error("cannot interpret click handler {0:?}")]
    ClickHandler(String),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("no recorded page for {method} {url}")]
    FixtureMiss { method: HttpMethod, url: String },
    #[error("tab {0} is not open")]
    UnknownTab(TabId),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<BrowserError> for IngestError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::ElementNotFound { what, url } => IngestError::ElementNotFound { what, url },
            other => IngestError::Browser(other.to_string()),
        }
    }
}

/// Anything that can turn a navigation into a loaded document: a live HTTP
/// client, a fixture replay, or a recorder wrapping either.
#[async_trait]
pub trait PortalBrowser: Send + Sync {
    async fn navigate(&self, navigation: &Navigation) -> Result<PortalPage, BrowserError>;
}

/// Fixed page addresses derived from the portal base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUrls {
    base: String,
}

impl PortalUrls {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Undergraduate program listing, grouped under department header rows.
    pub fn program_listing(&self) -> String {
        format!("{}/curso/lista.jsf?nivel=G&aba=p-graduacao", self.base)
    }

    /// Component search form; its unit select control carries department ids.
    pub fn component_search(&self) -> String {
        format!("{}/componentes/busca_componentes.jsf", self.base)
    }

    pub fn curriculum_listing(&self, program_sigaa_id: i64) -> String {
        format!("{}/curso/curriculo.jsf?id={program_sigaa_id}", self.base)
    }
}

impl Default for PortalUrls {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_strip_trailing_slash() {
        let urls = PortalUrls::new("https://sigaa.example.edu/sigaa/public/");
        assert_eq!(
            urls.curriculum_listing(414924),
            "https://sigaa.example.edu/sigaa/public/curso/curriculo.jsf?id=414924"
        );
        assert_eq!(
            PortalUrls::default().program_listing(),
            "https://sigaa.unb.br/sigaa/public/curso/lista.jsf?nivel=G&aba=p-graduacao"
        );
    }

    #[test]
    fn element_not_found_keeps_its_kind_across_the_boundary() {
        let err: IngestError = BrowserError::ElementNotFound {
            what: "report link".into(),
            url: "u".into(),
        }
        .into();
        assert!(matches!(err, IngestError::ElementNotFound { .. }));

        let err: IngestError = BrowserError::UnknownTab(TabId(3)).into();
        assert!(matches!(err, IngestError::Browser(_)));
    }
}

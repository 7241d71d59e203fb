use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::{BrowserError, Navigation, PortalBrowser, PortalPage};

#[derive(Debug, Clone)]
pub struct PortalHttpConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for PortalHttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

/// Live portal access. The cookie store keeps the JSF session alive across
/// requests, which postbacks rely on.
#[derive(Debug, Clone)]
pub struct HttpPortalBrowser {
    client: reqwest::Client,
}

impl HttpPortalBrowser {
    pub fn new(config: PortalHttpConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PortalBrowser for HttpPortalBrowser {
    async fn navigate(&self, navigation: &Navigation) -> Result<PortalPage, BrowserError> {
        let request = match navigation {
            Navigation::Get { url } => self.client.get(url),
            Navigation::SubmitForm { action, fields, .. } => self.client.post(action).form(fields),
        };
        let resp = request.send().await?;
        let status = resp.status();
        let url = resp.url().to_string();
        if !status.is_success() {
            return Err(BrowserError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        let html = resp.text().await?;
        debug!(%url, bytes = html.len(), "portal page loaded");
        Ok(PortalPage { url, html })
    }
}

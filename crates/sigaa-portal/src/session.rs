use std::fmt;
use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use crate::click::{resolve_click, ClickTarget};
use crate::{BrowserError, Navigation, PortalBrowser, PortalPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Tab {
    id: TabId,
    page: PortalPage,
}

/// Open tabs of one ingestion run. Tabs hold the last document loaded in
/// them; nothing is closed implicitly.
pub struct BrowserSession {
    browser: Arc<dyn PortalBrowser>,
    tabs: Vec<Tab>,
    next_id: u64,
}

impl BrowserSession {
    pub fn new(browser: Arc<dyn PortalBrowser>) -> Self {
        Self {
            browser,
            tabs: Vec::new(),
            next_id: 1,
        }
    }

    /// Page locator: hand back a tab already showing `url`, otherwise load it
    /// in a fresh tab.
    pub async fn acquire_page(&mut self, url: &str) -> Result<TabId, BrowserError> {
        if let Some(tab) = self.tabs.iter().find(|tab| tab.page.url == url) {
            debug!(tab = %tab.id, url, "reusing open tab");
            return Ok(tab.id);
        }
        self.open_tab(url).await
    }

    /// Always loads `url` into a new tab, even if another tab already shows it.
    pub async fn open_tab(&mut self, url: &str) -> Result<TabId, BrowserError> {
        let page = self.load(&Navigation::get(url)).await?;
        let id = TabId(self.next_id);
        self.next_id += 1;
        self.tabs.push(Tab { id, page });
        debug!(tab = %id, url, open_tabs = self.tabs.len(), "opened tab");
        Ok(id)
    }

    /// Simulate a click on a link of the tab's current document; the tab
    /// then shows whatever the click navigated to.
    pub async fn click(&mut self, tab: TabId, target: &ClickTarget) -> Result<(), BrowserError> {
        let navigation = resolve_click(self.page(tab)?, target)?;
        let page = self.load(&navigation).await?;
        let slot = self
            .tabs
            .iter_mut()
            .find(|t| t.id == tab)
            .ok_or(BrowserError::UnknownTab(tab))?;
        slot.page = page;
        Ok(())
    }

    pub fn page(&self, tab: TabId) -> Result<&PortalPage, BrowserError> {
        self.tabs
            .iter()
            .find(|t| t.id == tab)
            .map(|t| &t.page)
            .ok_or(BrowserError::UnknownTab(tab))
    }

    /// Returns false when the tab was not open.
    pub fn close_tab(&mut self, tab: TabId) -> bool {
        let before = self.tabs.len();
        self.tabs.retain(|t| t.id != tab);
        let closed = self.tabs.len() != before;
        if closed {
            debug!(tab = %tab, open_tabs = self.tabs.len(), "closed tab");
        }
        closed
    }

    pub fn open_tab_count(&self) -> usize {
        self.tabs.len()
    }

    async fn load(&self, navigation: &Navigation) -> Result<PortalPage, BrowserError> {
        let span = info_span!("portal_navigate", method = %navigation.method(), url = navigation.url());
        self.browser.navigate(navigation).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::REPORT_LINK_TITLE;

    #[derive(Default)]
    struct CountingBrowser {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PortalBrowser for CountingBrowser {
        async fn navigate(&self, navigation: &Navigation) -> Result<PortalPage, BrowserError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let html = match navigation {
                Navigation::Get { .. } => {
                    r#"<table><tr><td>6360/2</td><td><a href="/report?id=6360" title="Relatório da Estrutura Curricular">r</a></td></tr></table>"#
                }
                Navigation::SubmitForm { .. } => "<html></html>",
            };
            Ok(PortalPage {
                url: navigation.url().to_string(),
                html: html.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn acquire_page_reuses_a_tab_on_the_same_url() {
        let browser = Arc::new(CountingBrowser::default());
        let mut session = BrowserSession::new(browser.clone());

        let first = session.acquire_page("https://portal/a").await.unwrap();
        let again = session.acquire_page("https://portal/a").await.unwrap();
        let other = session.acquire_page("https://portal/b").await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(session.open_tab_count(), 2);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn open_tab_never_reuses() {
        let browser = Arc::new(CountingBrowser::default());
        let mut session = BrowserSession::new(browser.clone());

        let a = session.open_tab("https://portal/a").await.unwrap();
        let b = session.open_tab("https://portal/a").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(session.open_tab_count(), 2);

        assert!(session.close_tab(a));
        assert!(!session.close_tab(a));
        assert_eq!(session.open_tab_count(), 1);
        assert!(matches!(session.page(a), Err(BrowserError::UnknownTab(_))));
    }

    #[tokio::test]
    async fn click_navigates_the_tab_in_place() {
        let browser = Arc::new(CountingBrowser::default());
        let mut session = BrowserSession::new(browser.clone());

        let tab = session.open_tab("https://portal/curso/curriculo.jsf").await.unwrap();
        let target = ClickTarget::in_row("6360/2", REPORT_LINK_TITLE);
        session.click(tab, &target).await.unwrap();

        assert_eq!(session.page(tab).unwrap().url, "https://portal/report?id=6360");
        assert_eq!(session.open_tab_count(), 1);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 2);
    }
}

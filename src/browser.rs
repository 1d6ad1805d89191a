use std::time::{Duration, Instant};

use async_trait::async_trait;
use thirtyfour::components::SelectElement;
use thirtyfour::error::{WebDriverError, WebDriverErrorInner};
use thirtyfour::{By, DesiredCapabilities, WebDriver, WebElement};

use crate::error::{Result, VtopError};

const VISIBILITY_POLL_INTERVAL: Duration = Duration::from_millis(250);

// `WebDriverError` wraps the actual error enum behind a `Deref`.
fn is_no_such_element(error: &WebDriverError) -> bool {
    matches!(&**error, WebDriverErrorInner::NoSuchElement(_))
}

/// One browser page, as seen by the login controller and the scraping
/// orchestrators. Implemented by [`WebDriverPage`] for real runs and by
/// mocks in tests.
///
/// `wait_visible` is an explicit probe: `Ok(false)` means the element never
/// became visible within the bound, which callers treat as a normal branch.
/// Transport failures stay errors, so expected absence and broken sessions
/// are never conflated.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;
    /// Clears the field and types the given text.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;
    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>>;
    /// Text content of the first match, or `None` if nothing matches.
    async fn text(&self, selector: &str) -> Result<Option<String>>;
    async fn inner_html(&self, selector: &str) -> Result<String>;
    async fn select_value(&self, selector: &str, value: &str) -> Result<()>;
    async fn count(&self, selector: &str) -> Result<usize>;
    async fn nth_text(&self, selector: &str, index: usize) -> Result<Option<String>>;
    async fn nth_click(&self, selector: &str, index: usize) -> Result<()>;
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<bool>;
    async fn current_url(&self) -> Result<String>;
    /// Must be idempotent; a second call is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Authenticated browser context. Owned exclusively by the orchestrator that
/// created it and closed exactly once, on success or on fatal failure.
pub struct Session {
    page: Box<dyn Page>,
}

impl Session {
    pub fn new(page: Box<dyn Page>) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &dyn Page {
        self.page.as_ref()
    }

    pub async fn close(&mut self) -> Result<()> {
        self.page.close().await
    }
}

/// [`Page`] implementation backed by a remote WebDriver (chromedriver,
/// selenium, etc.).
pub struct WebDriverPage {
    driver: Option<WebDriver>,
}

impl WebDriverPage {
    pub async fn connect(server_url: &str) -> Result<Self> {
        let caps = DesiredCapabilities::chrome();
        let driver = WebDriver::new(server_url, caps).await?;
        Ok(Self {
            driver: Some(driver),
        })
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver.as_ref().ok_or(VtopError::SessionClosed)
    }

    async fn find(&self, selector: &str) -> Result<WebElement> {
        self.driver()?
            .find(By::Css(selector))
            .await
            .map_err(|e| {
                if is_no_such_element(&e) {
                    VtopError::ElementNotFound(selector.to_string())
                } else {
                    e.into()
                }
            })
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.driver()?.goto(url).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.find(selector).await?.click().await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.find(selector).await?;
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>> {
        Ok(self.find(selector).await?.attr(name).await?)
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        match self.driver()?.find(By::Css(selector)).await {
            Ok(element) => Ok(Some(element.text().await?)),
            Err(e) if is_no_such_element(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn inner_html(&self, selector: &str) -> Result<String> {
        Ok(self.find(selector).await?.inner_html().await?)
    }

    async fn select_value(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.find(selector).await?;
        let select = SelectElement::new(&element).await?;
        select.select_by_value(value).await?;
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(self.driver()?.find_all(By::Css(selector)).await?.len())
    }

    async fn nth_text(&self, selector: &str, index: usize) -> Result<Option<String>> {
        let elements = self.driver()?.find_all(By::Css(selector)).await?;
        match elements.get(index) {
            Some(element) => Ok(Some(element.text().await?)),
            None => Ok(None),
        }
    }

    async fn nth_click(&self, selector: &str, index: usize) -> Result<()> {
        let elements = self.driver()?.find_all(By::Css(selector)).await?;
        let element = elements.get(index).ok_or_else(|| {
            VtopError::ElementNotFound(format!("{selector} (index {index})"))
        })?;
        element.click().await?;
        Ok(())
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.driver()?.find(By::Css(selector)).await {
                Ok(element) => {
                    if element.is_displayed().await.unwrap_or(false) {
                        return Ok(true);
                    }
                }
                Err(e) if is_no_such_element(&e) => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(VISIBILITY_POLL_INTERVAL).await;
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.driver()?.current_url().await?.to_string())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await?;
        }
        Ok(())
    }
}

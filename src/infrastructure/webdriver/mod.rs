//! W3C WebDriver access for driving the portal in Chrome.
//!
//! [`BrowserSession`] is the seam the export use case depends on;
//! [`WebDriverClient`] implements it over HTTP against chromedriver, and
//! tests implement it in memory. The wait helpers here are the only way the
//! use case synchronises with the page.

mod capabilities;
mod client;
mod driver_process;

pub use capabilities::ChromeLaunchOptions;
pub use client::WebDriverClient;
pub use driver_process::ChromeDriverProcess;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::shared::wait::poll_until;

/// Opaque WebDriver element reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// How an element is found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `name` attribute.
    Name(String),
    /// Exact visible text, compared with whitespace normalised.
    ExactText(String),
}

impl Locator {
    pub fn name(name: &str) -> Self {
        Locator::Name(name.to_string())
    }

    pub fn exact_text(text: &str) -> Self {
        Locator::ExactText(text.to_string())
    }

    /// WebDriver `using` strategy and selector value.
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Name(name) => (
                "css selector",
                format!("[name=\"{}\"]", name.replace('\\', "\\\\").replace('"', "\\\"")),
            ),
            Locator::ExactText(text) => (
                "xpath",
                format!(
                    "//*[text()[normalize-space(.)={}]]",
                    xpath_literal(&normalize_space(text))
                ),
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Name(name) => write!(f, "[name={}]", name),
            Locator::ExactText(text) => write!(f, "text {:?}", text),
        }
    }
}

fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Quotes `text` as an XPath 1.0 string literal. XPath has no escapes, so
/// text holding both quote kinds is spliced together with `concat()`.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    /// `Ok(None)` when nothing matches yet.
    async fn find(&self, locator: &Locator) -> Result<Option<ElementRef>>;
    /// `Ok(false)` for elements that went stale.
    async fn is_displayed(&self, element: &ElementRef) -> Result<bool>;
    async fn is_enabled(&self, element: &ElementRef) -> Result<bool>;
    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()>;
    async fn click(&self, element: &ElementRef) -> Result<()>;
    async fn set_window_size(&self, width: u32, height: u32) -> Result<()>;
    /// `document.readyState`.
    async fn ready_state(&self) -> Result<String>;
    async fn quit(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementCondition {
    Present,
    Visible,
    Clickable,
}

/// Bounded waits used by the export use case.
#[derive(Debug, Clone, Copy)]
pub struct Waits {
    pub element: Duration,
    pub redirect: Duration,
    pub page_ready: Duration,
    pub interval: Duration,
}

pub async fn wait_for_element(
    session: &dyn BrowserSession,
    locator: &Locator,
    condition: ElementCondition,
    timeout: Duration,
    interval: Duration,
) -> Result<ElementRef> {
    poll_until(
        &format!("waiting for {} to be {:?}", locator, condition),
        timeout,
        interval,
        || async move {
            let Some(element) = session.find(locator).await? else {
                return Ok(None);
            };
            let ready = match condition {
                ElementCondition::Present => true,
                ElementCondition::Visible => session.is_displayed(&element).await?,
                ElementCondition::Clickable => {
                    session.is_displayed(&element).await? && session.is_enabled(&element).await?
                }
            };
            Ok(ready.then_some(element))
        },
    )
    .await
}

/// Waits for the address to move away from `from` and returns the new one.
pub async fn wait_for_url_change(
    session: &dyn BrowserSession,
    from: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<String> {
    poll_until(
        &format!("waiting to be redirected away from {}", from),
        timeout,
        interval,
        || async move {
            let current = session.current_url().await?;
            Ok((current != from).then_some(current))
        },
    )
    .await
}

pub async fn wait_for_document_ready(
    session: &dyn BrowserSession,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    poll_until("waiting for document ready", timeout, interval, || async move {
        Ok((session.ready_state().await? == "complete").then_some(()))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_locator() {
        let (using, value) = Locator::name("email").strategy();
        assert_eq!(using, "css selector");
        assert_eq!(value, "[name=\"email\"]");
    }

    #[test]
    fn test_exact_text_locator_normalises() {
        let (using, value) = Locator::exact_text(" CSV ").strategy();
        assert_eq!(using, "xpath");
        assert_eq!(value, "//*[text()[normalize-space(.)='CSV']]");
    }

    #[test]
    fn test_xpath_literal_quotes() {
        assert_eq!(xpath_literal("Export"), "'Export'");
        assert_eq!(xpath_literal("Coach's Report"), "\"Coach's Report\"");
        assert_eq!(
            xpath_literal("say \"it's\""),
            "concat('say \"it', \"'\", 's\"')"
        );
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::name("password").to_string(), "[name=password]");
        assert_eq!(Locator::exact_text("Export").to_string(), "text \"Export\"");
    }
}

use bridge_core::PROVIDER_BOOTSTRAP;
use serde::Serialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TabError {
    #[error("invalid url {input:?}: {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },
    #[error("url has no web origin: {0}")]
    OpaqueOrigin(String),
}

/// The single browser tab hosting third-party pages.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserTab {
    current_url: String,
    origin: String,
    /// Bumped on every reload; the web surface is re-created when it changes.
    reload_key: u64,
}

impl BrowserTab {
    pub fn new(home_url: &str) -> Result<Self, TabError> {
        let url = normalize_url(home_url)?;
        let origin = web_origin(&url)?;
        Ok(Self {
            current_url: url.to_string(),
            origin,
            reload_key: 0,
        })
    }

    /// Navigates to whatever the user typed into the URL bar.
    pub fn navigate(&mut self, input: &str) -> Result<&str, TabError> {
        let url = normalize_url(input)?;
        self.origin = web_origin(&url)?;
        self.current_url = url.to_string();
        Ok(&self.current_url)
    }

    pub fn reload(&mut self) -> u64 {
        self.reload_key = self.reload_key.wrapping_add(1);
        self.reload_key
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    /// Origin string attached to approval requests raised by this page.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn reload_key(&self) -> u64 {
        self.reload_key
    }

    /// Script evaluated before the page's own scripts.
    pub fn bootstrap_script(&self) -> &'static str {
        PROVIDER_BOOTSTRAP
    }
}

/// Prefixes `https://` unless the input already names http or https.
pub fn normalize_url(input: &str) -> Result<Url, TabError> {
    let trimmed = input.trim();
    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    Url::parse(&candidate).map_err(|source| TabError::InvalidUrl {
        input: input.to_string(),
        source,
    })
}

fn web_origin(url: &Url) -> Result<String, TabError> {
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(TabError::OpaqueOrigin(url.to_string()));
    }
    Ok(origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_https_scheme() {
        assert_eq!(normalize_url("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(
            normalize_url("http://example.com/a?b=c").unwrap().as_str(),
            "http://example.com/a?b=c"
        );
        assert!(normalize_url("exa mple.com").is_err());
    }

    #[test]
    fn tracks_origin_across_navigation() {
        let mut tab = BrowserTab::new("https://google.com").unwrap();
        assert_eq!(tab.origin(), "https://google.com");

        tab.navigate("dapp.example:8443/swap").unwrap();
        assert_eq!(tab.current_url(), "https://dapp.example:8443/swap");
        assert_eq!(tab.origin(), "https://dapp.example:8443");
    }

    #[test]
    fn failed_navigation_keeps_current_page() {
        let mut tab = BrowserTab::new("https://google.com").unwrap();
        assert!(tab.navigate("http://[::1").is_err());
        assert_eq!(tab.current_url(), "https://google.com/");
    }

    #[test]
    fn reload_bumps_key() {
        let mut tab = BrowserTab::new("google.com").unwrap();
        assert_eq!(tab.reload(), 1);
        assert_eq!(tab.reload(), 2);
        assert!(tab.bootstrap_script().contains("window.paca"));
    }
}

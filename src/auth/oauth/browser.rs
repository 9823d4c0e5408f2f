use url::Url;

/// Hands the authorization URL to the user's browser.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &Url) -> std::io::Result<()>;
}

/// Opens the system default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &Url) -> std::io::Result<()> {
        open::that(url.as_str())
    }
}

/// Never opens anything; the caller shows the URL instead (`--no-browser`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualBrowser;

impl BrowserLauncher for ManualBrowser {
    fn open(&self, _url: &Url) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "automatic browser launch disabled",
        ))
    }
}

//! Device detection, install pages and mobile deep links.
//!
//! On mobile browsers wallet extensions do not exist; the wallet app is
//! opened through its URI scheme instead, with the app store as fallback.
//! Opening a URL is a host concern and goes through the [`Launcher`] trait.

use crate::chain::WalletType;

/// Operating system family relevant to wallet launching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Os {
    /// iPhone, iPad or iPod.
    Ios,
    /// Android phones and tablets.
    Android,
    /// Anything else.
    #[default]
    Desktop,
}

/// What the connection manager knows about the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Operating system family.
    pub os: Os,
}

impl DeviceInfo {
    /// Classifies a browser user-agent string.
    #[must_use]
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        let os = if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
            Os::Ios
        } else if ua.contains("android") {
            Os::Android
        } else {
            Os::Desktop
        };
        Self { os }
    }

    /// A desktop device.
    #[must_use]
    pub const fn desktop() -> Self {
        Self { os: Os::Desktop }
    }

    /// Returns `true` on iOS and Android.
    #[must_use]
    pub const fn is_mobile(&self) -> bool {
        matches!(self.os, Os::Ios | Os::Android)
    }
}

/// Error returned by a [`Launcher`] that could not open a URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to open {url}: {reason}")]
pub struct LaunchError {
    /// The URL that was being opened.
    pub url: String,
    /// Host-specific reason.
    pub reason: String,
}

/// Opens URLs on behalf of the connection manager.
///
/// In a browser this assigns `window.location.href` or opens a tab.
pub trait Launcher: Send + Sync {
    /// Opens `url`.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] if the host could not hand the URL off.
    fn open(&self, url: &str) -> Result<(), LaunchError>;
}

/// A launcher that only logs the URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLauncher;

impl Launcher for LogLauncher {
    fn open(&self, _url: &str) -> Result<(), LaunchError> {
        #[cfg(feature = "telemetry")]
        tracing::info!(url = _url, "Open URL");
        Ok(())
    }
}

/// Download page for a wallet.
#[must_use]
pub const fn install_url(wallet_type: WalletType) -> &'static str {
    match wallet_type {
        WalletType::Phantom | WalletType::PhantomEthereum => "https://phantom.app/download",
        WalletType::Solflare => "https://solflare.com/download",
        WalletType::Metamask => "https://metamask.io/download/",
        WalletType::Walletconnect => "https://walletconnect.network/",
    }
}

/// URI that opens `dapp_url` inside the wallet's mobile browser.
///
/// Returns `None` for wallets without deep-link support or when the dapp URL
/// has no host.
#[must_use]
pub fn deep_link(wallet_type: WalletType, dapp_url: &str) -> Option<String> {
    if !wallet_type.supports_deep_link() {
        return None;
    }
    let host = host_of(dapp_url)?;
    Some(format!("metamask://dapp/{host}"))
}

/// App-store listing for a wallet on the given platform.
#[must_use]
pub const fn app_store_url(wallet_type: WalletType, os: Os) -> Option<&'static str> {
    match (wallet_type, os) {
        (WalletType::Metamask, Os::Ios) => Some("https://apps.apple.com/app/metamask/id1438144202"),
        (WalletType::Metamask, Os::Android) => {
            Some("https://play.google.com/store/apps/details?id=io.metamask")
        }
        _ => None,
    }
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest.split(['/', '?', '#']).next()?;
    (!host.is_empty()).then_some(host)
}

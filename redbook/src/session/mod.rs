//! Session state classification.
//!
//! The classifier is a pure function over [`PageSignals`]; the signals are
//! gathered from the live page by one script (see [`probe`]). Nothing here
//! is cached: every query re-reads the page.

mod probe;

pub use probe::{probe, signals_script, SIGNALS_TAG};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SessionMarkers;

/// Authentication status of the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The page shows content or the creator surface.
    Authenticated,
    /// The page shows the login wall.
    AuthenticationRequired,
    /// Neither could be told apart yet.
    Unknown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticated => write!(f, "authenticated"),
            Self::AuthenticationRequired => write!(f, "authentication_required"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Observable page facts the classifier decides on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSignals {
    /// Current page address.
    pub address: String,
    /// `document.title`.
    pub document_title: String,
    /// Whether the body text contains a login prompt.
    pub body_has_login_prompt: bool,
    /// Whether a login-only element is present.
    pub has_login_element: bool,
    /// Text of the first non-empty title element, if any.
    pub title_text: Option<String>,
    /// Whether the embedded initial state is defined.
    pub has_state_blob: bool,
}

impl PageSignals {
    /// Signals of a page at `address` with nothing else known.
    #[must_use]
    pub fn at(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

/// Classifies pages against a set of [`SessionMarkers`].
#[derive(Debug, Clone, Default)]
pub struct SessionClassifier {
    markers: SessionMarkers,
}

impl SessionClassifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new(markers: SessionMarkers) -> Self {
        Self { markers }
    }

    /// Returns the markers.
    #[must_use]
    pub fn markers(&self) -> &SessionMarkers {
        &self.markers
    }

    /// Classifies a page.
    ///
    /// Any login indicator wins over content indicators, so a login wall
    /// laid over a rendered note still reads as `AuthenticationRequired`.
    #[must_use]
    pub fn classify(&self, signals: &PageSignals) -> SessionState {
        if self.requires_login(signals) {
            SessionState::AuthenticationRequired
        } else if self.has_valid_title(signals)
            || signals.has_state_blob
            || self.on_publish_page(&signals.address)
        {
            SessionState::Authenticated
        } else {
            SessionState::Unknown
        }
    }

    /// Whether the page carries any login-wall indicator.
    #[must_use]
    pub fn requires_login(&self, signals: &PageSignals) -> bool {
        self.on_login_page(&signals.address)
            || signals.has_login_element
            || signals.body_has_login_prompt
            || (!self.markers.login_title_marker.is_empty()
                && signals.document_title.contains(&self.markers.login_title_marker))
    }

    /// Whether a title element holds real content rather than a login
    /// prompt.
    #[must_use]
    pub fn has_valid_title(&self, signals: &PageSignals) -> bool {
        signals.title_text.as_deref().is_some_and(|title| {
            let title = title.trim();
            !title.is_empty()
                && !self
                    .markers
                    .login_prompt_texts
                    .iter()
                    .any(|prompt| title.contains(prompt.as_str()))
        })
    }

    /// Whether the address is the login page.
    #[must_use]
    pub fn on_login_page(&self, address: &str) -> bool {
        address.contains(&self.markers.login_path_segment)
    }

    /// Whether the address is the publish page and not the login page.
    #[must_use]
    pub fn on_publish_page(&self, address: &str) -> bool {
        address.contains(&self.markers.publish_path_segment) && !self.on_login_page(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> SessionClassifier {
        SessionClassifier::new(SessionMarkers::default())
    }

    #[test]
    fn test_login_address_requires_auth() {
        let signals = PageSignals::at("https://www.xiaohongshu.com/login?redirect=x");
        assert_eq!(
            classifier().classify(&signals),
            SessionState::AuthenticationRequired
        );
    }

    #[test]
    fn test_login_indicator_beats_title() {
        let signals = PageSignals {
            address: "https://www.xiaohongshu.com/explore/abc".to_string(),
            body_has_login_prompt: true,
            title_text: Some("Spring outfits".to_string()),
            ..PageSignals::default()
        };
        assert_eq!(
            classifier().classify(&signals),
            SessionState::AuthenticationRequired
        );
    }

    #[test]
    fn test_document_title_marker() {
        let signals = PageSignals {
            address: "https://www.xiaohongshu.com/explore/abc".to_string(),
            document_title: "小红书 - 登录".to_string(),
            ..PageSignals::default()
        };
        assert_eq!(
            classifier().classify(&signals),
            SessionState::AuthenticationRequired
        );
    }

    #[test]
    fn test_login_element() {
        let signals = PageSignals {
            has_login_element: true,
            ..PageSignals::at("https://creator.xiaohongshu.com/publish/publish")
        };
        assert_eq!(
            classifier().classify(&signals),
            SessionState::AuthenticationRequired
        );
    }

    #[test]
    fn test_authenticated_indicators() {
        let c = classifier();
        let titled = PageSignals {
            title_text: Some("  Spring outfits ".to_string()),
            ..PageSignals::at("https://www.xiaohongshu.com/explore/abc")
        };
        assert_eq!(c.classify(&titled), SessionState::Authenticated);

        let with_state = PageSignals {
            has_state_blob: true,
            ..PageSignals::at("https://www.xiaohongshu.com/explore/abc")
        };
        assert_eq!(c.classify(&with_state), SessionState::Authenticated);

        let publish = PageSignals::at("https://creator.xiaohongshu.com/publish/publish");
        assert_eq!(c.classify(&publish), SessionState::Authenticated);
    }

    #[test]
    fn test_unknown_when_nothing_seen() {
        let signals = PageSignals {
            title_text: Some("   ".to_string()),
            ..PageSignals::at("https://www.xiaohongshu.com/explore/abc")
        };
        assert_eq!(classifier().classify(&signals), SessionState::Unknown);
        assert_eq!(
            classifier().classify(&PageSignals::default()),
            SessionState::Unknown
        );
    }

    #[test]
    fn test_prompt_as_title_is_not_valid() {
        let signals = PageSignals {
            title_text: Some("手机号登录".to_string()),
            ..PageSignals::default()
        };
        assert!(!classifier().has_valid_title(&signals));
    }

    #[test]
    fn test_publish_page_excludes_login() {
        let c = classifier();
        assert!(c.on_publish_page("https://creator.xiaohongshu.com/publish/publish"));
        assert!(!c.on_publish_page(
            "https://creator.xiaohongshu.com/login?redirect=/publish/publish"
        ));
    }

    #[test]
    fn test_signals_deserialize_from_script_shape() {
        let signals: PageSignals = serde_json::from_value(serde_json::json!({
            "address": "https://www.xiaohongshu.com/explore/abc",
            "documentTitle": "Note",
            "hasStateBlob": true,
            "titleText": null
        }))
        .unwrap();
        assert!(signals.has_state_blob);
        assert!(signals.title_text.is_none());
        assert!(!signals.body_has_login_prompt);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            SessionState::AuthenticationRequired.to_string(),
            "authentication_required"
        );
    }
}

//! Page signal probe.

use serde_json::json;
use tracing::debug;

use super::PageSignals;
use crate::config::SessionMarkers;
use crate::driver::{evaluate_as, Driver};

/// Marker comment heading the signals script.
pub const SIGNALS_TAG: &str = "/*redbook:signals*/";

/// Builds the script that gathers [`PageSignals`] in one evaluation.
#[must_use]
pub fn signals_script(markers: &SessionMarkers) -> String {
    let config = json!({
        "loginPrompts": markers.login_prompt_texts,
        "loginSelectors": markers.login_selectors,
        "titleSelectors": markers.title_selectors,
        "stateGlobal": markers.state_global,
    });
    format!(
        r"{SIGNALS_TAG}(() => {{
  const m = {config};
  const query = (sel) => {{ try {{ return document.querySelector(sel); }} catch (e) {{ return null; }} }};
  const body = (document.body && document.body.innerText) || '';
  let titleText = null;
  for (const sel of m.titleSelectors) {{
    const el = query(sel);
    if (el && el.innerText && el.innerText.trim().length > 0) {{ titleText = el.innerText.trim(); break; }}
  }}
  const state = window[m.stateGlobal];
  return {{
    address: location.href,
    documentTitle: document.title || '',
    bodyHasLoginPrompt: m.loginPrompts.some((t) => body.includes(t)),
    hasLoginElement: m.loginSelectors.some((sel) => !!query(sel)),
    titleText,
    hasStateBlob: state !== undefined && state !== null,
  }};
}})()"
    )
}

/// Gathers signals from the live page.
///
/// A failed probe degrades to signals carrying only the address (or nothing),
/// which classify as `Unknown` unless the address itself is telling.
pub async fn probe<D: Driver + ?Sized>(driver: &D, markers: &SessionMarkers) -> PageSignals {
    match evaluate_as::<PageSignals, D>(driver, &signals_script(markers)).await {
        Ok(signals) => signals,
        Err(e) => {
            debug!(error = %e, "Signal probe failed");
            driver
                .current_address()
                .await
                .map(PageSignals::at)
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{publish_signals, ScriptedDriver, LOGIN_ADDRESS};

    #[test]
    fn test_script_embeds_markers_as_json() {
        let markers = SessionMarkers {
            login_prompt_texts: vec!["it's \"login\"".to_string()],
            ..SessionMarkers::default()
        };
        let script = signals_script(&markers);
        assert!(script.starts_with(SIGNALS_TAG));
        assert!(script.contains(r#""it's \"login\"""#));
        assert!(script.contains("\"__INITIAL_STATE__\""));
    }

    #[test]
    fn test_probe_reads_signals() {
        let driver = ScriptedDriver::new();
        driver.set_signals(&publish_signals());
        let signals = tokio_test::block_on(probe(&driver, &SessionMarkers::default()));
        assert_eq!(signals, publish_signals());
    }

    #[test]
    fn test_failed_probe_keeps_address() {
        let driver = ScriptedDriver::new();
        driver.set_address(LOGIN_ADDRESS);
        let signals = tokio_test::block_on(probe(&driver, &SessionMarkers::default()));
        assert_eq!(signals, PageSignals::at(LOGIN_ADDRESS));
    }
}

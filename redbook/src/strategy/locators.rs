//! Element locator strategies run against a live page.
//!
//! Each strategy is one page script. A script returns a short description of
//! what it acted on, or `null` when nothing matched. All values spliced into
//! scripts go through JSON encoding.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::chain::Strategy;
use crate::driver::Driver;

/// Builds the marker comment that heads a script.
///
/// Markers make scripts recognisable in logs and in scripted test drivers.
#[must_use]
pub fn script_tag(name: &str) -> String {
    format!("/*redbook:{name}*/")
}

/// Builds a predicate that holds when any of `selectors` matches.
#[must_use]
pub fn any_present_script(name: &str, selectors: &[String]) -> String {
    format!(
        "{}(() => {{ const s = {}; return s.some((sel) => {{ try {{ return !!document.querySelector(sel); }} catch (e) {{ return false; }} }}); }})()",
        script_tag(name),
        json!(selectors)
    )
}

async fn run_locator_script<D: Driver + ?Sized>(
    driver: &D,
    script: &str,
) -> Option<Result<String, String>> {
    match driver.evaluate(script).await {
        Ok(Value::Null | Value::Bool(false)) => None,
        Ok(Value::String(found)) => Some(Ok(found)),
        Ok(other) => Some(Err(format!("unexpected script result: {other}"))),
        Err(e) => Some(Err(e.to_string())),
    }
}

/// Shared helpers prepended to every click script.
const DOM_HELPERS: &str = "const visible = (el) => !!(el.offsetParent || el.getClientRects().length);\n  \
     const all = (sel) => { try { return Array.from(document.querySelectorAll(sel)); } catch (e) { return []; } };";

/// Clicks the element whose visible text matches one of several labels.
#[derive(Debug, Clone)]
pub struct TextClick {
    name: String,
    scope: String,
    texts: Vec<String>,
    exact: bool,
}

impl TextClick {
    /// Matches elements whose trimmed text equals a label.
    pub fn exact(name: impl Into<String>, scope: impl Into<String>, texts: &[String]) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            texts: texts.to_vec(),
            exact: true,
        }
    }

    /// Matches elements whose text contains a label; the innermost match
    /// (shortest text) is clicked.
    pub fn containing(
        name: impl Into<String>,
        scope: impl Into<String>,
        texts: &[String],
    ) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            texts: texts.to_vec(),
            exact: false,
        }
    }

    /// Builds the click script.
    #[must_use]
    pub fn script(&self) -> String {
        format!(
            "{tag}(() => {{
  {DOM_HELPERS}
  const texts = {texts};
  const exact = {exact};
  const candidates = all({scope}).filter(visible);
  for (const text of texts) {{
    const hits = candidates.filter((el) => {{
      const t = (el.innerText || '').trim();
      return exact ? t === text : t.includes(text);
    }});
    if (hits.length === 0) continue;
    if (!exact) hits.sort((a, b) => (a.innerText || '').length - (b.innerText || '').length);
    hits[0].click();
    return text;
  }}
  return null;
}})()",
            tag = script_tag(&self.name),
            texts = json!(self.texts),
            exact = self.exact,
            scope = json!(self.scope),
        )
    }
}

#[async_trait]
impl<D: Driver + ?Sized> Strategy<D, String> for TextClick {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, driver: &D) -> Option<Result<String, String>> {
        if self.texts.is_empty() {
            return None;
        }
        run_locator_script(driver, &self.script()).await
    }
}

/// Clicks the n-th element matching a selector.
#[derive(Debug, Clone)]
pub struct NthClick {
    name: String,
    selector: String,
    index: usize,
}

impl NthClick {
    /// Creates the strategy; `index` is zero-based.
    pub fn new(name: impl Into<String>, selector: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            index,
        }
    }

    /// Builds the click script.
    #[must_use]
    pub fn script(&self) -> String {
        format!(
            "{tag}(() => {{
  {DOM_HELPERS}
  const sel = {selector};
  const el = all(sel)[{index}];
  if (!el) return null;
  el.click();
  return sel + '[' + {index} + ']';
}})()",
            tag = script_tag(&self.name),
            selector = json!(self.selector),
            index = self.index,
        )
    }
}

#[async_trait]
impl<D: Driver + ?Sized> Strategy<D, String> for NthClick {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, driver: &D) -> Option<Result<String, String>> {
        run_locator_script(driver, &self.script()).await
    }
}

/// Clicks the first element matched by an ordered list of selectors.
#[derive(Debug, Clone)]
pub struct SelectorClick {
    name: String,
    selectors: Vec<String>,
}

impl SelectorClick {
    /// Creates the strategy.
    pub fn new(name: impl Into<String>, selectors: &[String]) -> Self {
        Self {
            name: name.into(),
            selectors: selectors.to_vec(),
        }
    }

    /// Builds the click script.
    #[must_use]
    pub fn script(&self) -> String {
        format!(
            "{tag}(() => {{
  {DOM_HELPERS}
  for (const sel of {selectors}) {{
    const el = all(sel)[0];
    if (!el) continue;
    el.click();
    return sel;
  }}
  return null;
}})()",
            tag = script_tag(&self.name),
            selectors = json!(self.selectors),
        )
    }
}

#[async_trait]
impl<D: Driver + ?Sized> Strategy<D, String> for SelectorClick {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, driver: &D) -> Option<Result<String, String>> {
        if self.selectors.is_empty() {
            return None;
        }
        run_locator_script(driver, &self.script()).await
    }
}

/// Kind of form control a [`FillField`] writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A text `<input>` or `<textarea>`: value setter plus events.
    Input,
    /// A rich-text editor: `<textarea>` or contenteditable element.
    Editor,
}

/// Overwrites the first matching form field with a value.
///
/// Existing content is selected and replaced, and `input`/`change` events
/// are dispatched so framework-bound forms pick the value up.
#[derive(Debug, Clone)]
pub struct FillField {
    name: String,
    selectors: Vec<String>,
    value: String,
    kind: FieldKind,
}

impl FillField {
    /// Fills a plain input.
    pub fn input(name: impl Into<String>, selectors: &[String], value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selectors: selectors.to_vec(),
            value: value.into(),
            kind: FieldKind::Input,
        }
    }

    /// Fills a rich-text editor.
    pub fn editor(name: impl Into<String>, selectors: &[String], value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selectors: selectors.to_vec(),
            value: value.into(),
            kind: FieldKind::Editor,
        }
    }

    /// Builds the fill script.
    #[must_use]
    pub fn script(&self) -> String {
        format!(
            "{tag}(() => {{
  {DOM_HELPERS}
  const value = {value};
  const editor = {editor};
  const fire = (el) => {{
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  }};
  for (const sel of {selectors}) {{
    const el = all(sel)[0];
    if (!el) continue;
    el.focus();
    const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
      : el instanceof HTMLInputElement ? HTMLInputElement.prototype : null;
    if (proto) {{
      if (typeof el.select === 'function') el.select();
      Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
    }} else if (editor || el.isContentEditable) {{
      document.execCommand('selectAll', false, null);
      if (!document.execCommand('insertText', false, value)) el.innerText = value;
    }} else {{
      continue;
    }}
    fire(el);
    return sel;
  }}
  return null;
}})()",
            tag = script_tag(&self.name),
            value = json!(self.value),
            editor = self.kind == FieldKind::Editor,
            selectors = json!(self.selectors),
        )
    }
}

#[async_trait]
impl<D: Driver + ?Sized> Strategy<D, String> for FillField {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, driver: &D) -> Option<Result<String, String>> {
        if self.selectors.is_empty() {
            return None;
        }
        run_locator_script(driver, &self.script()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDriver;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_scripts_carry_tag_and_escaped_values() {
        let fill = FillField::input("title-field", &labels(&["input.d-text"]), "say \"hi\"</script>");
        let script = fill.script();
        assert!(script.starts_with("/*redbook:title-field*/"));
        assert!(script.contains(r#""say \"hi\"</script>""#));

        let click = TextClick::exact("tab-label", "div, span", &labels(&["图文"]));
        assert!(click.script().contains(r#"["图文"]"#));
        assert!(click.script().contains("const exact = true;"));
    }

    #[test]
    fn test_any_present_script() {
        let script = any_present_script("thumbnails", &labels(&[".preview-item"]));
        assert!(script.starts_with(&script_tag("thumbnails")));
        assert!(script.contains(r#"[".preview-item"]"#));
    }

    #[tokio::test]
    async fn test_locator_results() {
        let scripted = ScriptedDriver::new();
        let driver: &dyn Driver = &scripted;
        scripted.respond(&script_tag("hit"), json!(".upload-container"));
        scripted.respond(&script_tag("miss"), Value::Null);
        scripted.respond(&script_tag("odd"), json!(42));

        let hit = SelectorClick::new("hit", &labels(&[".upload-container"]));
        assert_eq!(
            hit.attempt(driver).await,
            Some(Ok(".upload-container".to_string()))
        );

        let miss = SelectorClick::new("miss", &labels(&[".upload-container"]));
        assert_eq!(miss.attempt(driver).await, None);

        let odd = NthClick::new("odd", "[role=tab]", 1);
        assert!(matches!(odd.attempt(driver).await, Some(Err(_))));

        // No scripted response: the driver reports a script error.
        let broken = TextClick::containing("broken", "div", &labels(&["点击上传"]));
        assert!(matches!(broken.attempt(driver).await, Some(Err(_))));

        let empty = TextClick::containing("empty", "div", &[]);
        assert_eq!(empty.attempt(driver).await, None);
    }
}

//! Rendered-DOM acquisition.
//!
//! The live page is read by one script into a [`DomSnapshot`]. When the
//! script fails the same snapshot is rebuilt from the static markup, where
//! computed styles and layout sizes are unavailable and inline `style`
//! and `width`/`height` attributes stand in for them.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::{ExtractionConfig, SessionMarkers};
use crate::strategy::{script_tag, FnStrategy, StrategyChain};

/// An image element as laid out on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageElement {
    /// Resolved source address.
    pub src: String,
    /// Rendered width in pixels.
    pub width: u32,
    /// Rendered height in pixels.
    pub height: u32,
}

/// Everything the DOM fallback reads from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomSnapshot {
    /// Text of the first title element.
    pub title: String,
    /// Text of the first description element.
    pub description: String,
    /// Tag texts with the leading `#` removed.
    pub tags: Vec<String>,
    /// `background-image` values of the carousel slides.
    pub slide_backgrounds: Vec<String>,
    /// Image elements inside the content containers.
    pub images: Vec<ImageElement>,
}

/// Selectors the DOM fallback reads.
#[derive(Debug, Clone)]
pub struct DomQuery {
    title_selectors: Vec<String>,
    description_selectors: Vec<String>,
    tag_selector: String,
    slide_selector: String,
    image_selector: String,
}

impl DomQuery {
    /// Builds the query from configuration.
    #[must_use]
    pub fn new(config: &ExtractionConfig, markers: &SessionMarkers) -> Self {
        Self {
            title_selectors: markers.title_selectors.clone(),
            description_selectors: config.description_selectors.clone(),
            tag_selector: config.tag_selectors.join(", "),
            slide_selector: config.slide_selector.clone(),
            image_selector: config.image_selectors.join(", "),
        }
    }

    /// Builds the page script producing a [`DomSnapshot`].
    #[must_use]
    pub fn script(&self) -> String {
        let q = json!({
            "title": self.title_selectors,
            "description": self.description_selectors,
            "tags": self.tag_selector,
            "slides": self.slide_selector,
            "images": self.image_selector,
        });
        format!(
            "{tag}(() => {{
  const q = {q};
  const all = (sel) => {{ try {{ return Array.from(document.querySelectorAll(sel)); }} catch (e) {{ return []; }} }};
  const first = (sels) => {{
    for (const sel of sels) {{ const el = all(sel)[0]; if (el) return el; }}
    return null;
  }};
  const text = (el) => (el && el.innerText ? el.innerText.trim() : '');
  const slideBackgrounds = all(q.slides).map((slide) => {{
    const target = slide.querySelector('span') || slide;
    return window.getComputedStyle(target).backgroundImage || '';
  }}).filter((bg) => bg && bg !== 'none');
  return {{
    title: text(first(q.title)),
    description: text(first(q.description)),
    tags: all(q.tags).map((el) => (el.innerText || '').replace('#', '').trim()).filter((t) => t.length > 0),
    slideBackgrounds,
    images: all(q.images).map((img) => ({{ src: img.src || '', width: img.width || 0, height: img.height || 0 }})),
  }};
}})()",
            tag = script_tag("dom-snapshot"),
        )
    }

    /// Rebuilds a snapshot from static markup.
    #[must_use]
    pub fn snapshot_from_markup(&self, markup: &str) -> DomSnapshot {
        let document = Html::parse_document(markup);

        let first_text = |selectors: &[String]| {
            selectors
                .iter()
                .filter_map(|sel| parse_selector(sel))
                .find_map(|sel| document.select(&sel).next())
                .map(|el| element_text(&el))
                .unwrap_or_default()
        };

        let tags = parse_selector(&self.tag_selector)
            .map(|sel| {
                document
                    .select(&sel)
                    .map(|el| element_text(&el).replacen('#', "", 1).trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let span = parse_selector("span");
        let slide_backgrounds = parse_selector(&self.slide_selector)
            .map(|sel| {
                document
                    .select(&sel)
                    .filter_map(|slide| {
                        let target = span
                            .as_ref()
                            .and_then(|span| slide.select(span).next())
                            .unwrap_or(slide);
                        inline_background(&target)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let images = parse_selector(&self.image_selector)
            .map(|sel| {
                document
                    .select(&sel)
                    .map(|img| ImageElement {
                        src: img.value().attr("src").unwrap_or_default().to_string(),
                        width: dimension_attr(&img, "width"),
                        height: dimension_attr(&img, "height"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        DomSnapshot {
            title: first_text(&self.title_selectors),
            description: first_text(&self.description_selectors),
            tags,
            slide_backgrounds,
            images,
        }
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!(selector, error = %e, "Skipping unparsable selector");
            None
        }
    }
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension_attr(el: &ElementRef<'_>, name: &str) -> u32 {
    el.value()
        .attr(name)
        .map(|v| v.trim().trim_end_matches("px"))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(0, |v| v.min(f64::from(u32::MAX)) as u32)
}

fn inline_background(el: &ElementRef<'_>) -> Option<String> {
    let style = el.value().attr("style")?;
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .find(|(prop, _)| {
            let prop = prop.trim();
            prop.eq_ignore_ascii_case("background-image") || prop.eq_ignore_ascii_case("background")
        })
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| value.contains("url("))
}

/// Extracts the address from a CSS `url(...)` value.
///
/// Quotes are stripped; `none` and values without `url(` yield `None`.
#[must_use]
pub fn parse_css_url(value: &str) -> Option<String> {
    let start = value.find("url(")? + "url(".len();
    let rest = &value[start..];
    let end = rest.find(')')?;
    let url = rest[..end].trim().replace(['"', '\''], "");
    (!url.is_empty()).then_some(url)
}

/// Whether an address can be fetched as is: absolute http(s) or
/// scheme-relative.
#[must_use]
pub fn is_fetchable(url: &str) -> bool {
    url.starts_with("http") || url.starts_with("//")
}

/// Image strategies over a snapshot, in order: carousel backgrounds, then
/// content images larger than `min_dimension` in either direction.
#[must_use]
pub fn image_chain(min_dimension: u32) -> StrategyChain<DomSnapshot, Vec<String>> {
    StrategyChain::new("dom-images")
        .with(FnStrategy::new("slide-backgrounds", |snapshot: &DomSnapshot| {
            let urls: Vec<String> = snapshot
                .slide_backgrounds
                .iter()
                .filter_map(|bg| parse_css_url(bg))
                .filter(|url| is_fetchable(url))
                .collect();
            (!urls.is_empty()).then_some(Ok::<_, String>(urls))
        }))
        .with(FnStrategy::new("sized-images", move |snapshot: &DomSnapshot| {
            let urls: Vec<String> = snapshot
                .images
                .iter()
                .filter(|img| img.width > min_dimension || img.height > min_dimension)
                .filter(|img| is_fetchable(&img.src))
                .map(|img| img.src.clone())
                .collect();
            (!urls.is_empty()).then_some(Ok::<_, String>(urls))
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn query() -> DomQuery {
        DomQuery::new(&ExtractionConfig::default(), &SessionMarkers::default())
    }

    fn img(src: &str, width: u32, height: u32) -> ImageElement {
        ImageElement {
            src: src.to_string(),
            width,
            height,
        }
    }

    #[test]
    fn test_parse_css_url() {
        assert_eq!(
            parse_css_url(r#"url("https://cdn.site/a.jpg")"#),
            Some("https://cdn.site/a.jpg".to_string())
        );
        assert_eq!(
            parse_css_url("url('//cdn.site/b.jpg')"),
            Some("//cdn.site/b.jpg".to_string())
        );
        assert_eq!(
            parse_css_url("center / cover no-repeat url(https://cdn.site/c.jpg)"),
            Some("https://cdn.site/c.jpg".to_string())
        );
        assert_eq!(parse_css_url("none"), None);
        assert_eq!(parse_css_url("url()"), None);
    }

    #[tokio::test]
    async fn test_slides_win_over_images() {
        let snapshot = DomSnapshot {
            slide_backgrounds: vec![
                r#"url("https://cdn.site/1.jpg")"#.to_string(),
                r#"url("data:image/png;base64,AAAA")"#.to_string(),
                r#"url("//cdn.site/2.jpg")"#.to_string(),
            ],
            images: vec![img("https://cdn.site/big.jpg", 1080, 1440)],
            ..DomSnapshot::default()
        };
        let resolution = image_chain(200).run(&snapshot).await.unwrap();
        assert_eq!(resolution.strategy, "slide-backgrounds");
        assert_eq!(
            resolution.value,
            vec!["https://cdn.site/1.jpg".to_string(), "//cdn.site/2.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sized_images_filter() {
        let snapshot = DomSnapshot {
            images: vec![
                img("https://cdn.site/avatar.jpg", 40, 40),
                img("https://cdn.site/wide.jpg", 800, 150),
                img("https://cdn.site/edge.jpg", 200, 200),
                img("blob:https://www.xiaohongshu.com/123", 1080, 1080),
                img("//cdn.site/tall.jpg", 100, 600),
            ],
            ..DomSnapshot::default()
        };
        let resolution = image_chain(200).run(&snapshot).await.unwrap();
        assert_eq!(resolution.strategy, "sized-images");
        assert_eq!(
            resolution.value,
            vec!["https://cdn.site/wide.jpg".to_string(), "//cdn.site/tall.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_images_exhausts_chain() {
        assert!(image_chain(200).run(&DomSnapshot::default()).await.is_err());
    }

    #[test]
    fn test_snapshot_from_markup() {
        let markup = r##"<html><body>
            <div class="note-content">
              <div id="detail-title">  Weekend bakes </div>
              <div id="detail-desc">Sourdough notes</div>
              <a class="tag">#bread</a><a class="tag">#baking</a><a class="tag">#</a>
              <div class="swiper-slide"><span style="background-image: url(&quot;https://cdn.site/s1.jpg&quot;); width: 100%"></span></div>
              <div class="swiper-slide" style="background-image:url('//cdn.site/s2.jpg')"></div>
              <div class="swiper-slide"></div>
              <img src="https://cdn.site/i1.jpg" width="1080" height="1440">
              <img src="https://cdn.site/icon.png" width="24px">
            </div>
        </body></html>"##;

        let snapshot = query().snapshot_from_markup(markup);
        assert_eq!(
            snapshot,
            DomSnapshot {
                title: "Weekend bakes".to_string(),
                description: "Sourdough notes".to_string(),
                tags: vec!["bread".to_string(), "baking".to_string()],
                slide_backgrounds: vec![
                    r#"url("https://cdn.site/s1.jpg")"#.to_string(),
                    "url('//cdn.site/s2.jpg')".to_string(),
                ],
                images: vec![
                    img("https://cdn.site/i1.jpg", 1080, 1440),
                    img("https://cdn.site/icon.png", 24, 0),
                ],
            }
        );
    }

    #[test]
    fn test_snapshot_deserializes_script_shape() {
        let snapshot: DomSnapshot = serde_json::from_value(json!({
            "title": "T",
            "slideBackgrounds": ["url(\"https://x/1.jpg\")"],
            "images": [{"src": "https://x/2.jpg", "width": 300, "height": 300}]
        }))
        .unwrap();
        assert_eq!(snapshot.title, "T");
        assert_eq!(snapshot.slide_backgrounds.len(), 1);
        assert_eq!(snapshot.images[0].width, 300);
        assert!(snapshot.tags.is_empty());
    }

    #[test]
    fn test_script_is_tagged() {
        let script = query().script();
        assert!(script.starts_with(&script_tag("dom-snapshot")));
        assert!(script.contains(r#"".swiper-slide""#));
    }
}

//! Page fixtures shaped like the real site.

use serde_json::{json, Value};

use crate::session::PageSignals;

/// Address of a sample note page.
pub const NOTE_ADDRESS: &str = "https://www.xiaohongshu.com/explore/64f0c0de000000001f03a1b2";

/// Address of the creator publish page.
pub const PUBLISH_ADDRESS: &str = "https://creator.xiaohongshu.com/publish/publish";

/// Address of the login page the creator center redirects to.
pub const LOGIN_ADDRESS: &str =
    "https://creator.xiaohongshu.com/login?redirectReason=401&source=&redirectPath=%2Fpublish%2Fpublish";

/// Builds an initial-state tree holding one note.
///
/// The note sits a few levels deep next to unrelated objects, the way the
/// site nests it under a detail map keyed by note id.
#[must_use]
pub fn note_state(title: &str, desc: &str, tags: &[&str], images: &[Value]) -> Value {
    json!({
        "global": { "appSettings": { "title": "app" } },
        "user": { "loggedIn": true, "userInfo": { "nickname": "reader" } },
        "note": {
            "currentNoteId": "64f0c0de000000001f03a1b2",
            "noteDetailMap": {
                "64f0c0de000000001f03a1b2": {
                    "comments": { "list": [] },
                    "note": {
                        "noteId": "64f0c0de000000001f03a1b2",
                        "type": "normal",
                        "title": title,
                        "desc": desc,
                        "tagList": tags.iter().map(|t| json!({ "id": "t", "name": t, "type": "topic" })).collect::<Vec<_>>(),
                        "imageList": images,
                    }
                }
            }
        }
    })
}

/// An `imageList` entry with only a default URL.
#[must_use]
pub fn image_entry(url: &str) -> Value {
    json!({ "width": 1080, "height": 1440, "urlDefault": url, "urlPre": format!("{url}!pre") })
}

/// Wraps raw state text the way the site embeds it.
#[must_use]
pub fn page_with_state(raw_state: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>小红书</title></head><body>\
         <div id=\"app\"></div>\
         <script>window.__INITIAL_STATE__={raw_state}</script>\
         <script src=\"/static/vendor.js\"></script>\
         </body></html>"
    )
}

/// Signals of a rendered note page.
#[must_use]
pub fn note_signals(title: &str) -> PageSignals {
    PageSignals {
        address: NOTE_ADDRESS.to_string(),
        document_title: format!("{title} - 小红书"),
        title_text: Some(title.to_string()),
        has_state_blob: true,
        ..PageSignals::default()
    }
}

/// Signals of a page behind the login wall.
#[must_use]
pub fn login_wall_signals(address: &str) -> PageSignals {
    PageSignals {
        address: address.to_string(),
        document_title: "小红书 - 你的生活指南".to_string(),
        body_has_login_prompt: true,
        has_login_element: true,
        ..PageSignals::default()
    }
}

/// Signals of the creator publish page.
#[must_use]
pub fn publish_signals() -> PageSignals {
    PageSignals::at(PUBLISH_ADDRESS)
}

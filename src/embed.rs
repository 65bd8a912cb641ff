//! Embed code for converted documents.
//!
//! [`build_embed_code`] is a pure function of (document id, access key,
//! options). Options outside [`EMBED_WHITELIST`] are dropped silently, and the
//! kept ones are emitted in whitelist order so the output is stable.
//!
//! ```rust
//! use edgequake_ipaper::embed::{build_embed_code, EmbedOptions};
//!
//! let options = EmbedOptions::new().with("height", 600).with("auto_size", false);
//! let html = build_embed_code("12345", "key-abc", &options);
//! assert!(html.contains("scribd_doc.addParam('height', '600');"));
//! assert!(html.contains("scribd_doc.addParam('auto_size', false);"));
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

/// Display parameters the viewer understands, in emission order.
pub const EMBED_WHITELIST: [&str; 11] = [
    "height",
    "width",
    "page",
    "my_user_id",
    "search_query",
    "jsapi_version",
    "disable_related_docs",
    "mode",
    "auto_size",
    "hide_disabled_buttons",
    "hide_full_screen_button",
];

/// Viewer loader script.
pub const VIEWER_SCRIPT_URL: &str = "https://www.scribd.com/javascripts/view.js";

/// Element id the viewer is written into.
pub const CONTAINER_ID: &str = "embedded_flash";

/// A scalar option value.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl EmbedValue {
    /// Interpret a raw string: `true`/`false` become booleans, numeric text
    /// becomes a number, anything else stays a string.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" => return EmbedValue::Bool(true),
            "false" => return EmbedValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return EmbedValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return EmbedValue::Float(f);
            }
        }
        EmbedValue::Str(raw.to_string())
    }

    /// JavaScript literal for this value. Booleans are bare, everything else
    /// is a single-quoted string.
    fn to_js(&self) -> String {
        match self {
            EmbedValue::Bool(b) => b.to_string(),
            EmbedValue::Int(i) => js_string(&i.to_string()),
            EmbedValue::Float(f) => js_string(&f.to_string()),
            EmbedValue::Str(s) => js_string(s),
        }
    }
}

impl fmt::Display for EmbedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedValue::Bool(b) => write!(f, "{b}"),
            EmbedValue::Int(i) => write!(f, "{i}"),
            EmbedValue::Float(x) => write!(f, "{x}"),
            EmbedValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for EmbedValue {
    fn from(v: bool) -> Self {
        EmbedValue::Bool(v)
    }
}

impl From<i32> for EmbedValue {
    fn from(v: i32) -> Self {
        EmbedValue::Int(i64::from(v))
    }
}

impl From<i64> for EmbedValue {
    fn from(v: i64) -> Self {
        EmbedValue::Int(v)
    }
}

impl From<u32> for EmbedValue {
    fn from(v: u32) -> Self {
        EmbedValue::Int(i64::from(v))
    }
}

impl From<f64> for EmbedValue {
    fn from(v: f64) -> Self {
        EmbedValue::Float(v)
    }
}

impl From<&str> for EmbedValue {
    fn from(v: &str) -> Self {
        EmbedValue::Str(v.to_string())
    }
}

impl From<String> for EmbedValue {
    fn from(v: String) -> Self {
        EmbedValue::Str(v)
    }
}

/// Display options keyed by name. Any key may be set; only whitelisted keys
/// reach the output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedOptions {
    values: BTreeMap<String, EmbedValue>,
}

impl EmbedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`EmbedOptions::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<EmbedValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<EmbedValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&EmbedValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl<K: Into<String>, V: Into<EmbedValue>> FromIterator<(K, V)> for EmbedOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = EmbedOptions::new();
        for (k, v) in iter {
            options.insert(k, v);
        }
        options
    }
}

/// Whitelisted parameters with their rendered JavaScript literals, in
/// whitelist order.
pub fn embed_params(options: &EmbedOptions) -> Vec<(&'static str, String)> {
    EMBED_WHITELIST
        .iter()
        .filter_map(|&key| options.get(key).map(|v| (key, v.to_js())))
        .collect()
}

/// Render the viewer markup for one document.
pub fn build_embed_code(doc_id: &str, access_key: &str, options: &EmbedOptions) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        r#"<script type="text/javascript" src="{VIEWER_SCRIPT_URL}"></script>"#
    );
    let _ = writeln!(out, r#"<div id="{CONTAINER_ID}"></div>"#);
    let _ = writeln!(out, r#"<script type="text/javascript">"#);
    let _ = writeln!(
        out,
        "  var scribd_doc = scribd.Document.getDoc({}, {});",
        js_doc_id(doc_id),
        js_string(access_key)
    );
    for (key, value) in embed_params(options) {
        let _ = writeln!(out, "  scribd_doc.addParam('{key}', {value});");
    }
    let _ = writeln!(out, "  scribd_doc.write({});", js_string(CONTAINER_ID));
    out.push_str("</script>");
    out
}

/// Numeric ids are emitted bare, anything else as a string literal.
fn js_doc_id(doc_id: &str) -> String {
    let id = doc_id.trim();
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        id.to_string()
    } else {
        js_string(id)
    }
}

fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            // Keeps a value from closing the surrounding <script> element.
            '<' => out.push_str("\\x3C"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

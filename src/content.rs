//! Plain-text projection of rich-text documents plus slug helpers.

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::models::{NewPost, PostRecord, UpdatePost};

const WORDS_PER_MINUTE: usize = 200;

/// Collect every `{"type":"text","text":..}` node of an editor document.
pub fn extract_plain_text(doc: &Value) -> String {
    fn walk(node: &Value, out: &mut Vec<String>) {
        match node {
            Value::Array(items) => items.iter().for_each(|n| walk(n, out)),
            Value::Object(map) => {
                if map.get("type").and_then(Value::as_str) == Some("text") {
                    if let Some(text) = map.get("text").and_then(Value::as_str) {
                        out.push(text.to_string());
                    }
                }
                if let Some(content) = map.get("content") {
                    walk(content, out);
                }
            }
            _ => {}
        }
    }

    if !doc.is_object() {
        return String::new();
    }
    let mut out = Vec::new();
    walk(doc, &mut out);
    out.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Minutes at 200 words per minute, never below one.
pub fn estimate_reading_time(text: &str) -> i32 {
    let words = text.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i32
}

/// URL-safe slug: accents stripped, lowercase, single dashes between alphanumerics.
pub fn slugify(input: &str) -> String {
    let folded: String = input
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect::<String>()
        .to_lowercase();
    let mut slug = String::with_capacity(folded.len());
    for c in folded.trim().chars().filter(|c| *c != '\'' && *c != '"') {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Light normalisation applied to admin-provided tag slugs.
pub fn normalize_tag_slug(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join("-").to_lowercase()
}

impl NewPost {
    /// Fill `content_text` / `reading_time` from the document when the caller left them out.
    pub fn into_record(self) -> PostRecord {
        let content_text = match self.content_text {
            Some(text) => text,
            None => extract_plain_text(&self.content_json),
        };
        let reading_time = self.reading_time.unwrap_or_else(|| estimate_reading_time(&content_text));
        PostRecord {
            section: self.section,
            title: self.title,
            slug: self.slug,
            excerpt: self.excerpt,
            content_json: self.content_json,
            content_text,
            reading_time,
            cover_image_url: self.cover_image_url,
            category_id: self.category_id,
        }
    }
}

impl UpdatePost {
    /// A new document without explicit text re-derives the text and, unless given, the reading time.
    pub fn with_derived_fields(mut self) -> Self {
        if let (Some(doc), None) = (&self.content_json, &self.content_text) {
            self.content_text = Some(extract_plain_text(doc));
        }
        if self.reading_time.is_none() {
            if let Some(text) = &self.content_text {
                self.reading_time = Some(estimate_reading_time(text));
            }
        }
        self
    }
}

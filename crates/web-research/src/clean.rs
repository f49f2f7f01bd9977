//! HTML-to-text cleanup for fetched pages.

use scraper::{ElementRef, Html, Selector};

const MAX_CLEANED_LEN: usize = 20_000;

/// Strips tags/scripts/styles, keeps visible text, collapses whitespace, and
/// caps length so a single fetched page can't blow the tool-result budget.
pub fn clean_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap_or_else(|_| Selector::parse("html").unwrap());

    let mut text = String::new();
    if let Some(body) = document.select(&body_selector).next() {
        extract_text(body, &mut text);
    }

    let cleaned = collapse_whitespace(&text);
    if cleaned.len() > MAX_CLEANED_LEN {
        cleaned[..MAX_CLEANED_LEN].to_string()
    } else {
        cleaned
    }
}

/// Walks the subtree skipping `script`/`style`/`noscript`, appending every
/// text node it finds.
fn extract_text(element: ElementRef, out: &mut String) {
    if matches!(element.value().name(), "script" | "style" | "noscript") {
        return;
    }
    for child in element.children() {
        if let Some(text_node) = child.value().as_text() {
            out.push_str(text_node);
            out.push(' ');
        } else if let Some(child_element) = ElementRef::wrap(child) {
            extract_text(child_element, out);
        }
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        let html = "<html><body><h1>Duke  </h1><p>wins   big</p><script>evil()</script></body></html>";
        let cleaned = clean_html(html);
        assert!(!cleaned.contains('<'));
        assert!(cleaned.contains("Duke"));
        assert!(cleaned.contains("wins big"));
    }

    #[test]
    fn long_page_is_truncated() {
        let html = format!("<body>{}</body>", "word ".repeat(10_000));
        let cleaned = clean_html(&html);
        assert!(cleaned.len() <= MAX_CLEANED_LEN);
    }
}

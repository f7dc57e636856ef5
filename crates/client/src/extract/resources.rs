//! Sub-resource discovery in HTML documents.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

/// Elements that make a page load another resource.
const RESOURCE_SELECTOR: &str = "img[src], script[src], link[href][rel~=stylesheet], link[href][rel~=icon], \
     link[href][rel~=preload], source[src], video[poster], audio[src], iframe[src]";

static RESOURCES: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse(RESOURCE_SELECTOR).ok());
static BASE: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("base[href]").ok());

/// Every resource `html` would load, resolved against the page URL.
///
/// Only http(s) URLs are kept. Fragments are dropped and duplicates removed;
/// the first occurrence keeps its place. The page itself is never listed.
pub fn extract_subresources(html: &str, page: &Url) -> Vec<Url> {
    let Some(selector) = RESOURCES.as_ref() else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let base = document_base(&document, page);

    let mut own = page.clone();
    own.set_fragment(None);
    let mut seen = HashSet::from([own]);
    let mut found = Vec::new();

    for element in document.select(selector) {
        let attr = match element.value().name() {
            "video" => "poster",
            "link" => "href",
            _ => "src",
        };
        let Some(value) = element.value().attr(attr).map(str::trim) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let Ok(mut resolved) = base.join(value) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_fragment(None);
        if seen.insert(resolved.clone()) {
            found.push(resolved);
        }
    }

    found
}

/// Honour `<base href>` when present.
fn document_base(document: &Html, page: &Url) -> Url {
    BASE.as_ref()
        .and_then(|selector| document.select(selector).next())
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page.join(href.trim()).ok())
        .unwrap_or_else(|| page.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/blog/post").unwrap()
    }

    fn strings(urls: Vec<Url>) -> Vec<String> {
        urls.into_iter().map(String::from).collect()
    }

    #[test]
    fn test_extract_in_document_order() {
        let html = r#"
            <html>
                <head>
                    <link rel="stylesheet" href="/site.css">
                    <script src="app.js"></script>
                    <link rel="icon" href="https://cdn.example/favicon.ico">
                </head>
                <body>
                    <img src="hero.png">
                    <video poster="/poster.jpg"><source src="/clip.mp4"></video>
                    <audio src="/sound.ogg"></audio>
                    <iframe src="https://embed.example/widget"></iframe>
                </body>
            </html>
        "#;

        assert_eq!(
            strings(extract_subresources(html, &base())),
            vec![
                "https://example.com/site.css",
                "https://example.com/blog/app.js",
                "https://cdn.example/favicon.ico",
                "https://example.com/blog/hero.png",
                "https://example.com/poster.jpg",
                "https://example.com/clip.mp4",
                "https://example.com/sound.ogg",
                "https://embed.example/widget",
            ]
        );
    }

    #[test]
    fn test_extract_deduplicates() {
        let html = r#"
            <img src="/a.png"><img src="/a.png#top"><img src="https://example.com/a.png">
        "#;

        assert_eq!(strings(extract_subresources(html, &base())), vec!["https://example.com/a.png"]);
    }

    #[test]
    fn test_extract_skips_non_http_and_empty() {
        let html = r#"
            <img src="data:image/png;base64,AAAA">
            <script src="javascript:void(0)"></script>
            <img src="">
            <img src="   ">
            <img src="/ok.png">
        "#;

        assert_eq!(strings(extract_subresources(html, &base())), vec!["https://example.com/ok.png"]);
    }

    #[test]
    fn test_extract_ignores_plain_links() {
        let html = r#"
            <a href="/about">About</a>
            <link rel="canonical" href="/canonical">
            <link rel="preload" href="/font.woff2" as="font">
        "#;

        assert_eq!(strings(extract_subresources(html, &base())), vec!["https://example.com/font.woff2"]);
    }

    #[test]
    fn test_extract_skips_the_page_itself() {
        let html = r#"<iframe src="/blog/post#comments"></iframe>"#;

        assert!(extract_subresources(html, &base()).is_empty());
    }

    #[test]
    fn test_extract_honours_base_element() {
        let html = r#"
            <head><base href="https://static.example/v2/"></head>
            <body><img src="logo.png"></body>
        "#;

        assert_eq!(strings(extract_subresources(html, &base())), vec!["https://static.example/v2/logo.png"]);
    }

    #[test]
    fn test_extract_no_resources() {
        let html = "<html><body><p>Nothing to load</p></body></html>";

        assert!(extract_subresources(html, &base()).is_empty());
    }
}

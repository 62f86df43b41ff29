use url::Url;

use crate::app::Result;
use crate::rewrite::event::MarkupEvent;
use crate::rewrite::filters::{EventSink, MarkupFilter};

/// Attributes holding a URL the browser would resolve against the page.
const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "action",
    "formaction",
    "background",
    "poster",
    "cite",
    "longdesc",
];

/// Rewrites relative links so they still work once the page is served from
/// somewhere else. A `<base href>` in the document moves the base for
/// everything after it.
pub struct AbsoluteUrls {
    base: Option<Url>,
}

impl AbsoluteUrls {
    pub fn new(page_url: &str) -> Self {
        let base = match Url::parse(page_url) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Not rewriting links: page URL '{}' is invalid: {}", page_url, e);
                None
            }
        };
        Self { base }
    }

    fn resolve(&self, value: &str) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        self.base
            .as_ref()?
            .join(trimmed)
            .ok()
            .map(String::from)
    }
}

impl MarkupFilter for AbsoluteUrls {
    fn name(&self) -> &'static str {
        "absolute-urls"
    }

    fn filter(&mut self, event: MarkupEvent, next: &mut dyn EventSink) -> Result<()> {
        let (name, mut attrs, self_closing) = match event {
            MarkupEvent::StartTag {
                name,
                attrs,
                self_closing,
            } => (name, attrs, self_closing),
            other => return next.emit(other),
        };

        for attr in attrs.iter_mut() {
            if URL_ATTRIBUTES.contains(&attr.name.as_str()) {
                if let Some(absolute) = self.resolve(&attr.value) {
                    attr.value = absolute;
                }
            }
        }

        if name == "base" {
            if let Some(href) = attrs.iter().find(|a| a.name == "href") {
                if let Ok(url) = Url::parse(&href.value) {
                    self.base = Some(url);
                }
            }
        }

        next.emit(MarkupEvent::StartTag {
            name,
            attrs,
            self_closing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::event::Attribute;
    use crate::rewrite::filters::testing::run_filter;

    fn link(href: &str) -> MarkupEvent {
        MarkupEvent::start("a", vec![Attribute::new("href", href)])
    }

    #[test]
    fn test_relative_links_become_absolute() {
        let mut filter = AbsoluteUrls::new("http://a.example/docs/page.html");
        let out = run_filter(
            &mut filter,
            vec![
                link("intro.html"),
                link("/root.css"),
                MarkupEvent::start("img", vec![Attribute::new("src", "../img/logo.png")]),
            ],
        );

        assert_eq!(out[0].attr("href"), Some("http://a.example/docs/intro.html"));
        assert_eq!(out[1].attr("href"), Some("http://a.example/root.css"));
        assert_eq!(out[2].attr("src"), Some("http://a.example/img/logo.png"));
    }

    #[test]
    fn test_absolute_and_fragment_links_untouched() {
        let mut filter = AbsoluteUrls::new("http://a.example/docs/");
        let out = run_filter(&mut filter, vec![link("https://b.example/x"), link("#top")]);

        assert_eq!(out[0].attr("href"), Some("https://b.example/x"));
        assert_eq!(out[1].attr("href"), Some("#top"));
    }

    #[test]
    fn test_base_href_moves_the_base() {
        let mut filter = AbsoluteUrls::new("http://a.example/docs/");
        let out = run_filter(
            &mut filter,
            vec![
                MarkupEvent::start("base", vec![Attribute::new("href", "/static/")]),
                link("app.js"),
            ],
        );

        assert_eq!(out[0].attr("href"), Some("http://a.example/static/"));
        assert_eq!(out[1].attr("href"), Some("http://a.example/static/app.js"));
    }

    #[test]
    fn test_other_events_pass_through() {
        let mut filter = AbsoluteUrls::new("http://a.example/");
        let events = vec![MarkupEvent::text("href=x"), MarkupEvent::end("a")];
        assert_eq!(run_filter(&mut filter, events.clone()), events);
    }
}

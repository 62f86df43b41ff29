/// Elements that never have content or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One parser event as it travels down the filter chain.
///
/// Text carries decoded characters and is escaped again on output; raw text
/// (script and style bodies) is written back exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    Doctype {
        name: Option<String>,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    StartTag {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
    RawText(String),
    Comment(String),
}

impl MarkupEvent {
    pub fn start(name: impl Into<String>, attrs: Vec<Attribute>) -> Self {
        MarkupEvent::StartTag {
            name: name.into(),
            attrs,
            self_closing: false,
        }
    }

    pub fn end(name: impl Into<String>) -> Self {
        MarkupEvent::EndTag { name: name.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        MarkupEvent::Text(text.into())
    }

    /// Value of `attr` if this is a start tag carrying it.
    pub fn attr(&self, attr: &str) -> Option<&str> {
        match self {
            MarkupEvent::StartTag { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(attr))
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    /// Whether this start tag opens an element that a matching end tag
    /// will close.
    pub fn opens_element(&self) -> bool {
        match self {
            MarkupEvent::StartTag {
                name, self_closing, ..
            } => !self_closing && !is_void(name),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_lookup() {
        let event = MarkupEvent::start("a", vec![Attribute::new("href", "/x")]);
        assert_eq!(event.attr("HREF"), Some("/x"));
        assert_eq!(event.attr("src"), None);
        assert_eq!(MarkupEvent::end("a").attr("href"), None);
    }

    #[test]
    fn test_void_and_self_closing_do_not_open() {
        assert!(MarkupEvent::start("div", Vec::new()).opens_element());
        assert!(!MarkupEvent::start("br", Vec::new()).opens_element());
        assert!(!MarkupEvent::StartTag {
            name: "div".into(),
            attrs: Vec::new(),
            self_closing: true,
        }
        .opens_element());
    }
}

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::app::Result;
use crate::rewrite::event::MarkupEvent;
use crate::rewrite::filters::EventSink;

/// End of the filter chain: serializes events back into markup.
///
/// Output accumulates until [`take`](Self::take) hands it to the writer.
#[derive(Debug, Default)]
pub struct Emitter {
    buf: Vec<u8>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    fn push(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn write_event(&mut self, event: MarkupEvent) {
        match event {
            MarkupEvent::Doctype {
                name,
                public_id,
                system_id,
            } => {
                self.push("<!DOCTYPE");
                if let Some(name) = name {
                    self.push(" ");
                    self.push(&name);
                }
                match (public_id, system_id) {
                    (Some(public), Some(system)) => {
                        self.push(&format!(" PUBLIC \"{}\" \"{}\"", public, system))
                    }
                    (Some(public), None) => self.push(&format!(" PUBLIC \"{}\"", public)),
                    (None, Some(system)) => self.push(&format!(" SYSTEM \"{}\"", system)),
                    (None, None) => {}
                }
                self.push(">");
            }
            MarkupEvent::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                self.push("<");
                self.push(&name);
                for attr in attrs {
                    self.push(" ");
                    self.push(&attr.name);
                    self.push("=\"");
                    self.push(&encode_double_quoted_attribute(&attr.value));
                    self.push("\"");
                }
                self.push(if self_closing { "/>" } else { ">" });
            }
            MarkupEvent::EndTag { name } => {
                self.push("</");
                self.push(&name);
                self.push(">");
            }
            MarkupEvent::Text(text) => self.push(&encode_text(&text)),
            MarkupEvent::RawText(text) => self.push(&text),
            MarkupEvent::Comment(text) => {
                self.push("<!--");
                self.push(&text);
                self.push("-->");
            }
        }
    }
}

impl EventSink for Emitter {
    fn emit(&mut self, event: MarkupEvent) -> Result<()> {
        self.write_event(event);
        Ok(())
    }
}

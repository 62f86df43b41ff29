use std::collections::HashSet;

use crate::app::Result;
use crate::rewrite::event::MarkupEvent;
use crate::rewrite::filters::{EventSink, MarkupFilter};

/// Drops the configured elements along with everything inside them.
pub struct StripElements {
    names: HashSet<String>,
    /// Element being dropped and how deeply it is nested in itself
    stripping: Option<(String, usize)>,
}

impl StripElements {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            names: names
                .iter()
                .map(|n| n.as_ref().trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
            stripping: None,
        }
    }
}

impl MarkupFilter for StripElements {
    fn name(&self) -> &'static str {
        "strip-elements"
    }

    fn filter(&mut self, event: MarkupEvent, next: &mut dyn EventSink) -> Result<()> {
        if let Some((current, depth)) = self.stripping.as_mut() {
            match &event {
                MarkupEvent::StartTag { name, .. }
                    if name.as_str() == current.as_str() && event.opens_element() =>
                {
                    *depth += 1
                }
                MarkupEvent::EndTag { name } if name.as_str() == current.as_str() => *depth -= 1,
                _ => {}
            }
            if *depth == 0 {
                self.stripping = None;
            }
            return Ok(());
        }

        if let MarkupEvent::StartTag { ref name, .. } = event {
            if self.names.contains(name) {
                if event.opens_element() {
                    self.stripping = Some((name.clone(), 1));
                }
                return Ok(());
            }
        }

        next.emit(event)
    }
}

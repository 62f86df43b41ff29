use crate::app::Result;
use crate::rewrite::event::MarkupEvent;
use crate::rewrite::filters::{EventSink, MarkupFilter};

#[derive(Debug, PartialEq, Eq)]
enum ClipState {
    Searching,
    Inside { name: String, depth: usize },
    Done,
}

/// Keeps only the element with a given id and its subtree; everything else
/// in the document is dropped.
pub struct Clip {
    id: String,
    state: ClipState,
}

impl Clip {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: ClipState::Searching,
        }
    }
}

impl MarkupFilter for Clip {
    fn name(&self) -> &'static str {
        "clip"
    }

    fn filter(&mut self, event: MarkupEvent, next: &mut dyn EventSink) -> Result<()> {
        match self.state {
            ClipState::Done => Ok(()),
            ClipState::Searching => {
                if event.attr("id") != Some(self.id.as_str()) {
                    return Ok(());
                }
                if let MarkupEvent::StartTag { ref name, .. } = event {
                    self.state = if event.opens_element() {
                        ClipState::Inside {
                            name: name.clone(),
                            depth: 1,
                        }
                    } else {
                        ClipState::Done
                    };
                }
                next.emit(event)
            }
            ClipState::Inside {
                ref name,
                ref mut depth,
            } => {
                match &event {
                    MarkupEvent::StartTag { name: tag, .. }
                        if tag == name && event.opens_element() =>
                    {
                        *depth += 1
                    }
                    MarkupEvent::EndTag { name: tag } if tag == name => *depth -= 1,
                    _ => {}
                }
                if *depth == 0 {
                    self.state = ClipState::Done;
                }
                next.emit(event)
            }
        }
    }

    fn finish(&mut self, _next: &mut dyn EventSink) -> Result<()> {
        if self.state == ClipState::Searching {
            tracing::warn!("No element with id '{}' found to clip", self.id);
        }
        Ok(())
    }
}

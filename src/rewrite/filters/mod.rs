//! Markup filters and the registry that builds them by name.

pub mod absolute_urls;
pub mod clip;
pub mod strip;

pub use absolute_urls::AbsoluteUrls;
pub use clip::Clip;
pub use strip::StripElements;

use std::collections::HashMap;

use crate::app::{ProxyError, Result};
use crate::config::RewriteConfig;
use crate::rewrite::event::MarkupEvent;
use crate::rewrite::RewritePipeline;

/// Receives events from the link before it.
pub trait EventSink {
    fn emit(&mut self, event: MarkupEvent) -> Result<()>;
}

/// One link of the rewrite chain.
///
/// A filter sees each event once and forwards whatever it wants the rest of
/// the chain to see, which may be nothing, the event itself, or several new
/// events. An error aborts the document.
pub trait MarkupFilter: Send {
    fn name(&self) -> &'static str;

    fn filter(&mut self, event: MarkupEvent, next: &mut dyn EventSink) -> Result<()>;

    /// Called once after the last event of a document that parsed cleanly.
    fn finish(&mut self, _next: &mut dyn EventSink) -> Result<()> {
        Ok(())
    }
}

/// What a filter factory knows about the page being rewritten.
pub struct FilterContext<'a> {
    /// Final URL of the page, after redirects
    pub page_url: &'a str,
    pub config: &'a RewriteConfig,
}

pub type FilterFactory = fn(&FilterContext<'_>) -> Result<Box<dyn MarkupFilter>>;

pub struct FilterRegistry {
    factories: HashMap<String, FilterFactory>,
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: FilterFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(&self, name: &str, cx: &FilterContext<'_>) -> Result<Box<dyn MarkupFilter>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ProxyError::UnknownFilter(name.to_string()))?;
        factory(cx)
    }

    /// Build a pipeline from `names` in configured order: the first name
    /// ends up closest to the output.
    pub fn pipeline<S: AsRef<str>>(
        &self,
        names: &[S],
        cx: &FilterContext<'_>,
    ) -> Result<RewritePipeline> {
        let mut builder = RewritePipeline::builder();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() {
                builder = builder.filter(self.create(name, cx)?);
            }
        }
        Ok(builder.build())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("absolute-urls", |cx| Ok(Box::new(AbsoluteUrls::new(cx.page_url))));
        registry.register("strip-elements", |cx| {
            Ok(Box::new(StripElements::new(&cx.config.strip_elements)))
        });
        registry.register("clip", |cx| {
            let id = cx
                .config
                .clip_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ProxyError::Config("The clip filter needs a clip_id".into()))?;
            Ok(Box::new(Clip::new(id)))
        });
        registry
    }
}

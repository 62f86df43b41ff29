//! Streaming markup rewriting.
//!
//! A [`RewritePipeline`] runs an upstream body through the html5ever
//! tokenizer and an ordered chain of [`MarkupFilter`]s, writing the
//! re-serialized markup to the caller as it is produced. The document is
//! never held in memory as a whole.
//!
//! ```text
//! body → tokenizer → filter N → … → filter 1 → emitter → output
//! ```

pub mod emitter;
pub mod event;
pub mod filters;
mod tokenizer;

pub use event::{Attribute, MarkupEvent};
pub use filters::{EventSink, FilterContext, FilterRegistry, MarkupFilter};

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::warn;

use crate::app::{ProxyError, Result};
use crate::fetcher::BodyStream;

/// Chunks buffered between the body, the tokenizer and the writer.
const CHANNEL_DEPTH: usize = 16;

pub struct RewritePipeline {
    /// Event order: the parser feeds the first filter
    filters: Vec<Box<dyn MarkupFilter>>,
    /// Charset the body is decoded from; output is always UTF-8
    encoding: &'static Encoding,
}

#[derive(Default)]
pub struct PipelineBuilder {
    filters: Vec<Box<dyn MarkupFilter>>,
}

impl PipelineBuilder {
    /// Add the next configured filter. Each one added sits nearer the parser
    /// than the one before it.
    pub fn filter(mut self, filter: Box<dyn MarkupFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn build(mut self) -> RewritePipeline {
        self.filters.reverse();
        RewritePipeline {
            filters: self.filters,
            encoding: UTF_8,
        }
    }
}

impl RewritePipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Decode the body from `charset` (a content-type label such as
    /// `iso-8859-1`). Absent or unknown labels keep UTF-8.
    pub fn with_charset(mut self, charset: Option<&str>) -> Self {
        if let Some(label) = charset {
            match Encoding::for_label(label.as_bytes()) {
                Some(encoding) => self.encoding = encoding,
                None => warn!("Unknown charset '{}', decoding as UTF-8", label),
            }
        }
        self
    }

    /// Filter names in the order events reach them.
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Write `header`, the rewritten `body`, then `footer`. The footer is
    /// left out if anything went wrong.
    pub async fn run<W>(
        self,
        body: BodyStream,
        out: &mut W,
        header: Option<&str>,
        footer: Option<&str>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        if let Some(header) = header {
            out.write_all(header.as_bytes()).await?;
        }

        self.transform(body, out).await?;

        if let Some(footer) = footer {
            out.write_all(footer.as_bytes()).await?;
        }
        Ok(())
    }

    async fn transform<W>(self, mut body: BodyStream, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let (chunk_tx, chunk_rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_DEPTH);

        let (filters, encoding) = (self.filters, self.encoding);
        let worker = tokio::task::spawn_blocking(move || {
            tokenizer::tokenize(filters, encoding, chunk_rx, out_tx)
        });

        let pump = async move {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                if chunk_tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Ok::<_, ProxyError>(())
        };

        let writer = &mut *out;
        let drain = async move {
            while let Some(bytes) = out_rx.recv().await {
                writer.write_all(&bytes).await?;
            }
            Ok::<_, ProxyError>(())
        };

        let (pumped, drained) = tokio::join!(pump, drain);
        let parsed = worker
            .await
            .map_err(|e| ProxyError::Rewrite(format!("tokenizer task failed: {}", e)))?;

        // A failed write also closes the tokenizer's output; report the write.
        pumped?;
        drained?;
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewriteConfig;
    use futures::stream;

    fn body(chunks: &[&[u8]]) -> BodyStream {
        let chunks: Vec<Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks).boxed()
    }

    fn pipeline(names: &[&str], config: &RewriteConfig) -> RewritePipeline {
        let cx = FilterContext {
            page_url: "http://a.example/docs/index.html",
            config,
        };
        FilterRegistry::default().pipeline(names, &cx).unwrap()
    }

    async fn render(pipeline: RewritePipeline, chunks: &[&[u8]]) -> (Result<()>, String) {
        let mut out: Vec<u8> = Vec::new();
        let result = pipeline
            .run(body(chunks), &mut out, Some("<header>"), Some("<footer>"))
            .await;
        (result, String::from_utf8(out).unwrap())
    }

    struct Explode;

    impl MarkupFilter for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn filter(&mut self, event: MarkupEvent, next: &mut dyn EventSink) -> Result<()> {
            if let MarkupEvent::StartTag { ref name, .. } = event {
                if name == "blink" {
                    return Err(ProxyError::Rewrite("blink is not supported".into()));
                }
            }
            next.emit(event)
        }
    }

    /// Appends its tag to every text event it sees.
    struct Tag(&'static str);

    impl MarkupFilter for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        fn filter(&mut self, event: MarkupEvent, next: &mut dyn EventSink) -> Result<()> {
            match event {
                MarkupEvent::Text(text) => next.emit(MarkupEvent::Text(format!("{}{}", text, self.0))),
                other => next.emit(other),
            }
        }
    }

    #[tokio::test]
    async fn test_identity_pipeline_round_trips_markup() {
        let config = RewriteConfig::default();
        let html = b"<!DOCTYPE html><html><body><p class=\"x\">a &amp; b</p><br/></body></html>";

        let (result, out) = render(pipeline(&[], &config), &[html]).await;

        result.unwrap();
        assert_eq!(
            out,
            "<header><!DOCTYPE html><html><body><p class=\"x\">a &amp; b</p><br/></body></html><footer>"
        );
    }

    #[tokio::test]
    async fn test_script_body_is_not_escaped() {
        let config = RewriteConfig::default();
        let html = b"<script>if (a < b && c) { go(); }</script>";

        let (result, out) = render(pipeline(&[], &config), &[html]).await;

        result.unwrap();
        assert_eq!(out, "<header><script>if (a < b && c) { go(); }</script><footer>");
    }

    #[tokio::test]
    async fn test_chunks_split_mid_tag_and_character() {
        let config = RewriteConfig::default();
        let html = "<p title=\"t\">caf\u{e9}</p>".as_bytes();
        let split = html.len() - 5;

        let (result, out) = render(
            pipeline(&[], &config),
            &[&html[..4], &html[4..split], &html[split..]],
        )
        .await;

        result.unwrap();
        assert_eq!(out, "<header><p title=\"t\">caf\u{e9}</p><footer>");
    }

    #[tokio::test]
    async fn test_configured_filters_apply() {
        let config = RewriteConfig::default();
        let html = b"<a href=\"next.html\">go</a><script>track()</script>";

        let (result, out) = render(
            pipeline(&["absolute-urls", "strip-elements"], &config),
            &[html],
        )
        .await;

        result.unwrap();
        assert_eq!(
            out,
            "<header><a href=\"http://a.example/docs/next.html\">go</a><footer>"
        );
    }

    #[tokio::test]
    async fn test_last_configured_filter_sees_events_first() {
        let pipeline = RewritePipeline::builder()
            .filter(Box::new(Tag("1")))
            .filter(Box::new(Tag("2")))
            .build();
        assert_eq!(pipeline.filter_names(), vec!["2", "1"]);

        let mut out: Vec<u8> = Vec::new();
        pipeline.run(body(&[b"x"]), &mut out, None, None).await.unwrap();
        assert_eq!(out, b"x21");
    }

    #[tokio::test]
    async fn test_filter_error_suppresses_footer() {
        let pipeline = RewritePipeline::builder().filter(Box::new(Explode)).build();
        let html = b"<p>ok</p><blink>no</blink>";

        let (result, out) = render(pipeline, &[html]).await;

        assert!(matches!(result, Err(ProxyError::Rewrite(_))));
        assert!(out.starts_with("<header>"));
        assert!(!out.ends_with("<footer>"));
    }

    #[tokio::test]
    async fn test_body_error_is_reported() {
        let config = RewriteConfig::default();
        let failing: BodyStream = stream::iter(vec![
            Ok(Bytes::from_static(b"<p>part")),
            Err(ProxyError::Rewrite("connection reset".into())),
        ])
        .boxed();
        let mut out: Vec<u8> = Vec::new();

        let result = pipeline(&[], &config)
            .run(failing, &mut out, None, Some("<footer>"))
            .await;

        assert!(result.is_err());
        assert!(!String::from_utf8(out).unwrap().contains("<footer>"));
    }

    #[tokio::test]
    async fn test_write_error_is_reported() {
        let config = RewriteConfig::default();
        let mut out = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();

        let result = pipeline(&[], &config)
            .run(body(&[b"<p>hello</p>"]), &mut out, None, None)
            .await;

        assert!(matches!(result, Err(ProxyError::Io(_))));
    }

    #[tokio::test]
    async fn test_latin1_body_is_decoded() {
        let config = RewriteConfig::default();
        let pipeline = pipeline(&[], &config).with_charset(Some("ISO-8859-1"));

        let (result, out) = render(pipeline, &[b"<p>caf\xe9</p>"]).await;

        result.unwrap();
        assert_eq!(out, "<header><p>café</p><footer>");
    }

    #[tokio::test]
    async fn test_unknown_charset_falls_back_to_utf8() {
        let config = RewriteConfig::default();
        let pipeline = pipeline(&[], &config).with_charset(Some("x-no-such-charset"));

        let (result, out) = render(pipeline, &["<p>café</p>".as_bytes()]).await;

        result.unwrap();
        assert_eq!(out, "<header><p>café</p><footer>");
    }
}

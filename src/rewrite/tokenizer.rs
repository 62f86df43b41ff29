//! html5ever-backed tokenizer feeding the filter chain.
//!
//! html5ever's tendrils are not `Send`, so a whole document is tokenized on
//! one blocking thread. Body chunks arrive over a channel and serialized
//! output leaves over another, one batch per input chunk.

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, Encoding};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use tokio::sync::mpsc;

use crate::app::{ProxyError, Result};
use crate::rewrite::emitter::Emitter;
use crate::rewrite::event::{Attribute, MarkupEvent};
use crate::rewrite::filters::{EventSink, MarkupFilter};

/// Decodes body bytes in the page's charset, carrying partial characters
/// across chunk boundaries. A byte order mark overrides the charset;
/// malformed input becomes U+FFFD.
pub(crate) struct TextDecoder {
    inner: Decoder,
}

impl TextDecoder {
    pub(crate) fn new(encoding: &'static Encoding) -> Self {
        Self {
            inner: encoding.new_decoder(),
        }
    }

    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        self.run(chunk, false)
    }

    pub(crate) fn finish(&mut self) -> String {
        self.run(&[], true)
    }

    fn run(&mut self, mut input: &[u8], last: bool) -> String {
        let mut text = String::new();
        loop {
            let needed = self
                .inner
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len());
            text.reserve(needed.max(4));
            let (result, read, _) = self.inner.decode_to_string(input, &mut text, last);
            input = &input[read..];
            if let CoderResult::InputEmpty = result {
                return text;
            }
        }
    }
}

/// Chain of filters in event order, ending at the emitter.
struct Link<'a> {
    rest: &'a mut [Box<dyn MarkupFilter>],
    emitter: &'a mut Emitter,
}

impl EventSink for Link<'_> {
    fn emit(&mut self, event: MarkupEvent) -> Result<()> {
        match self.rest.split_first_mut() {
            Some((filter, rest)) => filter.filter(
                event,
                &mut Link {
                    rest,
                    emitter: &mut *self.emitter,
                },
            ),
            None => self.emitter.emit(event),
        }
    }
}

/// Token sink translating html5ever tokens into markup events.
struct ChainSink {
    /// Parser-side filter first
    filters: Vec<Box<dyn MarkupFilter>>,
    emitter: Emitter,
    in_raw_text: bool,
    error: Option<ProxyError>,
}

impl ChainSink {
    fn new(filters: Vec<Box<dyn MarkupFilter>>) -> Self {
        Self {
            filters,
            emitter: Emitter::new(),
            in_raw_text: false,
            error: None,
        }
    }

    fn dispatch(&mut self, event: MarkupEvent) {
        if self.error.is_some() {
            return;
        }
        let result = Link {
            rest: &mut self.filters,
            emitter: &mut self.emitter,
        }
        .emit(event);
        if let Err(e) = result {
            self.error = Some(e);
        }
    }

    fn check(&mut self) -> Result<()> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Let every filter flush what it held back, in event order.
    fn finish_filters(&mut self) -> Result<()> {
        for i in 0..self.filters.len() {
            let (head, rest) = self.filters.split_at_mut(i + 1);
            head[i].finish(&mut Link {
                rest,
                emitter: &mut self.emitter,
            })?;
        }
        Ok(())
    }
}

fn raw_kind(element: &str) -> Option<RawKind> {
    match element {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

impl TokenSink for ChainSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::DoctypeToken(doctype) => self.dispatch(MarkupEvent::Doctype {
                name: doctype.name.map(|s| s.to_string()),
                public_id: doctype.public_id.map(|s| s.to_string()),
                system_id: doctype.system_id.map(|s| s.to_string()),
            }),
            Token::TagToken(tag) => {
                let name = tag.name.to_string();
                match tag.kind {
                    TagKind::StartTag => {
                        let switch = raw_kind(&name);
                        self.in_raw_text = matches!(
                            switch,
                            Some(RawKind::ScriptData) | Some(RawKind::Rawtext)
                        );
                        let attrs = tag
                            .attrs
                            .into_iter()
                            .map(|a| Attribute::new(a.name.local.to_string(), a.value.to_string()))
                            .collect();
                        self.dispatch(MarkupEvent::StartTag {
                            name,
                            attrs,
                            self_closing: tag.self_closing,
                        });
                        if let Some(kind) = switch {
                            return TokenSinkResult::RawData(kind);
                        }
                    }
                    TagKind::EndTag => {
                        self.in_raw_text = false;
                        self.dispatch(MarkupEvent::EndTag { name });
                    }
                }
            }
            Token::CommentToken(text) => self.dispatch(MarkupEvent::Comment(text.to_string())),
            Token::CharacterTokens(text) => {
                let event = if self.in_raw_text {
                    MarkupEvent::RawText(text.to_string())
                } else {
                    MarkupEvent::Text(text.to_string())
                };
                self.dispatch(event);
            }
            Token::NullCharacterToken => self.dispatch(MarkupEvent::Text("\u{FFFD}".into())),
            Token::EOFToken => {}
            Token::ParseError(e) => tracing::trace!("Recoverable markup error: {}", e),
        }
        TokenSinkResult::Continue
    }
}

fn ship(emitter: &mut Emitter, out: &mpsc::Sender<Vec<u8>>) -> Result<()> {
    let bytes = emitter.take();
    if bytes.is_empty() {
        return Ok(());
    }
    out.blocking_send(bytes)
        .map_err(|_| ProxyError::Rewrite("output closed before the document was written".into()))
}

/// Tokenize everything arriving on `input`, sending rewritten markup to
/// `output`. Must run on a blocking thread.
pub(crate) fn tokenize(
    filters: Vec<Box<dyn MarkupFilter>>,
    encoding: &'static Encoding,
    mut input: mpsc::Receiver<Bytes>,
    output: mpsc::Sender<Vec<u8>>,
) -> Result<()> {
    let mut tokenizer = Tokenizer::new(ChainSink::new(filters), TokenizerOpts::default());
    let mut queue = BufferQueue::new();
    let mut decoder = TextDecoder::new(encoding);

    while let Some(chunk) = input.blocking_recv() {
        let text = decoder.decode(&chunk);
        if !text.is_empty() {
            queue.push_back(StrTendril::from_slice(&text));
            let _ = tokenizer.feed(&mut queue);
        }
        tokenizer.sink.check()?;
        ship(&mut tokenizer.sink.emitter, &output)?;
    }

    let text = decoder.finish();
    if !text.is_empty() {
        queue.push_back(StrTendril::from_slice(&text));
        let _ = tokenizer.feed(&mut queue);
    }
    tokenizer.end();
    tokenizer.sink.check()?;
    tokenizer.sink.finish_filters()?;
    ship(&mut tokenizer.sink.emitter, &output)
}

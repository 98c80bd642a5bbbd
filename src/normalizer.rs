//! Conversion of raw fetched bytes into a structured block tree.

use crate::fetcher::{RawDocument, SourceKind};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;

/// Cap on recorded blocks to avoid runaway memory use on pathological pages.
pub const DEFAULT_MAX_BLOCKS: usize = 8192;

const SKIP_TAGS: [&str; 5] = ["script", "style", "template", "noscript", "svg"];
const BLOCK_TAGS: [&str; 11] = [
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "blockquote", "pre", "code",
];
const OVERLAY_MARKERS: [&str; 5] = ["modal", "popup", "overlay", "lightbox", "dialog"];

/// Classification for extracted blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BlockKind {
    /// Heading text at a given level.
    Heading {
        /// Heading depth (1-6).
        level: u8,
    },
    /// Standard paragraph.
    Paragraph,
    /// Bullet or numbered list item.
    ListItem {
        /// True when the nearest enclosing list is `<ol>`.
        ordered: bool,
    },
    /// Inline or fenced preformatted snippet/code.
    Preformatted,
    /// Block quote.
    Quote,
    /// Tag-less text block (PDF sources).
    Text,
}

/// Inline run inside a block; anchors survive so the renderer can decide
/// whether to keep link targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Span {
    /// Plain text run.
    Text(String),
    /// Hyperlink with resolved target.
    Link {
        /// Visible anchor text.
        text: String,
        /// Absolute link target.
        href: String,
    },
}

impl Span {
    /// Visible text of the span, ignoring any link target.
    pub fn visible_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Link { text, .. } => text,
        }
    }
}

/// Discrete chunk of cleaned content tagged with structural context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    /// Block classification.
    pub kind: BlockKind,
    /// Source element name (`None` for tag-less sources).
    pub tag: Option<String>,
    /// Ancestor element names, outermost first.
    pub path: Vec<String>,
    /// 1-based position within the source list (list items only).
    pub ordinal: Option<usize>,
    /// Inline runs in document order.
    pub spans: Vec<Span>,
    /// Collapsed plain text of the block.
    pub text: String,
    /// Whitespace-separated word count.
    pub word_count: usize,
    /// Number of descendant elements (density signal).
    pub tag_count: usize,
    /// True when the block sits inside an overlay/modal region.
    pub overlay: bool,
}

impl Block {
    /// Builds a block from spans, deriving text and word count.
    pub fn from_spans(kind: BlockKind, tag: Option<String>, spans: Vec<Span>) -> Self {
        let text: String = spans.iter().map(Span::visible_text).collect();
        let word_count = text.split_whitespace().count();
        Self {
            kind,
            tag,
            path: Vec::new(),
            ordinal: None,
            spans,
            text,
            word_count,
            tag_count: 0,
            overlay: false,
        }
    }
}

/// Structured representation of a normalized document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentTree {
    /// Content blocks in document order.
    pub blocks: Vec<Block>,
    /// True when the body required lossy UTF-8 decoding.
    pub lossy_decoding: bool,
}

/// Errors surfaced while normalizing a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The response body was empty.
    EmptyBody,
    /// PDF text extraction failed beyond recovery.
    Pdf(String),
    /// The source kind has no normalizer.
    UnsupportedContent(Option<String>),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBody => write!(f, "no body bytes available for normalization"),
            Self::Pdf(msg) => write!(f, "pdf extraction failed: {msg}"),
            Self::UnsupportedContent(ct) => write!(
                f,
                "unsupported content type: {}",
                ct.as_deref().unwrap_or("<unknown>")
            ),
        }
    }
}

impl Error for ParseError {}

/// Stateless normalization service; pure transform over a fetched document.
#[derive(Clone)]
pub struct Normalizer {
    selectors: RootSelectors,
    max_blocks: usize,
}

impl Normalizer {
    /// Builds a normalizer with the default block cap.
    pub fn new() -> Self {
        Self {
            selectors: RootSelectors::new(),
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }

    /// Overrides the recorded-block cap.
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks.max(1);
        self
    }

    /// Normalizes fetched bytes into a block tree.
    pub fn normalize(&self, doc: &RawDocument) -> Result<DocumentTree, ParseError> {
        if doc.body.is_empty() {
            return Err(ParseError::EmptyBody);
        }

        match doc.kind {
            SourceKind::Html => Ok(self.normalize_html(doc)),
            SourceKind::Pdf => normalize_pdf(&doc.body),
            SourceKind::Other => Err(ParseError::UnsupportedContent(doc.content_type.clone())),
        }
    }

    fn normalize_html(&self, doc: &RawDocument) -> DocumentTree {
        let (decoded, lossy) = decode_body(&doc.body);
        let document = Html::parse_document(&decoded);
        let root = self.selectors.pick_root(&document);

        let mut collector = BlockCollector::new(&doc.url, self.max_blocks);
        collector.walk(root);

        DocumentTree {
            blocks: collector.finish(),
            lossy_decoding: lossy,
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct RootSelectors {
    article: Selector,
    main: Selector,
    body: Selector,
}

impl RootSelectors {
    fn new() -> Self {
        Self {
            article: Selector::parse("article").expect("article selector"),
            main: Selector::parse("main").expect("main selector"),
            body: Selector::parse("body").expect("body selector"),
        }
    }

    fn pick_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        document
            .select(&self.article)
            .next()
            .or_else(|| document.select(&self.main).next())
            .or_else(|| document.select(&self.body).next())
            .unwrap_or_else(|| document.root_element())
    }
}

fn decode_body(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (Cow::Borrowed(text), false),
        Err(_) => (
            Cow::Owned(String::from_utf8_lossy(bytes).into_owned()),
            true,
        ),
    }
}

struct BlockCollector<'doc> {
    base: &'doc url::Url,
    max_blocks: usize,
    blocks: Vec<Block>,
    block_limit_hit: bool,
}

impl<'doc> BlockCollector<'doc> {
    fn new(base: &'doc url::Url, max_blocks: usize) -> Self {
        Self {
            base,
            max_blocks,
            blocks: Vec::new(),
            block_limit_hit: false,
        }
    }

    fn walk(&mut self, root: ElementRef<'_>) {
        for element in root.descendent_elements() {
            if self.block_limit_hit {
                break;
            }
            self.maybe_record(element);
        }
    }

    fn maybe_record(&mut self, element: ElementRef<'_>) {
        let tag = element.value().name();
        if SKIP_TAGS.contains(&tag) {
            return;
        }

        let kind = match tag {
            "h1" => Some(BlockKind::Heading { level: 1 }),
            "h2" => Some(BlockKind::Heading { level: 2 }),
            "h3" => Some(BlockKind::Heading { level: 3 }),
            "h4" => Some(BlockKind::Heading { level: 4 }),
            "h5" => Some(BlockKind::Heading { level: 5 }),
            "h6" => Some(BlockKind::Heading { level: 6 }),
            "p" => Some(BlockKind::Paragraph),
            "li" => Some(BlockKind::ListItem {
                ordered: nearest_list_is_ordered(element),
            }),
            "blockquote" => Some(BlockKind::Quote),
            "pre" | "code" => Some(BlockKind::Preformatted),
            _ => None,
        };

        let Some(kind) = kind else {
            return;
        };

        // Outermost block wins: a <p> inside a <blockquote> or a <code>
        // inside a <pre> is already covered by the enclosing block's text.
        if has_block_ancestor(element) {
            return;
        }

        let spans = if matches!(kind, BlockKind::Preformatted) {
            let text = collapse_newlines(&raw_text(element));
            if text.is_empty() {
                return;
            }
            vec![Span::Text(text)]
        } else {
            let spans = collect_spans(element, self.base);
            if spans.iter().all(|s| s.visible_text().trim().is_empty()) {
                return;
            }
            spans
        };

        let mut block = Block::from_spans(kind, Some(tag.to_string()), spans);
        block.path = ancestor_path(element);
        if matches!(block.kind, BlockKind::ListItem { .. }) {
            block.ordinal = Some(list_position(element));
        }
        block.tag_count = element.descendent_elements().count().saturating_sub(1);
        block.overlay = is_overlay(element);
        self.blocks.push(block);

        if self.blocks.len() >= self.max_blocks {
            self.block_limit_hit = true;
        }
    }

    fn finish(self) -> Vec<Block> {
        self.blocks
    }
}

/// Collects inline runs under `element`, keeping anchors as link spans with
/// targets resolved against the document URL.
fn collect_spans(element: ElementRef<'_>, base: &url::Url) -> Vec<Span> {
    let mut raw: Vec<Span> = Vec::new();
    gather_spans(element, base, &mut raw);

    let mut spans: Vec<Span> = Vec::new();
    for span in raw {
        match span {
            Span::Text(text) => {
                let collapsed = collapse_whitespace_keep_edges(&text);
                if collapsed.is_empty() {
                    continue;
                }
                if let Some(Span::Text(last)) = spans.last_mut() {
                    if last.ends_with(' ') && collapsed.starts_with(' ') {
                        last.push_str(collapsed.trim_start());
                    } else {
                        last.push_str(&collapsed);
                    }
                    continue;
                }
                spans.push(Span::Text(collapsed));
            }
            link => spans.push(link),
        }
    }

    trim_edges(&mut spans);
    spans
}

fn gather_spans(element: ElementRef<'_>, base: &url::Url, out: &mut Vec<Span>) {
    for node in element.children() {
        if let Some(text) = node.value().as_text() {
            out.push(Span::Text(text.to_string()));
            continue;
        }
        let Some(child) = ElementRef::wrap(node) else {
            continue;
        };
        let name = child.value().name();
        if SKIP_TAGS.contains(&name) {
            continue;
        }
        if name == "br" {
            out.push(Span::Text(" ".to_string()));
            continue;
        }
        if name == "a" {
            if let Some(href) = child.value().attr("href") {
                let text = collapse_whitespace(&raw_text(child));
                if !text.is_empty() {
                    let href = base
                        .join(href)
                        .map(|u| u.to_string())
                        .unwrap_or_else(|_| href.to_string());
                    out.push(Span::Link { text, href });
                    continue;
                }
            }
        }
        gather_spans(child, base, out);
    }
}

fn trim_edges(spans: &mut Vec<Span>) {
    if let Some(Span::Text(first)) = spans.first_mut() {
        let trimmed = first.trim_start().to_string();
        if trimmed.is_empty() {
            spans.remove(0);
        } else {
            *first = trimmed;
        }
    }
    if let Some(Span::Text(last)) = spans.last_mut() {
        let trimmed = last.trim_end().to_string();
        if trimmed.is_empty() {
            spans.pop();
        } else {
            *last = trimmed;
        }
    }
}

fn has_block_ancestor(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|el| BLOCK_TAGS.contains(&el.value().name()))
}

fn ancestor_path(element: ElementRef<'_>) -> Vec<String> {
    let mut path: Vec<String> = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .map(|el| el.value().name().to_string())
        .collect();
    path.reverse();
    path
}

/// 1-based position of a list item among its sibling items. Recorded so the
/// renderer numbers items by source position rather than tree adjacency,
/// keeping numbering stable when pruning removes the block between two lists.
fn list_position(element: ElementRef<'_>) -> usize {
    element
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "li")
        .count()
        + 1
}

fn nearest_list_is_ordered(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .map(|el| el.value().name().to_string())
        .find(|name| name == "ol" || name == "ul")
        .map(|name| name == "ol")
        .unwrap_or(false)
}

/// Overlay heuristic: the element or an ancestor carries a modal/popup class
/// or id, or fixed-position / z-index style hints.
fn is_overlay(element: ElementRef<'_>) -> bool {
    if element_has_overlay_markers(element) {
        return true;
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(element_has_overlay_markers)
}

fn element_has_overlay_markers(element: ElementRef<'_>) -> bool {
    let value = element.value();
    for class in value.classes() {
        if contains_overlay_marker(class) {
            return true;
        }
    }
    if let Some(id) = value.id() {
        if contains_overlay_marker(id) {
            return true;
        }
    }
    if let Some(style) = value.attr("style") {
        let style = style.to_ascii_lowercase().replace(' ', "");
        if style.contains("position:fixed") || style.contains("z-index:") {
            return true;
        }
    }
    false
}

fn contains_overlay_marker(value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    OVERLAY_MARKERS.iter().any(|marker| value.contains(marker))
}

fn raw_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for piece in element.text() {
        raw.push_str(piece);
    }
    raw
}

fn collapse_whitespace(input: &str) -> String {
    collapse_whitespace_keep_edges(input).trim().to_string()
}

/// Collapses whitespace runs to single spaces, keeping at most one leading
/// and trailing space so adjacent spans stay separated.
fn collapse_whitespace_keep_edges(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf
}

fn collapse_newlines(input: &str) -> String {
    let mut lines = Vec::new();
    for line in input.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        lines.push(trimmed.to_string());
    }
    lines.join("\n")
}

fn normalize_pdf(body: &[u8]) -> Result<DocumentTree, ParseError> {
    let text =
        pdf_extract::extract_text_from_mem(body).map_err(|err| ParseError::Pdf(err.to_string()))?;
    Ok(DocumentTree {
        blocks: blocks_from_text(&text),
        lossy_decoding: false,
    })
}

/// Splits extracted plain text into tag-less blocks on blank lines.
pub fn blocks_from_text(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            push_text_block(&mut blocks, &current);
            current.clear();
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(line.trim());
        }
    }
    push_text_block(&mut blocks, &current);

    blocks
}

fn push_text_block(blocks: &mut Vec<Block>, buffer: &str) {
    let text = collapse_whitespace(buffer);
    if text.is_empty() {
        return;
    }
    blocks.push(Block::from_spans(
        BlockKind::Text,
        None,
        vec![Span::Text(text)],
    ));
}

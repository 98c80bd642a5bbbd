//! Markdown rendering over a normalized block tree.

use crate::config::GeneratorOptions;
use crate::normalizer::{Block, BlockKind, DocumentTree, Span};
use std::error::Error;
use std::fmt;

/// Errors raised for tree shapes the renderer cannot map to markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Heading level outside 1-6.
    HeadingDepth {
        /// Offending level.
        level: u8,
    },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeadingDepth { level } => {
                write!(f, "heading level {level} outside the 1-6 range")
            }
        }
    }
}

impl Error for RenderError {}

/// Renders the tree to markdown in document order, blocks separated by blank
/// lines. Deterministic: the same tree and options always produce the same
/// bytes.
pub fn render(tree: &DocumentTree, options: &GeneratorOptions) -> Result<String, RenderError> {
    let mut pieces: Vec<String> = Vec::with_capacity(tree.blocks.len());
    let mut ordinal = 0usize;

    for block in &tree.blocks {
        if !matches!(block.kind, BlockKind::ListItem { ordered: true }) {
            ordinal = 0;
        }

        let piece = match &block.kind {
            BlockKind::Heading { level } => {
                if *level == 0 || *level > 6 {
                    return Err(RenderError::HeadingDepth { level: *level });
                }
                format!(
                    "{} {}",
                    "#".repeat(*level as usize),
                    inline_text(block, options)
                )
            }
            BlockKind::Paragraph | BlockKind::Text => inline_text(block, options),
            BlockKind::ListItem { ordered: false } => {
                format!("- {}", inline_text(block, options))
            }
            BlockKind::ListItem { ordered: true } => {
                // Source position wins when the normalizer recorded it, so
                // numbering survives pruning of the block between two lists.
                ordinal = block.ordinal.unwrap_or(ordinal + 1);
                format!("{ordinal}. {}", inline_text(block, options))
            }
            BlockKind::Quote => inline_text(block, options)
                .lines()
                .map(|line| format!("> {line}"))
                .collect::<Vec<_>>()
                .join("\n"),
            BlockKind::Preformatted => format!("```\n{}\n```", block.text),
        };

        pieces.push(piece);
    }

    Ok(pieces.join("\n\n"))
}

fn inline_text(block: &Block, options: &GeneratorOptions) -> String {
    let mut out = String::with_capacity(block.text.len());
    for span in &block.spans {
        match span {
            Span::Text(text) => out.push_str(text),
            Span::Link { text, href } => {
                if options.ignore_links {
                    out.push_str(text);
                } else {
                    out.push_str(&format!("[{text}]({href})"));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Span;

    fn block(kind: BlockKind, spans: Vec<Span>) -> Block {
        Block::from_spans(kind, None, spans)
    }

    fn text_block(kind: BlockKind, text: &str) -> Block {
        block(kind, vec![Span::Text(text.to_string())])
    }

    fn tree(blocks: Vec<Block>) -> DocumentTree {
        DocumentTree {
            blocks,
            lossy_decoding: false,
        }
    }

    #[test]
    fn renders_block_kinds_in_document_order() {
        let tree = tree(vec![
            text_block(BlockKind::Heading { level: 2 }, "Section"),
            text_block(BlockKind::Paragraph, "Alpha paragraph."),
            text_block(BlockKind::ListItem { ordered: false }, "bullet"),
            text_block(BlockKind::Quote, "quoted words"),
            text_block(BlockKind::Preformatted, "let x = 1;"),
            text_block(BlockKind::Text, "Beta trailing text."),
        ]);

        let markdown = render(&tree, &GeneratorOptions::default()).expect("render");

        assert_eq!(
            markdown,
            "## Section\n\nAlpha paragraph.\n\n- bullet\n\n> quoted words\n\n```\nlet x = 1;\n```\n\nBeta trailing text."
        );
        let alpha = markdown.find("Alpha").unwrap();
        let beta = markdown.find("Beta").unwrap();
        assert!(alpha < beta);
    }

    #[test]
    fn numbers_consecutive_ordered_items() {
        let tree = tree(vec![
            text_block(BlockKind::ListItem { ordered: true }, "first"),
            text_block(BlockKind::ListItem { ordered: true }, "second"),
            text_block(BlockKind::Paragraph, "break"),
            text_block(BlockKind::ListItem { ordered: true }, "restarted"),
        ]);

        let markdown = render(&tree, &GeneratorOptions::default()).expect("render");
        assert_eq!(markdown, "1. first\n\n2. second\n\nbreak\n\n1. restarted");
    }

    #[test]
    fn recorded_ordinals_survive_pruning_of_surrounding_blocks() {
        let ordered_item = |ordinal: usize, text: &str| {
            let mut item = text_block(BlockKind::ListItem { ordered: true }, text);
            item.ordinal = Some(ordinal);
            item
        };
        let full = tree(vec![
            ordered_item(1, "first list"),
            ordered_item(2, "first list"),
            text_block(BlockKind::Paragraph, "x"),
            ordered_item(1, "second list"),
            ordered_item(2, "second list"),
        ]);
        let mut pruned_blocks = full.blocks.clone();
        pruned_blocks.remove(2);
        let pruned = tree(pruned_blocks);

        let raw = render(&full, &GeneratorOptions::default()).unwrap();
        let fit = render(&pruned, &GeneratorOptions::default()).unwrap();

        // The second list restarts at 1 in both renderings.
        assert_eq!(raw.matches("1. ").count(), 2);
        assert_eq!(fit.matches("1. ").count(), 2);
        assert!(!fit.contains("3. "));
        assert!(fit.len() <= raw.len());
    }

    #[test]
    fn link_targets_follow_the_ignore_links_option() {
        let tree = tree(vec![block(
            BlockKind::Paragraph,
            vec![
                Span::Text("Read ".to_string()),
                Span::Link {
                    text: "the guide".to_string(),
                    href: "https://example.com/guide".to_string(),
                },
                Span::Text(" carefully.".to_string()),
            ],
        )]);

        let with_links = render(&tree, &GeneratorOptions { ignore_links: false }).unwrap();
        let without_links = render(&tree, &GeneratorOptions { ignore_links: true }).unwrap();

        assert_eq!(
            with_links,
            "Read [the guide](https://example.com/guide) carefully."
        );
        assert_eq!(without_links, "Read the guide carefully.");
        assert!(without_links.len() <= with_links.len());
    }

    #[test]
    fn multi_line_quotes_prefix_every_line() {
        let tree = tree(vec![block(
            BlockKind::Quote,
            vec![Span::Text("line one\nline two".to_string())],
        )]);
        let markdown = render(&tree, &GeneratorOptions::default()).unwrap();
        assert_eq!(markdown, "> line one\n> line two");
    }

    #[test]
    fn rendering_is_idempotent() {
        let tree = tree(vec![
            text_block(BlockKind::Heading { level: 1 }, "Title"),
            text_block(BlockKind::Paragraph, "Body."),
        ]);
        let options = GeneratorOptions { ignore_links: true };

        let first = render(&tree, &options).unwrap();
        let second = render(&tree, &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_heading_depth_is_an_error_not_empty_output() {
        let tree = tree(vec![text_block(BlockKind::Heading { level: 7 }, "Deep")]);
        assert_eq!(
            render(&tree, &GeneratorOptions::default()),
            Err(RenderError::HeadingDepth { level: 7 })
        );
    }

    #[test]
    fn empty_tree_renders_to_empty_string() {
        let markdown = render(&tree(Vec::new()), &GeneratorOptions::default()).unwrap();
        assert!(markdown.is_empty());
    }
}

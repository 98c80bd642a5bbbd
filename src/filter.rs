//! Pruning content filter: drops excluded tags, overlays, and low-density
//! blocks from a normalized tree.

use crate::config::{FilterParams, ThresholdType};
use crate::normalizer::{Block, BlockKind, DocumentTree};
use std::collections::HashSet;
use std::error::Error;
use std::fmt;

const TAG_DENSITY_WEIGHT: f32 = 2.0;

/// Errors raised for invalid filter parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Threshold must sit inside `[0, 1]`.
    ThresholdOutOfRange(f32),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThresholdOutOfRange(value) => {
                write!(f, "threshold {value} outside the [0, 1] range")
            }
        }
    }
}

impl Error for FilterError {}

/// Deterministic pruning filter configured per crawl.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    params: FilterParams,
    excluded_tags: HashSet<String>,
    remove_overlays: bool,
}

impl ContentFilter {
    /// Validates the parameters and builds a filter.
    pub fn new(
        params: FilterParams,
        excluded_tags: &[String],
        remove_overlays: bool,
    ) -> Result<Self, FilterError> {
        if !(0.0..=1.0).contains(&params.threshold) || params.threshold.is_nan() {
            return Err(FilterError::ThresholdOutOfRange(params.threshold));
        }
        Ok(Self {
            params,
            excluded_tags: excluded_tags
                .iter()
                .map(|tag| tag.to_ascii_lowercase())
                .collect(),
            remove_overlays,
        })
    }

    /// Produces a pruned copy of the tree, preserving document order.
    ///
    /// Stages: excluded-tag drop, overlay drop, density cutoff (inclusive
    /// lower bound), then the word-count floor.
    pub fn prune(&self, tree: &DocumentTree) -> DocumentTree {
        let survivors: Vec<&Block> = tree
            .blocks
            .iter()
            .filter(|block| !self.is_excluded(block))
            .filter(|block| !(self.remove_overlays && block.overlay))
            .collect();

        let cutoff = self.cutoff(&survivors);

        let blocks = survivors
            .into_iter()
            .filter(|block| score(block) >= cutoff)
            .filter(|block| block.word_count >= self.params.min_word_threshold)
            .cloned()
            .collect();

        DocumentTree {
            blocks,
            lossy_decoding: tree.lossy_decoding,
        }
    }

    fn is_excluded(&self, block: &Block) -> bool {
        if let Some(tag) = &block.tag {
            if self.excluded_tags.contains(&tag.to_ascii_lowercase()) {
                return true;
            }
        }
        block
            .path
            .iter()
            .any(|tag| self.excluded_tags.contains(&tag.to_ascii_lowercase()))
    }

    fn cutoff(&self, survivors: &[&Block]) -> f32 {
        match self.params.threshold_type {
            ThresholdType::Fixed => self.params.threshold,
            ThresholdType::Dynamic => {
                if survivors.is_empty() {
                    return self.params.threshold;
                }
                let mean =
                    survivors.iter().map(|b| score(b)).sum::<f32>() / survivors.len() as f32;
                (self.params.threshold * mean).clamp(0.0, 1.0)
            }
        }
    }
}

/// Information-density score in `[0, 1]`: words against descendant-tag
/// weight, nudged per block kind so short headings survive sensible cutoffs.
pub fn score(block: &Block) -> f32 {
    let words = block.word_count as f32;
    if words == 0.0 {
        return 0.0;
    }
    let density = words / (words + TAG_DENSITY_WEIGHT * (block.tag_count as f32 + 1.0));
    (kind_weight(&block.kind) * density).clamp(0.0, 1.0)
}

fn kind_weight(kind: &BlockKind) -> f32 {
    match kind {
        BlockKind::Heading { .. } => 1.5,
        BlockKind::ListItem { .. } => 0.8,
        BlockKind::Paragraph | BlockKind::Preformatted | BlockKind::Quote | BlockKind::Text => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Span;

    fn block(kind: BlockKind, tag: Option<&str>, text: &str) -> Block {
        Block::from_spans(kind, tag.map(str::to_string), vec![Span::Text(text.to_string())])
    }

    fn paragraph(text: &str) -> Block {
        block(BlockKind::Paragraph, Some("p"), text)
    }

    fn tree(blocks: Vec<Block>) -> DocumentTree {
        DocumentTree {
            blocks,
            lossy_decoding: false,
        }
    }

    fn params(threshold: f32, threshold_type: ThresholdType, min_words: usize) -> FilterParams {
        FilterParams {
            threshold,
            threshold_type,
            min_word_threshold: min_words,
        }
    }

    #[test]
    fn rejects_threshold_outside_unit_interval() {
        let result = ContentFilter::new(params(1.5, ThresholdType::Fixed, 0), &[], false);
        assert_eq!(result.unwrap_err(), FilterError::ThresholdOutOfRange(1.5));
    }

    #[test]
    fn drops_blocks_with_excluded_tag_or_ancestor() {
        let mut nested = paragraph("inside the nav");
        nested.path = vec!["html".into(), "body".into(), "nav".into()];
        let mut direct = block(BlockKind::ListItem { ordered: false }, Some("nav"), "menu");
        direct.word_count = 10;
        let kept = paragraph("body content stays in place");

        let filter = ContentFilter::new(
            params(0.0, ThresholdType::Fixed, 0),
            &["NAV".to_string()],
            false,
        )
        .unwrap();
        let pruned = filter.prune(&tree(vec![nested, direct, kept.clone()]));

        assert_eq!(pruned.blocks, vec![kept]);
    }

    #[test]
    fn overlay_blocks_drop_only_when_requested() {
        let mut popup = paragraph("subscribe to our newsletter today please");
        popup.overlay = true;
        let content = paragraph("actual article body");

        let base = params(0.0, ThresholdType::Fixed, 0);
        let keep_overlays = ContentFilter::new(base, &[], false).unwrap();
        let drop_overlays = ContentFilter::new(base, &[], true).unwrap();

        assert_eq!(
            keep_overlays
                .prune(&tree(vec![popup.clone(), content.clone()]))
                .blocks
                .len(),
            2
        );
        assert_eq!(
            drop_overlays.prune(&tree(vec![popup, content.clone()])).blocks,
            vec![content]
        );
    }

    #[test]
    fn score_equal_to_threshold_is_retained() {
        // Two words, zero descendant tags: 2 / (2 + 2) = 0.5 exactly.
        let two_words = paragraph("two words");
        assert_eq!(score(&two_words), 0.5);

        let at_cutoff = ContentFilter::new(params(0.5, ThresholdType::Fixed, 0), &[], false)
            .unwrap()
            .prune(&tree(vec![two_words.clone()]));
        assert_eq!(at_cutoff.blocks.len(), 1);

        let above_cutoff = ContentFilter::new(params(0.51, ThresholdType::Fixed, 0), &[], false)
            .unwrap()
            .prune(&tree(vec![two_words]));
        assert!(above_cutoff.blocks.is_empty());
    }

    #[test]
    fn word_floor_applies_regardless_of_score() {
        let dense_but_short = paragraph("dense short");
        let long_enough =
            paragraph("this block easily satisfies the configured minimum word requirement");

        let filter = ContentFilter::new(params(0.0, ThresholdType::Fixed, 5), &[], false).unwrap();
        let pruned = filter.prune(&tree(vec![dense_but_short, long_enough.clone()]));

        assert_eq!(pruned.blocks, vec![long_enough]);
    }

    #[test]
    fn zero_threshold_and_zero_floor_skip_density_pruning() {
        let heading = block(BlockKind::Heading { level: 2 }, Some("h2"), "Tiny");
        let mut noisy = paragraph("a");
        noisy.tag_count = 40;
        let blocks = vec![heading, noisy, paragraph("regular paragraph text")];

        let filter = ContentFilter::new(params(0.0, ThresholdType::Fixed, 0), &[], false).unwrap();
        let pruned = filter.prune(&tree(blocks.clone()));

        assert_eq!(pruned.blocks, blocks);
    }

    #[test]
    fn dynamic_cutoff_scales_with_document_scores() {
        let strong = paragraph("a long informative paragraph with plenty of real words inside it");
        let mut weak = block(BlockKind::ListItem { ordered: false }, Some("li"), "ok");
        weak.tag_count = 6;

        let filter =
            ContentFilter::new(params(0.9, ThresholdType::Dynamic, 0), &[], false).unwrap();
        let pruned = filter.prune(&tree(vec![strong.clone(), weak]));

        assert_eq!(pruned.blocks, vec![strong]);
    }

    #[test]
    fn pruning_is_deterministic() {
        let blocks = vec![
            paragraph("first candidate paragraph with some words"),
            block(BlockKind::ListItem { ordered: false }, Some("li"), "short"),
            block(BlockKind::Heading { level: 1 }, Some("h1"), "Title"),
        ];
        let filter =
            ContentFilter::new(params(0.4, ThresholdType::Dynamic, 0), &[], false).unwrap();

        let first = filter.prune(&tree(blocks.clone()));
        let second = filter.prune(&tree(blocks));
        assert_eq!(first, second);
    }

    #[test]
    fn pruning_preserves_document_order() {
        let blocks = vec![
            paragraph("alpha paragraph comes first in the document"),
            paragraph("beta paragraph comes second in the document"),
            paragraph("gamma paragraph comes third in the document"),
        ];
        let filter = ContentFilter::new(params(0.2, ThresholdType::Fixed, 0), &[], false).unwrap();
        let pruned = filter.prune(&tree(blocks));

        let order: Vec<&str> = pruned
            .blocks
            .iter()
            .map(|b| b.text.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(order, ["alpha", "beta", "gamma"]);
    }
}

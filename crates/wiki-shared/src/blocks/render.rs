//! Read-only rendering of block sequences.
//!
//! Rendering is a pure function of a block and its sibling sequence. The
//! output is a small render tree that terminal (or any other) front-ends turn
//! into their own widgets; the page viewer and the editor preview share it.

use super::{Block, BlockKind, BlockType, FontSize};

/// Vertical spacing placed before a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gap {
    /// First block of a sequence.
    None,
    /// Between two adjacent list items.
    Tight,
    Wide,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListMarker {
    Bullet,
    Ordinal(usize),
    Checkbox(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
    },
    ListItem {
        marker: ListMarker,
        text: String,
    },
    Quote {
        text: String,
    },
    Callout {
        text: String,
    },
    Code {
        text: String,
    },
    Divider,
    /// Double activation opens the lightbox on `url`.
    Image {
        url: String,
    },
    Video {
        url: String,
    },
    Table {
        rows: Vec<Vec<String>>,
    },
    Columns {
        columns: Vec<Vec<RenderedBlock>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBlock {
    pub id: String,
    pub gap: Gap,
    pub size: FontSize,
    pub node: RenderNode,
}

/// Displayed number of the `number` block at `index`, or `None` for any
/// other block. Runs are positional: the count restarts after any
/// non-`number` block.
pub fn ordinal(blocks: &[Block], index: usize) -> Option<usize> {
    let block = blocks.get(index)?;
    if block.block_type() != BlockType::Number {
        return None;
    }

    let run = blocks[..index]
        .iter()
        .rev()
        .take_while(|b| b.block_type() == BlockType::Number)
        .count();
    Some(run + 1)
}

pub fn gap_before(blocks: &[Block], index: usize) -> Gap {
    if index == 0 || index >= blocks.len() {
        return Gap::None;
    }
    if blocks[index - 1].block_type().is_list_item() && blocks[index].block_type().is_list_item() {
        Gap::Tight
    } else {
        Gap::Wide
    }
}

pub fn render_document(blocks: &[Block]) -> Vec<RenderedBlock> {
    (0..blocks.len())
        .map(|index| render_block(blocks, index))
        .collect()
}

/// Render the block at `index` of `siblings`.
///
/// Panics if `index` is out of bounds.
pub fn render_block(siblings: &[Block], index: usize) -> RenderedBlock {
    let block = &siblings[index];
    let node = match &block.kind {
        BlockKind::Text { content } => RenderNode::Paragraph {
            text: content.clone(),
        },
        BlockKind::H1 { content } => heading(1, content),
        BlockKind::H2 { content } => heading(2, content),
        BlockKind::H3 { content } => heading(3, content),
        BlockKind::Image { content } => RenderNode::Image {
            url: content.clone(),
        },
        BlockKind::Video { content } => RenderNode::Video {
            url: content.clone(),
        },
        BlockKind::Code { content } => RenderNode::Code {
            text: content.clone(),
        },
        BlockKind::Quote { content } => RenderNode::Quote {
            text: content.clone(),
        },
        BlockKind::Callout { content } => RenderNode::Callout {
            text: content.clone(),
        },
        BlockKind::Divider => RenderNode::Divider,
        BlockKind::Todo { content, checked } => RenderNode::ListItem {
            marker: ListMarker::Checkbox(*checked),
            text: content.clone(),
        },
        BlockKind::Bullet { content } => RenderNode::ListItem {
            marker: ListMarker::Bullet,
            text: content.clone(),
        },
        BlockKind::Number { content } => RenderNode::ListItem {
            marker: ListMarker::Ordinal(ordinal(siblings, index).unwrap_or(1)),
            text: content.clone(),
        },
        BlockKind::Table { table_data } => RenderNode::Table {
            rows: table_data.clone(),
        },
        BlockKind::Columns { columns } => RenderNode::Columns {
            columns: columns
                .iter()
                .map(|column| render_document(&column.blocks))
                .collect(),
        },
    };

    RenderedBlock {
        id: block.id.clone(),
        gap: gap_before(siblings, index),
        size: block.effective_font_size(),
        node,
    }
}

fn heading(level: u8, text: &str) -> RenderNode {
    RenderNode::Heading {
        level,
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, Column};
    use proptest::prelude::*;

    fn block(ty: BlockType, content: &str) -> Block {
        let mut b = Block::new(ty);
        if let Some(c) = b.kind.content_mut() {
            *c = content.to_string();
        }
        b
    }

    #[test]
    fn numbering_restarts_after_text() {
        let doc = vec![
            block(BlockType::Number, "a"),
            block(BlockType::Number, "b"),
            block(BlockType::Text, "c"),
            block(BlockType::Number, "d"),
        ];

        let ordinals: Vec<Option<usize>> = (0..doc.len()).map(|i| ordinal(&doc, i)).collect();
        assert_eq!(ordinals, vec![Some(1), Some(2), None, Some(1)]);

        let rendered = render_document(&doc);
        assert_eq!(
            rendered[1].node,
            RenderNode::ListItem {
                marker: ListMarker::Ordinal(2),
                text: "b".into()
            }
        );
    }

    #[test]
    fn bullets_do_not_continue_numbering() {
        let doc = vec![
            block(BlockType::Number, "a"),
            block(BlockType::Bullet, "b"),
            block(BlockType::Number, "c"),
        ];
        assert_eq!(ordinal(&doc, 2), Some(1));
    }

    #[test]
    fn list_items_sit_tight_together() {
        let doc = vec![
            block(BlockType::Text, "intro"),
            block(BlockType::Bullet, "one"),
            block(BlockType::Todo, "two"),
            block(BlockType::Number, "three"),
            block(BlockType::Quote, "done"),
        ];
        let gaps: Vec<Gap> = (0..doc.len()).map(|i| gap_before(&doc, i)).collect();
        assert_eq!(
            gaps,
            vec![Gap::None, Gap::Wide, Gap::Tight, Gap::Tight, Gap::Wide]
        );
    }

    #[test]
    fn columns_number_independently() {
        let mut columns_block = Block::new(BlockType::Columns);
        columns_block.kind = BlockKind::Columns {
            columns: vec![Column {
                id: "c1".into(),
                blocks: vec![block(BlockType::Number, "x"), block(BlockType::Number, "y")],
            }],
        };
        let doc = vec![block(BlockType::Number, "outer"), columns_block];

        let rendered = render_document(&doc);
        match &rendered[1].node {
            RenderNode::Columns { columns } => {
                assert_eq!(
                    columns[0][1].node,
                    RenderNode::ListItem {
                        marker: ListMarker::Ordinal(2),
                        text: "y".into()
                    }
                );
                assert_eq!(columns[0][1].gap, Gap::Tight);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn headings_use_type_default_size_unless_overridden() {
        let mut doc = vec![block(BlockType::H2, "Intro"), block(BlockType::H2, "Small")];
        doc[1].font_size = Some(FontSize::Sm);

        let rendered = render_document(&doc);
        assert_eq!(rendered[0].size, FontSize::Xl2);
        assert_eq!(rendered[1].size, FontSize::Sm);
        assert_eq!(
            rendered[0].node,
            RenderNode::Heading {
                level: 2,
                text: "Intro".into()
            }
        );
    }

    fn arb_type() -> impl Strategy<Value = BlockType> {
        prop::sample::select(vec![
            BlockType::Text,
            BlockType::Number,
            BlockType::Number,
            BlockType::Bullet,
            BlockType::Todo,
            BlockType::H1,
        ])
    }

    proptest! {
        #[test]
        fn ordinal_counts_preceding_number_run(types in prop::collection::vec(arb_type(), 0..24)) {
            let doc: Vec<Block> = types.iter().map(|ty| Block::new(*ty)).collect();

            for i in 0..doc.len() {
                let expected = if doc[i].block_type() == BlockType::Number {
                    let mut run = 0;
                    let mut j = i;
                    while j > 0 && doc[j - 1].block_type() == BlockType::Number {
                        run += 1;
                        j -= 1;
                    }
                    Some(run + 1)
                } else {
                    None
                };
                prop_assert_eq!(ordinal(&doc, i), expected);
            }
        }

        #[test]
        fn rendering_is_repeatable(types in prop::collection::vec(arb_type(), 0..16)) {
            let doc: Vec<Block> = types.iter().map(|ty| Block::new(*ty)).collect();
            prop_assert_eq!(render_document(&doc), render_document(&doc));
        }
    }
}

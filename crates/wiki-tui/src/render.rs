//! Terminal rendering of block render trees.

use std::ops::Range;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use wiki_shared::blocks::{Gap, ListMarker, RenderNode, RenderedBlock};
use wiki_shared::FontSize;

/// Lines for a document plus the line range of every block, in the order
/// of [`selectable_blocks`].
pub struct RenderedLines {
    pub lines: Vec<Line<'static>>,
    pub ranges: Vec<Range<usize>>,
}

/// Every block depth-first: a columns block, then its children column by
/// column. This is the order the page viewer selects in.
pub fn selectable_blocks(blocks: &[RenderedBlock]) -> Vec<&RenderedBlock> {
    fn walk<'a>(blocks: &'a [RenderedBlock], out: &mut Vec<&'a RenderedBlock>) {
        for block in blocks {
            out.push(block);
            if let RenderNode::Columns { columns } = &block.node {
                for column in columns {
                    walk(column, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(blocks, &mut out);
    out
}

fn size_style(size: FontSize) -> Style {
    match size {
        FontSize::Xl3 | FontSize::Xl2 => Style::default()
            .add_modifier(Modifier::BOLD)
            .add_modifier(Modifier::UNDERLINED),
        FontSize::Xl | FontSize::Lg => Style::default().add_modifier(Modifier::BOLD),
        FontSize::Base => Style::default(),
        FontSize::Sm => Style::default().add_modifier(Modifier::DIM),
    }
}

pub fn document_lines(blocks: &[RenderedBlock]) -> RenderedLines {
    let mut lines = Vec::new();
    let mut ranges = Vec::with_capacity(blocks.len());

    for block in blocks {
        if block.gap == Gap::Wide {
            lines.push(Line::default());
        }
        push_block(&mut lines, &mut ranges, block, "");
    }

    RenderedLines { lines, ranges }
}

fn push_block(
    out: &mut Vec<Line<'static>>,
    ranges: &mut Vec<Range<usize>>,
    block: &RenderedBlock,
    indent: &str,
) {
    let start = out.len();
    let slot = ranges.len();
    ranges.push(start..start);
    let style = size_style(block.size);
    let prefixed = |spans: Vec<Span<'static>>| {
        let mut all = vec![Span::raw(indent.to_string())];
        all.extend(spans);
        Line::from(all)
    };

    match &block.node {
        RenderNode::Heading { level, text } => {
            let marker = format!("{} ", "#".repeat(usize::from(*level)));
            out.push(prefixed(vec![
                Span::styled(marker, Style::default().fg(Color::DarkGray)),
                Span::styled(text.clone(), style.fg(Color::Cyan)),
            ]));
        }
        RenderNode::Paragraph { text } => {
            for line in text.split('\n') {
                out.push(prefixed(vec![Span::styled(line.to_string(), style)]));
            }
        }
        RenderNode::ListItem { marker, text } => {
            let (marker, done) = match marker {
                ListMarker::Bullet => ("• ".to_string(), false),
                ListMarker::Ordinal(n) => (format!("{n}. "), false),
                ListMarker::Checkbox(true) => ("[x] ".to_string(), true),
                ListMarker::Checkbox(false) => ("[ ] ".to_string(), false),
            };
            let text_style = if done {
                style.add_modifier(Modifier::CROSSED_OUT).fg(Color::DarkGray)
            } else {
                style
            };
            out.push(prefixed(vec![
                Span::styled(marker, Style::default().fg(Color::Yellow)),
                Span::styled(text.clone(), text_style),
            ]));
        }
        RenderNode::Quote { text } => {
            for line in text.split('\n') {
                out.push(prefixed(vec![
                    Span::styled("▎ ", Style::default().fg(Color::DarkGray)),
                    Span::styled(line.to_string(), style.add_modifier(Modifier::ITALIC)),
                ]));
            }
        }
        RenderNode::Callout { text } => {
            for line in text.split('\n') {
                out.push(prefixed(vec![
                    Span::styled("ℹ ", Style::default().fg(Color::Blue)),
                    Span::styled(line.to_string(), style.fg(Color::Blue)),
                ]));
            }
        }
        RenderNode::Code { text } => {
            let code_style = style.fg(Color::Green);
            for line in text.split('\n') {
                out.push(prefixed(vec![
                    Span::styled("  ", Style::default()),
                    Span::styled(line.to_string(), code_style),
                ]));
            }
        }
        RenderNode::Divider => {
            out.push(prefixed(vec![Span::styled(
                "─".repeat(40),
                Style::default().fg(Color::DarkGray),
            )]));
        }
        RenderNode::Image { url } => {
            out.push(prefixed(vec![
                Span::styled("[image] ", Style::default().fg(Color::Magenta)),
                Span::styled(url.clone(), Style::default().add_modifier(Modifier::UNDERLINED)),
            ]));
        }
        RenderNode::Video { url } => {
            out.push(prefixed(vec![
                Span::styled("[video] ", Style::default().fg(Color::Magenta)),
                Span::raw(url.clone()),
            ]));
        }
        RenderNode::Table { rows } => {
            for (i, row) in table_rows(rows).into_iter().enumerate() {
                let row_style = if i == 0 {
                    style.add_modifier(Modifier::BOLD)
                } else {
                    style
                };
                out.push(prefixed(vec![Span::styled(row, row_style)]));
            }
        }
        RenderNode::Columns { columns } => {
            let nested = format!("{indent}│ ");
            for (i, column) in columns.iter().enumerate() {
                out.push(prefixed(vec![Span::styled(
                    format!("┌ column {}", i + 1),
                    Style::default().fg(Color::DarkGray),
                )]));
                for child in column {
                    if child.gap == Gap::Wide {
                        out.push(Line::from(nested.clone()));
                    }
                    push_block(out, ranges, child, &nested);
                }
            }
        }
    }

    ranges[slot] = start..out.len();
}

/// Cells padded to their column width and separated by ` │ `.
pub fn table_rows(rows: &[Vec<String>]) -> Vec<String> {
    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..cols)
        .map(|c| {
            rows.iter()
                .filter_map(|row| row.get(c))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    rows.iter()
        .map(|row| {
            widths
                .iter()
                .enumerate()
                .map(|(c, width)| {
                    let cell = row.get(c).map(String::as_str).unwrap_or("");
                    format!("{cell:<width$}")
                })
                .collect::<Vec<_>>()
                .join(" │ ")
                .trim_end()
                .to_string()
        })
        .collect()
}

//! In-place editing of block documents.
//!
//! Every operation addresses a block sequence through a [`SeqPath`]: the
//! top-level document, or the `blocks` of one column of a `columns` block.
//! All mutations go through [`DocumentEditor::apply_at`], so nested edits land
//! in the owning column instead of the outer sequence.

use super::{Block, BlockKind, BlockType, Column, FontSize};

pub const MAX_COLUMNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("Path does not lead to a block sequence")]
    InvalidPath,

    #[error("Block {0} not found")]
    BlockNotFound(String),

    #[error("Column {0} not found")]
    ColumnNotFound(String),

    #[error("Index {0} is out of bounds")]
    OutOfBounds(usize),

    #[error("{0} blocks have no text content")]
    NoContent(&'static str),

    #[error("Expected a {expected} block, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("A columns block holds at most {MAX_COLUMNS} columns")]
    ColumnLimit,

    #[error("A columns block keeps at least one column")]
    LastColumn,

    #[error("Columns cannot be nested inside columns")]
    NestedColumns,
}

/// Index path from the document root to a block sequence.
///
/// Each step is `(block_index, column_index)`: the `columns` block at
/// `block_index` in the current sequence, then its column `column_index`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SeqPath(Vec<(usize, usize)>);

impl SeqPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[(usize, usize)] {
        &self.0
    }

    /// Path of column `column_index` of the columns block at `block_index`.
    pub fn column(&self, block_index: usize, column_index: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push((block_index, column_index));
        Self(steps)
    }

    /// Path one level up, with the step that was removed.
    pub fn parent(&self) -> Option<(Self, (usize, usize))> {
        let (last, rest) = self.0.split_last()?;
        Some((Self(rest.to_vec()), *last))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEditor {
    blocks: Vec<Block>,
    focused: Option<String>,
}

impl DocumentEditor {
    /// Wrap a document. An empty document starts with one empty text block.
    pub fn new(mut blocks: Vec<Block>) -> Self {
        if blocks.is_empty() {
            blocks.push(Block::new(BlockType::Text));
        }
        Self {
            blocks,
            focused: None,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Block that should receive input focus next.
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn take_focus(&mut self) -> Option<String> {
        self.focused.take()
    }

    pub fn sequence(&self, path: &SeqPath) -> Result<&[Block], EditError> {
        let mut seq: &[Block] = &self.blocks;
        for &(block_index, column_index) in path.steps() {
            let block = seq.get(block_index).ok_or(EditError::InvalidPath)?;
            seq = match &block.kind {
                BlockKind::Columns { columns } => {
                    &columns.get(column_index).ok_or(EditError::InvalidPath)?.blocks
                }
                _ => return Err(EditError::InvalidPath),
            };
        }
        Ok(seq)
    }

    /// Run `mutation` against the sequence addressed by `path`.
    pub fn apply_at<R>(
        &mut self,
        path: &SeqPath,
        mutation: impl FnOnce(&mut Vec<Block>) -> Result<R, EditError>,
    ) -> Result<R, EditError> {
        let seq = resolve_mut(&mut self.blocks, path.steps())?;
        mutation(seq)
    }

    pub fn index_of(&self, path: &SeqPath, id: &str) -> Result<usize, EditError> {
        self.sequence(path)?
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| EditError::BlockNotFound(id.to_string()))
    }

    /// Insert a fresh `ty` block right after `index` and focus it.
    pub fn insert_after(
        &mut self,
        path: &SeqPath,
        index: usize,
        ty: BlockType,
    ) -> Result<String, EditError> {
        if !path.is_root() && ty == BlockType::Columns {
            return Err(EditError::NestedColumns);
        }

        let block = Block::new(ty);
        let id = block.id.clone();
        self.apply_at(path, |seq| {
            if index >= seq.len() {
                return Err(EditError::OutOfBounds(index));
            }
            seq.insert(index + 1, block);
            Ok(())
        })?;

        self.focused = Some(id.clone());
        Ok(id)
    }

    /// Add a fresh `ty` block at the end of the sequence and focus it.
    pub fn append(&mut self, path: &SeqPath, ty: BlockType) -> Result<String, EditError> {
        if !path.is_root() && ty == BlockType::Columns {
            return Err(EditError::NestedColumns);
        }

        let block = Block::new(ty);
        let id = block.id.clone();
        self.apply_at(path, |seq| {
            seq.push(block);
            Ok(())
        })?;

        self.focused = Some(id.clone());
        Ok(id)
    }

    pub fn update_content(
        &mut self,
        path: &SeqPath,
        id: &str,
        content: impl Into<String>,
    ) -> Result<(), EditError> {
        let content = content.into();
        self.with_block(path, id, |block| {
            let ty = block.block_type();
            let slot = block
                .kind
                .content_mut()
                .ok_or(EditError::NoContent(ty.as_str()))?;
            *slot = content;
            Ok(())
        })
    }

    pub fn update_checked(&mut self, path: &SeqPath, id: &str, value: bool) -> Result<(), EditError> {
        self.with_block(path, id, |block| match &mut block.kind {
            BlockKind::Todo { checked, .. } => {
                *checked = value;
                Ok(())
            }
            other => Err(EditError::WrongType {
                expected: BlockType::Todo.as_str(),
                found: other.block_type().as_str(),
            }),
        })
    }

    pub fn update_table_data(
        &mut self,
        path: &SeqPath,
        id: &str,
        grid: Vec<Vec<String>>,
    ) -> Result<(), EditError> {
        self.with_block(path, id, |block| match &mut block.kind {
            BlockKind::Table { table_data } => {
                *table_data = grid;
                Ok(())
            }
            other => Err(EditError::WrongType {
                expected: BlockType::Table.as_str(),
                found: other.block_type().as_str(),
            }),
        })
    }

    pub fn update_font_size(
        &mut self,
        path: &SeqPath,
        id: &str,
        size: Option<FontSize>,
    ) -> Result<(), EditError> {
        self.with_block(path, id, |block| {
            block.font_size = size;
            Ok(())
        })
    }

    /// Remove a block. The top-level document never becomes empty: removing
    /// its last block leaves an empty text block in its place.
    pub fn delete(&mut self, path: &SeqPath, id: &str) -> Result<(), EditError> {
        let keep_one = path.is_root();
        self.apply_at(path, |seq| {
            let index = seq
                .iter()
                .position(|b| b.id == id)
                .ok_or_else(|| EditError::BlockNotFound(id.to_string()))?;

            if keep_one && seq.len() == 1 {
                let block = &mut seq[index];
                block.kind = BlockKind::empty(BlockType::Text);
                block.font_size = None;
            } else {
                seq.remove(index);
            }
            Ok(())
        })?;

        if self.focused.as_deref() == Some(id) {
            self.focused = None;
        }
        Ok(())
    }

    /// Move the block at `from` so that it ends up at `to`.
    pub fn reorder(&mut self, path: &SeqPath, from: usize, to: usize) -> Result<(), EditError> {
        self.apply_at(path, |seq| {
            if from >= seq.len() {
                return Err(EditError::OutOfBounds(from));
            }
            if to >= seq.len() {
                return Err(EditError::OutOfBounds(to));
            }
            if from != to {
                let block = seq.remove(from);
                seq.insert(to, block);
            }
            Ok(())
        })
    }

    /// Append an empty column; returns its id.
    pub fn add_column(&mut self, path: &SeqPath, block_id: &str) -> Result<String, EditError> {
        self.with_columns(path, block_id, |columns| {
            if columns.len() >= MAX_COLUMNS {
                return Err(EditError::ColumnLimit);
            }
            let column = Column::new();
            let id = column.id.clone();
            columns.push(column);
            Ok(id)
        })
    }

    pub fn remove_column(
        &mut self,
        path: &SeqPath,
        block_id: &str,
        column_id: &str,
    ) -> Result<(), EditError> {
        self.with_columns(path, block_id, |columns| {
            if columns.len() <= 1 {
                return Err(EditError::LastColumn);
            }
            let index = columns
                .iter()
                .position(|c| c.id == column_id)
                .ok_or_else(|| EditError::ColumnNotFound(column_id.to_string()))?;
            columns.remove(index);
            Ok(())
        })
    }

    /// Enter on a text-bearing block: continue with a block of the same type.
    pub fn enter(&mut self, path: &SeqPath, id: &str) -> Result<String, EditError> {
        let index = self.index_of(path, id)?;
        let ty = self.sequence(path)?[index].block_type();
        if self.sequence(path)?[index].content().is_none() {
            return Err(EditError::NoContent(ty.as_str()));
        }
        self.insert_after(path, index, ty)
    }

    /// Backspace on an empty block turns list items back into plain text.
    /// Returns whether anything changed.
    pub fn backspace_on_empty(&mut self, path: &SeqPath, id: &str) -> Result<bool, EditError> {
        self.with_block(path, id, |block| {
            let empty = block.content().is_some_and(str::is_empty);
            if empty && block.block_type().is_list_item() {
                block.kind = BlockKind::empty(BlockType::Text);
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    pub fn add_table_row(&mut self, path: &SeqPath, id: &str) -> Result<(), EditError> {
        self.with_table(path, id, |grid| {
            let width = grid.first().map(Vec::len).unwrap_or(2).max(1);
            grid.push(vec![String::new(); width]);
        })
    }

    pub fn add_table_column(&mut self, path: &SeqPath, id: &str) -> Result<(), EditError> {
        self.with_table(path, id, |grid| {
            if grid.is_empty() {
                grid.push(vec![String::new()]);
            }
            for row in grid.iter_mut() {
                row.push(String::new());
            }
        })
    }

    fn with_block<R>(
        &mut self,
        path: &SeqPath,
        id: &str,
        f: impl FnOnce(&mut Block) -> Result<R, EditError>,
    ) -> Result<R, EditError> {
        self.apply_at(path, |seq| {
            let block = seq
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or_else(|| EditError::BlockNotFound(id.to_string()))?;
            f(block)
        })
    }

    fn with_columns<R>(
        &mut self,
        path: &SeqPath,
        block_id: &str,
        f: impl FnOnce(&mut Vec<Column>) -> Result<R, EditError>,
    ) -> Result<R, EditError> {
        self.with_block(path, block_id, |block| match &mut block.kind {
            BlockKind::Columns { columns } => f(columns),
            other => Err(EditError::WrongType {
                expected: BlockType::Columns.as_str(),
                found: other.block_type().as_str(),
            }),
        })
    }

    fn with_table(
        &mut self,
        path: &SeqPath,
        id: &str,
        f: impl FnOnce(&mut Vec<Vec<String>>),
    ) -> Result<(), EditError> {
        self.with_block(path, id, |block| match &mut block.kind {
            BlockKind::Table { table_data } => {
                f(table_data);
                Ok(())
            }
            other => Err(EditError::WrongType {
                expected: BlockType::Table.as_str(),
                found: other.block_type().as_str(),
            }),
        })
    }
}

fn resolve_mut<'a>(
    mut seq: &'a mut Vec<Block>,
    steps: &[(usize, usize)],
) -> Result<&'a mut Vec<Block>, EditError> {
    for &(block_index, column_index) in steps {
        let current = seq;
        let block = current.get_mut(block_index).ok_or(EditError::InvalidPath)?;
        seq = match &mut block.kind {
            BlockKind::Columns { columns } => {
                &mut columns
                    .get_mut(column_index)
                    .ok_or(EditError::InvalidPath)?
                    .blocks
            }
            _ => return Err(EditError::InvalidPath),
        };
    }
    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(types: &[BlockType]) -> DocumentEditor {
        DocumentEditor::new(types.iter().map(|ty| Block::new(*ty)).collect())
    }

    fn column_count(editor: &DocumentEditor, index: usize) -> usize {
        match &editor.blocks()[index].kind {
            BlockKind::Columns { columns } => columns.len(),
            other => panic!("not a columns block: {other:?}"),
        }
    }

    #[test]
    fn insert_then_delete_restores_document() {
        let mut editor = doc(&[BlockType::Text, BlockType::H1, BlockType::Bullet]);
        let before = editor.blocks().to_vec();
        let root = SeqPath::root();

        let id = editor.insert_after(&root, 1, BlockType::Todo).unwrap();
        assert_eq!(editor.blocks().len(), 4);
        assert_eq!(editor.blocks()[2].id, id);
        assert_eq!(editor.focused(), Some(id.as_str()));
        assert_eq!(
            editor.blocks()[2].kind,
            BlockKind::Todo {
                content: String::new(),
                checked: false
            }
        );

        editor.delete(&root, &id).unwrap();
        assert_eq!(editor.blocks(), before.as_slice());
        assert_eq!(editor.focused(), None);
    }

    #[test]
    fn deleting_last_top_level_block_leaves_empty_text() {
        let mut editor = doc(&[BlockType::H1]);
        let id = editor.blocks()[0].id.clone();
        editor.update_content(&SeqPath::root(), &id, "Title").unwrap();

        editor.delete(&SeqPath::root(), &id).unwrap();

        assert_eq!(editor.blocks().len(), 1);
        assert_eq!(
            editor.blocks()[0].kind,
            BlockKind::Text {
                content: String::new()
            }
        );
    }

    #[test]
    fn nested_column_may_become_empty() {
        let mut editor = doc(&[BlockType::Columns]);
        let column = SeqPath::root().column(0, 0);
        let inner = editor.sequence(&column).unwrap()[0].id.clone();

        editor.delete(&column, &inner).unwrap();

        assert!(editor.sequence(&column).unwrap().is_empty());
        assert_eq!(editor.sequence(&SeqPath::root().column(0, 1)).unwrap().len(), 1);
    }

    #[test]
    fn column_limit_is_five() {
        let mut editor = doc(&[BlockType::Columns]);
        let root = SeqPath::root();
        let id = editor.blocks()[0].id.clone();

        for _ in 0..3 {
            editor.add_column(&root, &id).unwrap();
        }
        assert_eq!(column_count(&editor, 0), 5);

        assert_eq!(editor.add_column(&root, &id), Err(EditError::ColumnLimit));
        assert_eq!(column_count(&editor, 0), 5);
    }

    #[test]
    fn last_column_cannot_be_removed() {
        let mut editor = doc(&[BlockType::Columns]);
        let root = SeqPath::root();
        let id = editor.blocks()[0].id.clone();
        let column_ids: Vec<String> = match &editor.blocks()[0].kind {
            BlockKind::Columns { columns } => columns.iter().map(|c| c.id.clone()).collect(),
            _ => unreachable!(),
        };

        editor.remove_column(&root, &id, &column_ids[0]).unwrap();
        assert_eq!(
            editor.remove_column(&root, &id, &column_ids[1]),
            Err(EditError::LastColumn)
        );
        assert_eq!(column_count(&editor, 0), 1);
    }

    #[test]
    fn edits_inside_a_column_stay_in_that_column() {
        let mut editor = doc(&[BlockType::Text, BlockType::Columns]);
        let second = SeqPath::root().column(1, 1);
        let inner = editor.sequence(&second).unwrap()[0].id.clone();

        editor.update_content(&second, &inner, "nested").unwrap();
        let added = editor.enter(&second, &inner).unwrap();

        assert_eq!(editor.blocks().len(), 2);
        let seq = editor.sequence(&second).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0].content(), Some("nested"));
        assert_eq!(seq[1].id, added);
        assert_eq!(editor.sequence(&SeqPath::root().column(1, 0)).unwrap().len(), 1);

        // Lookups are scoped to the addressed sequence.
        assert_eq!(
            editor.update_content(&SeqPath::root(), &inner, "x"),
            Err(EditError::BlockNotFound(inner.clone()))
        );
    }

    #[test]
    fn columns_do_not_nest() {
        let mut editor = doc(&[BlockType::Columns]);
        let column = SeqPath::root().column(0, 0);
        assert_eq!(
            editor.append(&column, BlockType::Columns),
            Err(EditError::NestedColumns)
        );
        assert!(!BlockType::IN_COLUMN.contains(&BlockType::Columns));
    }

    #[test]
    fn enter_continues_the_list() {
        let mut editor = doc(&[BlockType::Bullet]);
        let root = SeqPath::root();
        let first = editor.blocks()[0].id.clone();

        let next = editor.enter(&root, &first).unwrap();

        assert_eq!(editor.blocks()[1].block_type(), BlockType::Bullet);
        assert_eq!(editor.take_focus(), Some(next));
    }

    #[test]
    fn enter_on_divider_is_refused() {
        let mut editor = doc(&[BlockType::Divider]);
        let id = editor.blocks()[0].id.clone();
        assert_eq!(
            editor.enter(&SeqPath::root(), &id),
            Err(EditError::NoContent("divider"))
        );
    }

    #[test]
    fn backspace_on_empty_list_item_demotes_to_text() {
        let mut editor = doc(&[BlockType::Number, BlockType::Quote, BlockType::Todo]);
        let root = SeqPath::root();
        let ids: Vec<String> = editor.blocks().iter().map(|b| b.id.clone()).collect();

        assert!(editor.backspace_on_empty(&root, &ids[0]).unwrap());
        assert_eq!(editor.blocks()[0].block_type(), BlockType::Text);
        assert_eq!(editor.blocks()[0].id, ids[0]);

        assert!(!editor.backspace_on_empty(&root, &ids[1]).unwrap());
        assert_eq!(editor.blocks()[1].block_type(), BlockType::Quote);

        editor.update_content(&root, &ids[2], "not empty").unwrap();
        assert!(!editor.backspace_on_empty(&root, &ids[2]).unwrap());
        assert_eq!(editor.blocks()[2].block_type(), BlockType::Todo);
    }

    #[test]
    fn reorder_is_a_positional_move() {
        let mut editor = doc(&[BlockType::H1, BlockType::H2, BlockType::H3]);
        editor.reorder(&SeqPath::root(), 0, 2).unwrap();

        let types: Vec<BlockType> = editor.blocks().iter().map(Block::block_type).collect();
        assert_eq!(types, vec![BlockType::H2, BlockType::H3, BlockType::H1]);
        assert_eq!(
            editor.reorder(&SeqPath::root(), 0, 3),
            Err(EditError::OutOfBounds(3))
        );
    }

    #[test]
    fn typed_updates_check_the_block_type() {
        let mut editor = doc(&[BlockType::Todo, BlockType::Table]);
        let root = SeqPath::root();
        let todo = editor.blocks()[0].id.clone();
        let table = editor.blocks()[1].id.clone();

        editor.update_checked(&root, &todo, true).unwrap();
        assert!(matches!(
            editor.update_checked(&root, &table, true),
            Err(EditError::WrongType { .. })
        ));

        editor.add_table_row(&root, &table).unwrap();
        editor.add_table_column(&root, &table).unwrap();
        match &editor.blocks()[1].kind {
            BlockKind::Table { table_data } => {
                assert_eq!(table_data.len(), 3);
                assert!(table_data.iter().all(|row| row.len() == 3));
            }
            _ => unreachable!(),
        }

        editor
            .update_font_size(&root, &todo, Some(FontSize::Lg))
            .unwrap();
        assert_eq!(editor.blocks()[0].font_size, Some(FontSize::Lg));
    }

    #[test]
    fn invalid_paths_are_reported() {
        let mut editor = doc(&[BlockType::Text]);
        let bogus = SeqPath::root().column(0, 0);
        assert_eq!(
            editor.append(&bogus, BlockType::Text),
            Err(EditError::InvalidPath)
        );
        assert_eq!(
            bogus.parent(),
            Some((SeqPath::root(), (0, 0)))
        );
    }
}

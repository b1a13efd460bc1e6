//! Editing session for one page: cursor, modes and the block document.

use wiki_shared::api::UpdatePageRequest;
use wiki_shared::blocks::{render_document, DocumentEditor, EditError, RenderedBlock, SeqPath};
use wiki_shared::{Block, BlockKind, BlockType, FontSize, Page, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickTarget {
    /// Below the block under the cursor.
    After,
    /// At the end of the current sequence.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Normal,
    /// Typing into the block under the cursor.
    Insert,
    Picker(PickTarget),
}

pub struct EditorState {
    pub page_id: i64,
    pub slug: String,
    pub title: String,
    pub tag: Option<(String, String)>,
    pub doc: DocumentEditor,
    /// Sequence under edit: the page itself or one column.
    pub path: SeqPath,
    pub cursor: usize,
    /// Selected column when the cursor is on a columns block.
    pub column: usize,
    pub mode: EditMode,
    pub picker_index: usize,
    pub preview: bool,
    pub dirty: bool,
}

impl EditorState {
    pub fn open(page: &Page) -> Result<Self, serde_json::Error> {
        Ok(Self {
            page_id: page.id,
            slug: page.slug.clone(),
            title: page.title.clone(),
            tag: page
                .tag
                .clone()
                .map(|name| (name, page.tag_color.clone().unwrap_or_default())),
            doc: DocumentEditor::new(page.blocks()?),
            path: SeqPath::root(),
            cursor: 0,
            column: 0,
            mode: EditMode::Normal,
            picker_index: 0,
            preview: false,
            dirty: false,
        })
    }

    pub fn sequence(&self) -> &[Block] {
        self.doc.sequence(&self.path).unwrap_or(&[])
    }

    pub fn current(&self) -> Option<&Block> {
        self.sequence().get(self.cursor)
    }

    fn current_id(&self) -> Result<String, EditError> {
        self.current()
            .map(|b| b.id.clone())
            .ok_or(EditError::OutOfBounds(self.cursor))
    }

    /// Move the cursor onto the block the editor just focused.
    fn follow_focus(&mut self) {
        if let Some(id) = self.doc.take_focus() {
            if let Ok(index) = self.doc.index_of(&self.path, &id) {
                self.cursor = index;
                self.column = 0;
            }
        }
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.sequence().len().saturating_sub(1));
    }

    pub fn is_nested(&self) -> bool {
        !self.path.is_root()
    }

    pub fn move_cursor(&mut self, down: bool) {
        let len = self.sequence().len();
        if down && self.cursor + 1 < len {
            self.cursor += 1;
            self.column = 0;
        } else if !down && self.cursor > 0 {
            self.cursor -= 1;
            self.column = 0;
        }
    }

    /// Types offered by the block picker; columns never nest.
    pub fn picker_types(&self) -> &'static [BlockType] {
        if self.is_nested() {
            &BlockType::IN_COLUMN
        } else {
            &BlockType::ALL
        }
    }

    pub fn open_picker(&mut self, target: PickTarget) {
        self.picker_index = 0;
        self.mode = EditMode::Picker(target);
    }

    pub fn move_picker(&mut self, down: bool) {
        let len = self.picker_types().len();
        self.picker_index = if down {
            (self.picker_index + 1) % len
        } else {
            (self.picker_index + len - 1) % len
        };
    }

    /// Insert a block of the highlighted type and start typing into it when
    /// it carries text.
    pub fn pick(&mut self) -> Result<(), EditError> {
        let EditMode::Picker(target) = self.mode else {
            return Ok(());
        };
        let ty = self.picker_types()[self.picker_index];

        match target {
            PickTarget::After if !self.sequence().is_empty() => {
                self.doc.insert_after(&self.path, self.cursor, ty)?;
            }
            _ => {
                self.doc.append(&self.path, ty)?;
            }
        }
        self.follow_focus();
        self.dirty = true;

        self.mode = if self.current().and_then(Block::content).is_some() {
            EditMode::Insert
        } else {
            EditMode::Normal
        };
        Ok(())
    }

    pub fn delete_current(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        self.doc.delete(&self.path, &id)?;
        self.clamp_cursor();
        self.dirty = true;
        Ok(())
    }

    pub fn move_block(&mut self, down: bool) -> Result<(), EditError> {
        let to = if down {
            self.cursor + 1
        } else if self.cursor > 0 {
            self.cursor - 1
        } else {
            return Ok(());
        };
        if to >= self.sequence().len() {
            return Ok(());
        }

        self.doc.reorder(&self.path, self.cursor, to)?;
        self.cursor = to;
        self.dirty = true;
        Ok(())
    }

    pub fn toggle_todo(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        let checked = matches!(
            self.current().map(|b| &b.kind),
            Some(BlockKind::Todo { checked: true, .. })
        );
        self.doc.update_checked(&self.path, &id, !checked)?;
        self.dirty = true;
        Ok(())
    }

    pub fn cycle_font_size(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        let next = self
            .current()
            .map(|b| b.effective_font_size().next())
            .unwrap_or(FontSize::Base);
        self.doc.update_font_size(&self.path, &id, Some(next))?;
        self.dirty = true;
        Ok(())
    }

    pub fn reset_font_size(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        self.doc.update_font_size(&self.path, &id, None)?;
        self.dirty = true;
        Ok(())
    }

    fn column_count(&self) -> usize {
        match self.current().map(|b| &b.kind) {
            Some(BlockKind::Columns { columns }) => columns.len(),
            _ => 0,
        }
    }

    pub fn next_column(&mut self) {
        let count = self.column_count();
        if count > 0 {
            self.column = (self.column + 1) % count;
        }
    }

    pub fn add_column(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        self.doc.add_column(&self.path, &id)?;
        self.column = self.column_count().saturating_sub(1);
        self.dirty = true;
        Ok(())
    }

    pub fn remove_column(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        let column_id = match self.current().map(|b| &b.kind) {
            Some(BlockKind::Columns { columns }) => columns
                .get(self.column)
                .map(|c| c.id.clone())
                .ok_or(EditError::OutOfBounds(self.column))?,
            _ => {
                return Err(EditError::WrongType {
                    expected: BlockType::Columns.as_str(),
                    found: self.current().map_or("none", |b| b.block_type().as_str()),
                })
            }
        };
        self.doc.remove_column(&self.path, &id, &column_id)?;
        self.column = self.column.min(self.column_count().saturating_sub(1));
        self.dirty = true;
        Ok(())
    }

    /// Step into the selected column of the columns block under the cursor.
    pub fn descend(&mut self) -> bool {
        if self.column_count() == 0 {
            return false;
        }
        self.path = self.path.column(self.cursor, self.column);
        self.cursor = 0;
        self.column = 0;
        true
    }

    /// Step back out to the sequence holding the current column.
    pub fn ascend(&mut self) -> bool {
        match self.path.parent() {
            Some((parent, (block_index, column_index))) => {
                self.path = parent;
                self.cursor = block_index;
                self.column = column_index;
                true
            }
            None => false,
        }
    }

    pub fn type_char(&mut self, c: char) -> Result<(), EditError> {
        let id = self.current_id()?;
        let mut content = self.current().and_then(Block::content).unwrap_or_default().to_string();
        content.push(c);
        self.set_content(&id, content)
    }

    /// Drop the last character; on an empty list item, demote it to text.
    pub fn backspace(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        let content = self.current().and_then(Block::content).unwrap_or_default().to_string();

        if content.is_empty() {
            if self.doc.backspace_on_empty(&self.path, &id)? {
                self.dirty = true;
            }
            return Ok(());
        }

        let mut content = content;
        content.pop();
        self.set_content(&id, content)
    }

    /// Enter while typing: code takes a newline, other blocks continue with
    /// a fresh block of the same type.
    pub fn enter(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        if self.current().map(Block::block_type) == Some(BlockType::Code) {
            return self.type_char('\n');
        }
        self.doc.enter(&self.path, &id)?;
        self.follow_focus();
        self.dirty = true;
        Ok(())
    }

    pub fn set_content(&mut self, id: &str, content: String) -> Result<(), EditError> {
        self.doc.update_content(&self.path, id, content)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_current_content(&mut self, content: String) -> Result<(), EditError> {
        let id = self.current_id()?;
        self.set_content(&id, content)
    }

    pub fn set_current_table(&mut self, grid: Vec<Vec<String>>) -> Result<(), EditError> {
        let id = self.current_id()?;
        self.doc.update_table_data(&self.path, &id, grid)?;
        self.dirty = true;
        Ok(())
    }

    pub fn add_table_row(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        self.doc.add_table_row(&self.path, &id)?;
        self.dirty = true;
        Ok(())
    }

    pub fn add_table_column(&mut self) -> Result<(), EditError> {
        let id = self.current_id()?;
        self.doc.add_table_column(&self.path, &id)?;
        self.dirty = true;
        Ok(())
    }

    /// Rotate the page tag through "none" and the known tags. Pages keep a
    /// copy of name and color.
    pub fn cycle_tag(&mut self, tags: &[Tag]) {
        let position = self
            .tag
            .as_ref()
            .and_then(|(name, _)| tags.iter().position(|t| &t.name == name));
        self.tag = match position {
            None => tags.first(),
            Some(i) => tags.get(i + 1),
        }
        .map(|t| (t.name.clone(), t.color.clone()));
        self.dirty = true;
    }

    pub fn preview_blocks(&self) -> Vec<RenderedBlock> {
        render_document(self.doc.blocks())
    }

    pub fn update_request(&self) -> Result<UpdatePageRequest, serde_json::Error> {
        let content = serde_json::to_value(self.doc.blocks())?;
        Ok(UpdatePageRequest {
            title: Some(self.title.clone()),
            content: Some(Some(content)),
            tag: Some(self.tag.as_ref().map(|(name, _)| name.clone())),
            tag_color: Some(self.tag.as_ref().map(|(_, color)| color.clone())),
            ..Default::default()
        })
    }
}

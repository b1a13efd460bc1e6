//! Block documents: the content model of a page.
//!
//! A page body is an ordered `Vec<Block>`. Each block carries exactly the
//! fields its type accepts; `columns` blocks nest further sequences. The JSON
//! form is the flat `{id, type, content, checked, columns, tableData,
//! fontSize}` object stored by the server.

mod editor;
mod render;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use editor::{DocumentEditor, EditError, SeqPath, MAX_COLUMNS};
pub use render::{gap_before, ordinal, render_block, render_document, Gap, ListMarker, RenderNode, RenderedBlock};

/// Fresh opaque id for blocks and columns.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(flatten)]
    pub kind: BlockKind,
    #[serde(rename = "fontSize", default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<FontSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockKind {
    Text {
        #[serde(default)]
        content: String,
    },
    H1 {
        #[serde(default)]
        content: String,
    },
    H2 {
        #[serde(default)]
        content: String,
    },
    H3 {
        #[serde(default)]
        content: String,
    },
    Image {
        /// Image URL.
        #[serde(default)]
        content: String,
    },
    Code {
        #[serde(default)]
        content: String,
    },
    Quote {
        #[serde(default)]
        content: String,
    },
    Divider,
    Callout {
        #[serde(default)]
        content: String,
    },
    Todo {
        #[serde(default)]
        content: String,
        #[serde(default)]
        checked: bool,
    },
    Bullet {
        #[serde(default)]
        content: String,
    },
    Number {
        #[serde(default)]
        content: String,
    },
    Video {
        /// Video URL.
        #[serde(default)]
        content: String,
    },
    Columns {
        #[serde(default)]
        columns: Vec<Column>,
    },
    Table {
        #[serde(rename = "tableData", default)]
        table_data: Vec<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Column {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            blocks: vec![Block::new(BlockType::Text)],
        }
    }
}

impl Default for Column {
    fn default() -> Self {
        Self::new()
    }
}

/// The tag of a block without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Text,
    H1,
    H2,
    H3,
    Image,
    Code,
    Quote,
    Divider,
    Callout,
    Todo,
    Bullet,
    Number,
    Video,
    Columns,
    Table,
}

impl BlockType {
    /// Toolbar order for the top-level picker.
    pub const ALL: [BlockType; 15] = [
        BlockType::Text,
        BlockType::H1,
        BlockType::H2,
        BlockType::H3,
        BlockType::Todo,
        BlockType::Bullet,
        BlockType::Number,
        BlockType::Quote,
        BlockType::Callout,
        BlockType::Image,
        BlockType::Video,
        BlockType::Code,
        BlockType::Table,
        BlockType::Columns,
        BlockType::Divider,
    ];

    /// Types offered inside a column. Columns never nest.
    pub const IN_COLUMN: [BlockType; 12] = [
        BlockType::Text,
        BlockType::H1,
        BlockType::H2,
        BlockType::H3,
        BlockType::Image,
        BlockType::Todo,
        BlockType::Bullet,
        BlockType::Number,
        BlockType::Table,
        BlockType::Code,
        BlockType::Quote,
        BlockType::Callout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::H1 => "h1",
            Self::H2 => "h2",
            Self::H3 => "h3",
            Self::Image => "image",
            Self::Code => "code",
            Self::Quote => "quote",
            Self::Divider => "divider",
            Self::Callout => "callout",
            Self::Todo => "todo",
            Self::Bullet => "bullet",
            Self::Number => "number",
            Self::Video => "video",
            Self::Columns => "columns",
            Self::Table => "table",
        }
    }

    /// Members of a visual list run.
    pub fn is_list_item(&self) -> bool {
        matches!(self, Self::Bullet | Self::Number | Self::Todo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontSize {
    #[serde(rename = "sm")]
    Sm,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "lg")]
    Lg,
    #[serde(rename = "xl")]
    Xl,
    #[serde(rename = "2xl")]
    Xl2,
    #[serde(rename = "3xl")]
    Xl3,
}

impl FontSize {
    pub const ALL: [FontSize; 6] = [
        FontSize::Sm,
        FontSize::Base,
        FontSize::Lg,
        FontSize::Xl,
        FontSize::Xl2,
        FontSize::Xl3,
    ];

    /// Size used when a block carries no override.
    pub fn default_for(ty: BlockType) -> Self {
        match ty {
            BlockType::H1 => Self::Xl3,
            BlockType::H2 => Self::Xl2,
            BlockType::H3 => Self::Xl,
            BlockType::Code => Self::Sm,
            _ => Self::Base,
        }
    }

    /// Next size in the cycle, wrapping after `3xl`.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sm => "sm",
            Self::Base => "base",
            Self::Lg => "lg",
            Self::Xl => "xl",
            Self::Xl2 => "2xl",
            Self::Xl3 => "3xl",
        }
    }
}

impl BlockKind {
    /// Default payload for a freshly created block of `ty`.
    pub fn empty(ty: BlockType) -> Self {
        let content = String::new();
        match ty {
            BlockType::Text => Self::Text { content },
            BlockType::H1 => Self::H1 { content },
            BlockType::H2 => Self::H2 { content },
            BlockType::H3 => Self::H3 { content },
            BlockType::Image => Self::Image { content },
            BlockType::Code => Self::Code { content },
            BlockType::Quote => Self::Quote { content },
            BlockType::Divider => Self::Divider,
            BlockType::Callout => Self::Callout { content },
            BlockType::Todo => Self::Todo {
                content,
                checked: false,
            },
            BlockType::Bullet => Self::Bullet { content },
            BlockType::Number => Self::Number { content },
            BlockType::Video => Self::Video { content },
            BlockType::Columns => Self::Columns {
                columns: vec![Column::new(), Column::new()],
            },
            BlockType::Table => Self::Table {
                table_data: vec![vec![String::new(); 2]; 2],
            },
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Text { .. } => BlockType::Text,
            Self::H1 { .. } => BlockType::H1,
            Self::H2 { .. } => BlockType::H2,
            Self::H3 { .. } => BlockType::H3,
            Self::Image { .. } => BlockType::Image,
            Self::Code { .. } => BlockType::Code,
            Self::Quote { .. } => BlockType::Quote,
            Self::Divider => BlockType::Divider,
            Self::Callout { .. } => BlockType::Callout,
            Self::Todo { .. } => BlockType::Todo,
            Self::Bullet { .. } => BlockType::Bullet,
            Self::Number { .. } => BlockType::Number,
            Self::Video { .. } => BlockType::Video,
            Self::Columns { .. } => BlockType::Columns,
            Self::Table { .. } => BlockType::Table,
        }
    }

    /// The string payload, for types that have one.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Text { content }
            | Self::H1 { content }
            | Self::H2 { content }
            | Self::H3 { content }
            | Self::Image { content }
            | Self::Code { content }
            | Self::Quote { content }
            | Self::Callout { content }
            | Self::Todo { content, .. }
            | Self::Bullet { content }
            | Self::Number { content }
            | Self::Video { content } => Some(content),
            Self::Divider | Self::Columns { .. } | Self::Table { .. } => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Text { content }
            | Self::H1 { content }
            | Self::H2 { content }
            | Self::H3 { content }
            | Self::Image { content }
            | Self::Code { content }
            | Self::Quote { content }
            | Self::Callout { content }
            | Self::Todo { content, .. }
            | Self::Bullet { content }
            | Self::Number { content }
            | Self::Video { content } => Some(content),
            Self::Divider | Self::Columns { .. } | Self::Table { .. } => None,
        }
    }
}

impl Block {
    pub fn new(ty: BlockType) -> Self {
        Self {
            id: new_id(),
            kind: BlockKind::empty(ty),
            font_size: None,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind: BlockKind::Text {
                content: content.into(),
            },
            font_size: None,
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.kind.block_type()
    }

    pub fn content(&self) -> Option<&str> {
        self.kind.content()
    }

    /// Explicit size or the type default.
    pub fn effective_font_size(&self) -> FontSize {
        self.font_size
            .unwrap_or_else(|| FontSize::default_for(self.block_type()))
    }
}

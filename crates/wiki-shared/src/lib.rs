pub mod api;
pub mod blocks;
pub mod models;
pub mod structure;

pub use blocks::{Block, BlockKind, BlockType, Column, FontSize};
pub use models::*;
pub use structure::{NodeKind, StructureNode};

//! Unified structure: categories and pages interleaved in one ordered tree.
//!
//! Categories and pages live in separate tables, each with its own `order`.
//! The structure view merges siblings of both kinds into one list sorted by
//! `order`, and a move rewrites the order of every sibling in that list.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::api::StructureItem;
use crate::models::{CategoryTree, Page, PageWithRelations};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Category,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureNode {
    pub id: i64,
    pub kind: NodeKind,
    pub title: String,
    /// Page slug, used to open the page.
    pub slug: String,
    pub order: i64,
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    /// Key that is unique across both tables.
    pub fn key(&self) -> (NodeKind, i64) {
        (self.kind, self.id)
    }

    fn from_category(tree: &CategoryTree, sub_pages: &SubPages) -> Self {
        let mut children: Vec<StructureNode> = tree
            .all_children
            .iter()
            .map(|child| StructureNode::from_category(child, sub_pages))
            .collect();
        children.extend(
            tree.pages
                .iter()
                .map(|page| StructureNode::from_page(page, sub_pages, &mut HashSet::new())),
        );
        sort_siblings(&mut children);

        StructureNode {
            id: tree.category.id,
            kind: NodeKind::Category,
            title: tree.category.name.clone(),
            slug: tree.category.slug.clone(),
            order: tree.category.order,
            children,
        }
    }

    /// Page node with its sub-pages nested below it. `seen` stops a
    /// parent cycle from recursing forever.
    fn from_page(page: &Page, sub_pages: &SubPages, seen: &mut HashSet<i64>) -> Self {
        seen.insert(page.id);
        let mut children = Vec::new();
        for child in sub_pages.get(&page.id).into_iter().flat_map(|pages| pages.iter()) {
            if child.category_id.is_none() && !seen.contains(&child.id) {
                children.push(StructureNode::from_page(child, sub_pages, seen));
            }
        }
        sort_siblings(&mut children);

        StructureNode {
            id: page.id,
            kind: NodeKind::Page,
            title: page.title.clone(),
            slug: page.slug.clone(),
            order: page.order,
            children,
        }
    }
}

/// Direct sub-pages by parent id. Sub-pages filed in a category already
/// appear under that category and are left out.
type SubPages<'a> = HashMap<i64, &'a Vec<Page>>;

fn sub_pages(pages: &[PageWithRelations]) -> SubPages<'_> {
    pages
        .iter()
        .filter(|p| !p.children.is_empty())
        .map(|p| (p.page.id, &p.children))
        .collect()
}

/// `sort_by_key` is stable, so equal orders keep fetch order.
fn sort_siblings(nodes: &mut [StructureNode]) {
    nodes.sort_by_key(|n| n.order);
}

/// Merge the category tree (`GET /categories`) and the flat page list
/// (`GET /pages`) into the unified structure.
///
/// Only root pages are taken from `pages`; pages filed under a category
/// arrive through that category's `pages`. Sub-pages hang below their
/// parent page node and take no part in sibling ordering.
pub fn build_structure(
    categories: &[CategoryTree],
    pages: &[PageWithRelations],
) -> Vec<StructureNode> {
    let sub_pages = sub_pages(pages);
    let mut roots: Vec<StructureNode> = categories
        .iter()
        .map(|category| StructureNode::from_category(category, &sub_pages))
        .collect();
    roots.extend(
        pages
            .iter()
            .map(|p| &p.page)
            .filter(|page| page.is_root())
            .map(|page| StructureNode::from_page(page, &sub_pages, &mut HashSet::new())),
    );
    sort_siblings(&mut roots);
    roots
}

/// Sibling list that contains the node `(kind, id)`.
///
/// Only category children count as siblings; sub-pages below a page node
/// are never reordered here and yield `None`.
pub fn siblings_of(
    tree: &[StructureNode],
    kind: NodeKind,
    id: i64,
) -> Option<&[StructureNode]> {
    if tree.iter().any(|n| n.kind == kind && n.id == id) {
        return Some(tree);
    }
    tree.iter()
        .filter(|node| node.kind == NodeKind::Category)
        .find_map(|node| siblings_of(&node.children, kind, id))
}

/// Plan the reorder request for moving `(kind, id)` one step among
/// `siblings`.
///
/// Returns `None` when there is nothing to do: the node is missing, already
/// first (moving up) or already last (moving down). Otherwise every sibling
/// gets its positional index after the swap, so earlier gaps or duplicate
/// orders disappear. Siblings absent from `siblings` are not touched, which
/// means a stale view can overwrite concurrent changes.
pub fn plan_move(
    siblings: &[StructureNode],
    kind: NodeKind,
    id: i64,
    direction: Direction,
) -> Option<Vec<StructureItem>> {
    let index = siblings.iter().position(|s| s.kind == kind && s.id == id)?;
    let neighbour = match direction {
        Direction::Up if index > 0 => index - 1,
        Direction::Down if index + 1 < siblings.len() => index + 1,
        _ => return None,
    };

    let mut items: Vec<StructureItem> = siblings
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let position = if i == index {
                neighbour
            } else if i == neighbour {
                index
            } else {
                i
            };
            StructureItem {
                id: s.id,
                kind: s.kind,
                order: position as i64,
            }
        })
        .collect();
    items.sort_by_key(|item| item.order);
    Some(items)
}

/// Depth-first listing of the nodes visible given the expanded set.
pub fn visible_nodes<'a>(
    tree: &'a [StructureNode],
    is_expanded: &dyn Fn(&StructureNode) -> bool,
) -> Vec<(usize, &'a StructureNode)> {
    fn walk<'a>(
        nodes: &'a [StructureNode],
        depth: usize,
        is_expanded: &dyn Fn(&StructureNode) -> bool,
        out: &mut Vec<(usize, &'a StructureNode)>,
    ) {
        for node in nodes {
            out.push((depth, node));
            if !node.children.is_empty() && is_expanded(node) {
                walk(&node.children, depth + 1, is_expanded, out);
            }
        }
    }

    let mut out = Vec::new();
    walk(tree, 0, is_expanded, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Page};
    use chrono::Utc;

    fn category(id: i64, name: &str, order: i64, parent_id: Option<i64>) -> Category {
        Category {
            id,
            name: name.into(),
            slug: name.to_lowercase(),
            description: None,
            parent_id,
            icon: None,
            order,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn page(id: i64, title: &str, order: i64, category_id: Option<i64>) -> Page {
        Page {
            id,
            title: title.into(),
            slug: title.to_lowercase(),
            content: None,
            user_id: 1,
            parent_id: None,
            category_id,
            order,
            icon: None,
            tag: None,
            tag_color: None,
            is_published: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn with_relations(page: Page) -> PageWithRelations {
        PageWithRelations {
            page,
            user: None,
            children: Vec::new(),
            category: None,
        }
    }

    fn leaf(category: Category) -> CategoryTree {
        CategoryTree {
            category,
            all_children: Vec::new(),
            pages: Vec::new(),
        }
    }

    fn titles(nodes: &[StructureNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn root_page_sorts_before_categories() {
        let categories = vec![leaf(category(1, "C1", 1, None)), leaf(category(2, "C2", 2, None))];
        let pages = vec![with_relations(page(1, "P1", 0, None))];

        let tree = build_structure(&categories, &pages);

        assert_eq!(titles(&tree), vec!["P1", "C1", "C2"]);
        assert_eq!(tree[0].kind, NodeKind::Page);
    }

    #[test]
    fn category_children_interleave_subcategories_and_pages() {
        let docs = CategoryTree {
            category: category(1, "Docs", 1, None),
            all_children: vec![
                leaf(category(2, "Guides", 2, Some(1))),
                leaf(category(3, "Reference", 0, Some(1))),
            ],
            pages: vec![page(10, "Intro", 1, Some(1)), page(11, "Tail", 2, Some(1))],
        };
        // Filed pages also show up in the flat list; they must not be duplicated at root.
        let pages = vec![with_relations(page(10, "Intro", 1, Some(1)))];

        let tree = build_structure(&[docs], &pages);

        assert_eq!(tree.len(), 1);
        // Ties keep fetch order: sub-categories come before pages.
        assert_eq!(titles(&tree[0].children), vec!["Reference", "Intro", "Guides", "Tail"]);
    }

    fn siblings() -> Vec<StructureNode> {
        let tree = build_structure(
            &[leaf(category(1, "C1", 5, None)), leaf(category(2, "C2", 9, None))],
            &[with_relations(page(7, "P7", 5, None))],
        );
        assert_eq!(titles(&tree), vec!["C1", "P7", "C2"]);
        tree
    }

    #[test]
    fn moving_up_rewrites_all_siblings_positionally() {
        let plan = plan_move(&siblings(), NodeKind::Page, 7, Direction::Up).unwrap();

        assert_eq!(
            plan,
            vec![
                StructureItem { id: 7, kind: NodeKind::Page, order: 0 },
                StructureItem { id: 1, kind: NodeKind::Category, order: 1 },
                StructureItem { id: 2, kind: NodeKind::Category, order: 2 },
            ]
        );
    }

    #[test]
    fn moving_down_swaps_with_next_sibling() {
        let plan = plan_move(&siblings(), NodeKind::Category, 1, Direction::Down).unwrap();
        let keys: Vec<(NodeKind, i64, i64)> = plan.iter().map(|i| (i.kind, i.id, i.order)).collect();
        assert_eq!(
            keys,
            vec![
                (NodeKind::Page, 7, 0),
                (NodeKind::Category, 1, 1),
                (NodeKind::Category, 2, 2),
            ]
        );
    }

    #[test]
    fn edge_moves_plan_nothing() {
        let tree = siblings();
        assert_eq!(plan_move(&tree, NodeKind::Category, 1, Direction::Up), None);
        assert_eq!(plan_move(&tree, NodeKind::Category, 2, Direction::Down), None);
        // Same id, other table.
        assert_eq!(plan_move(&tree, NodeKind::Page, 1, Direction::Down), None);
    }

    fn sub_page(id: i64, title: &str, order: i64, parent_id: i64) -> Page {
        Page {
            parent_id: Some(parent_id),
            ..page(id, title, order, None)
        }
    }

    #[test]
    fn sub_pages_nest_below_their_parent() {
        let parent = PageWithRelations {
            children: vec![sub_page(3, "Second", 2, 1), sub_page(2, "First", 1, 1)],
            ..with_relations(page(1, "Parent", 0, None))
        };
        let first = PageWithRelations {
            children: vec![sub_page(4, "Deep", 0, 2)],
            ..with_relations(sub_page(2, "First", 1, 1))
        };
        let pages = vec![parent, first, with_relations(sub_page(3, "Second", 2, 1))];

        let tree = build_structure(&[], &pages);

        assert_eq!(titles(&tree), vec!["Parent"]);
        assert_eq!(titles(&tree[0].children), vec!["First", "Second"]);
        assert_eq!(titles(&tree[0].children[0].children), vec!["Deep"]);

        let all = visible_nodes(&tree, &|_| true);
        assert_eq!(all.len(), 4);
        // Sub-pages are reachable but never reordered.
        assert!(siblings_of(&tree, NodeKind::Page, 2).is_none());
        assert!(siblings_of(&tree, NodeKind::Page, 1).is_some());
    }

    #[test]
    fn filed_sub_pages_stay_in_their_category() {
        let filed = Page {
            parent_id: Some(1),
            ..page(2, "Filed", 0, Some(9))
        };
        let parent = PageWithRelations {
            children: vec![filed.clone()],
            ..with_relations(page(1, "Parent", 0, None))
        };
        let docs = CategoryTree {
            pages: vec![filed],
            ..leaf(category(9, "Docs", 1, None))
        };

        let tree = build_structure(&[docs], &[parent]);

        assert_eq!(titles(&tree), vec!["Parent", "Docs"]);
        assert!(tree[0].children.is_empty());
        assert_eq!(titles(&tree[1].children), vec!["Filed"]);
    }

    #[test]
    fn parent_cycles_terminate() {
        let a = PageWithRelations {
            children: vec![sub_page(2, "B", 0, 1)],
            ..with_relations(page(1, "A", 0, None))
        };
        let b = PageWithRelations {
            children: vec![sub_page(1, "A", 0, 2)],
            ..with_relations(sub_page(2, "B", 0, 1))
        };

        let tree = build_structure(&[], &[a, b]);

        assert_eq!(titles(&tree[0].children), vec!["B"]);
        assert!(tree[0].children[0].children.is_empty());
    }

    #[test]
    fn finds_nested_sibling_lists() {
        let docs = CategoryTree {
            category: category(1, "Docs", 1, None),
            all_children: vec![leaf(category(2, "Guides", 1, Some(1)))],
            pages: vec![page(3, "Intro", 0, Some(1))],
        };
        let tree = build_structure(&[docs], &[]);

        let nested = siblings_of(&tree, NodeKind::Category, 2).unwrap();
        assert_eq!(titles(nested), vec!["Intro", "Guides"]);
        assert!(siblings_of(&tree, NodeKind::Page, 99).is_none());

        let collapsed = visible_nodes(&tree, &|_| false);
        assert_eq!(collapsed.len(), 1);
        let expanded = visible_nodes(&tree, &|_| true);
        let depths: Vec<usize> = expanded.iter().map(|(d, _)| *d).collect();
        assert_eq!(depths, vec![0, 1, 1]);
    }
}

//! Depth-first search over the live tree
//!
//! Order is pre-order, first match wins. The root itself is never a match.
//! Unreadable children are treated as leaves: a node that vanished mid-walk
//! simply contributes nothing.

use crate::element::{Role, UIElement};
use std::ops::ControlFlow;

pub const DEFAULT_DEPTH: usize = 30;

/// A match plus its ancestors, nearest first, ending with the search root.
///
/// Virtualized lists drop parent links on off-screen rows, so this is the
/// only reliable way to get from a leaf back to "the row containing it".
#[derive(Debug, Clone)]
pub struct Lineage {
    pub element: UIElement,
    pub ancestors: Vec<UIElement>,
}

impl Lineage {
    pub fn nearest(&self, role: &Role) -> Option<&UIElement> {
        self.ancestors.iter().find(|a| a.has_role(role))
    }

    pub fn root(&self) -> Option<&UIElement> {
        self.ancestors.last()
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }
}

fn walk<F>(
    node: &UIElement,
    depth: usize,
    max_depth: usize,
    path: &mut Vec<UIElement>,
    visit: &mut F,
) -> ControlFlow<()>
where
    F: FnMut(&UIElement, &[UIElement]) -> ControlFlow<()>,
{
    if depth >= max_depth {
        return ControlFlow::Continue(());
    }
    path.push(node.clone());
    for child in node.children() {
        if visit(&child, path).is_break() {
            return ControlFlow::Break(());
        }
        if walk(&child, depth + 1, max_depth, path, visit).is_break() {
            return ControlFlow::Break(());
        }
    }
    path.pop();
    ControlFlow::Continue(())
}

/// Visit every descendant of `root` down to `max_depth` levels.
/// `path` holds the ancestors of the visited node, root first.
pub fn visit_descendants<F>(root: &UIElement, max_depth: usize, mut visit: F)
where
    F: FnMut(&UIElement, &[UIElement]) -> ControlFlow<()>,
{
    let mut path = Vec::new();
    let _ = walk(root, 0, max_depth, &mut path, &mut visit);
}

pub fn first_descendant<P>(root: &UIElement, predicate: P, max_depth: usize) -> Option<UIElement>
where
    P: Fn(&UIElement) -> bool,
{
    let mut found = None;
    visit_descendants(root, max_depth, |el, _| {
        if predicate(el) {
            found = Some(el.clone());
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    found
}

pub fn all_descendants<P>(root: &UIElement, predicate: P, max_depth: usize) -> Vec<UIElement>
where
    P: Fn(&UIElement) -> bool,
{
    let mut found = Vec::new();
    visit_descendants(root, max_depth, |el, _| {
        if predicate(el) {
            found.push(el.clone().with_index(found.len()));
        }
        ControlFlow::Continue(())
    });
    found
}

pub fn first_descendant_with_lineage<P>(
    root: &UIElement,
    predicate: P,
    max_depth: usize,
) -> Option<Lineage>
where
    P: Fn(&UIElement) -> bool,
{
    let mut found = None;
    visit_descendants(root, max_depth, |el, path| {
        if predicate(el) {
            found = Some(Lineage {
                element: el.clone(),
                ancestors: path.iter().rev().cloned().collect(),
            });
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    found
}

pub fn first_child(node: &UIElement, role: &Role) -> Option<UIElement> {
    node.children().into_iter().find(|c| c.has_role(role))
}

pub fn children_with_role(node: &UIElement, role: &Role) -> Vec<UIElement> {
    node.children()
        .into_iter()
        .filter(|c| c.has_role(role))
        .collect()
}

/// Walk parent links upward. Fails on virtualized nodes with no parent.
pub fn structural_ancestor(node: &UIElement, role: &Role, max_steps: usize) -> Option<UIElement> {
    let mut current = node.parent();
    for _ in 0..max_steps {
        let el = current?;
        if el.has_role(role) {
            return Some(el);
        }
        current = el.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTree;

    /// sidebar outline with two rows; the second row's cell is virtualized
    fn sidebar() -> (MockTree, crate::mock::NodeId, crate::mock::NodeId) {
        let tree = MockTree::new();
        let outline = tree.add(tree.root_id(), Role::Outline).id();
        let general = tree.add(outline, Role::Row).id();
        tree.add(general, Role::Cell).identifier("com.apple.systempreferences.GeneralSettings");
        let ax_row = tree.add(outline, Role::Row).id();
        let cell = tree
            .add(ax_row, Role::Cell)
            .identifier("com.apple.Accessibility-Settings.extension")
            .detached()
            .id();
        (tree, ax_row, cell)
    }

    #[test]
    fn pre_order_first_match_wins() {
        let tree = MockTree::new();
        let a = tree.add(tree.root_id(), Role::Group).id();
        let deep = tree.add(a, Role::Button).title("Done").id();
        tree.add(tree.root_id(), Role::Button).title("Done");

        let is_done = |e: &UIElement| e.title().as_deref() == Some("Done");
        let hit = first_descendant(&tree.root(), is_done, DEFAULT_DEPTH).unwrap();
        assert!(hit.same_as(&tree.element(deep)));
    }

    #[test]
    fn root_is_not_a_descendant() {
        let tree = MockTree::new();
        let root = tree.root();
        assert!(first_descendant(&root, |e| e.has_role(&Role::Application), 5).is_none());
    }

    #[test]
    fn depth_limit_stops_descent() {
        let tree = MockTree::new();
        let g1 = tree.add(tree.root_id(), Role::Group).id();
        let g2 = tree.add(g1, Role::Group).id();
        tree.add(g2, Role::CheckBox).identifier("deep");

        let is_deep = |e: &UIElement| e.identifier().as_deref() == Some("deep");
        let find = |depth| first_descendant(&tree.root(), is_deep, depth);
        assert!(find(2).is_none());
        assert!(find(3).is_some());
    }

    #[test]
    fn all_descendants_are_indexed_in_order() {
        let tree = MockTree::new();
        for name in ["a", "b", "c"] {
            tree.add(tree.root_id(), Role::Row).title(name);
        }
        let rows = all_descendants(&tree.root(), |e| e.has_role(&Role::Row), DEFAULT_DEPTH);
        let titles: Vec<_> = rows.iter().filter_map(|r| r.title()).collect();
        assert_eq!(titles, ["a", "b", "c"]);
        assert_eq!(rows[2].index, Some(2));
    }

    #[test]
    fn lineage_recovers_row_of_virtualized_cell() {
        let (tree, ax_row, _) = sidebar();
        let is_ax = |e: &UIElement| {
            e.identifier().as_deref() == Some("com.apple.Accessibility-Settings.extension")
        };

        let lineage = first_descendant_with_lineage(&tree.root(), is_ax, DEFAULT_DEPTH).unwrap();
        assert!(lineage.nearest(&Role::Row).unwrap().same_as(&tree.element(ax_row)));
        assert!(lineage.root().unwrap().same_as(&tree.root()));

        // The structural walk cannot get there.
        assert!(structural_ancestor(&lineage.element, &Role::Row, 8).is_none());
    }

    #[test]
    fn lineage_agrees_with_structural_walk_when_links_exist() {
        let (tree, _, _) = sidebar();
        let is_general = |e: &UIElement| {
            e.identifier().as_deref() == Some("com.apple.systempreferences.GeneralSettings")
        };

        let lineage =
            first_descendant_with_lineage(&tree.root(), is_general, DEFAULT_DEPTH).unwrap();
        let structural = structural_ancestor(&lineage.element, &Role::Row, 8).unwrap();
        assert!(lineage.nearest(&Role::Row).unwrap().same_as(&structural));
    }
}

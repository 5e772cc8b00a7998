//! Read-side rendering of a tree: ASCII lines for a visible window of
//! rows, attribute columns, and visible-node accounting.

use super::{DiffType, FileKind, FileTree, NodeId, SortOrder};
use bytesize::ByteSize;
use owo_colors::OwoColorize;
use std::collections::VecDeque;

const NO_BRANCH_SPACE: &str = "    ";
const BRANCH_SPACE: &str = "│   ";
const MIDDLE_ITEM: &str = "├─";
const LAST_ITEM: &str = "└─";
const UNCOLLAPSED_ITEM: &str = "─ ";
const COLLAPSED_ITEM: &str = "⊕ ";

/// A node in the context of the greater tree, carrying everything
/// needed to render its single line.
struct RenderParams {
    id: NodeId,
    spaces: Vec<bool>,
    child_spaces: Vec<bool>,
    show_collapsed: bool,
    is_last: bool,
}

fn colorize(text: String, diff: DiffType) -> String {
    match diff {
        DiffType::Added => text.green().to_string(),
        DiffType::Removed => text.red().to_string(),
        DiffType::Modified => text.yellow().to_string(),
        DiffType::Unmodified => text,
    }
}

/// Render Unix permission bits as the usual `rwxrwxrwx` triplets.
fn file_mode_string(mode: u32) -> String {
    let mut out = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

impl FileTree {
    /// The node's display string: name (whiteout prefix included),
    /// symlink target if any, colored by its DiffType.
    pub fn node_display(&self, id: NodeId) -> String {
        let node = self.node(id);
        let mut display = node.name().to_string();
        if matches!(
            node.data.file_info.kind,
            FileKind::Symlink | FileKind::Hardlink
        ) && !node.data.file_info.link_name.is_empty()
        {
            display.push_str(" → ");
            display.push_str(&node.data.file_info.link_name);
        }
        colorize(display, node.data.diff_type)
    }

    /// The node's metadata in a columnar string: dir flag + mode,
    /// uid:gid, and rolled-up size.
    pub fn metadata_string(&self, id: NodeId) -> String {
        let node = self.node(id);
        let info = &node.data.file_info;
        let dir = if info.is_dir { "d" } else { "-" };
        let user_group = format!("{}:{}", info.uid, info.gid);
        let size = ByteSize::b(self.get_size(id)).to_string();

        colorize(
            format!("{}{} {:>11} {:>10} ", dir, file_mode_string(info.mode), user_group, size),
            node.data.diff_type,
        )
    }

    fn render_tree_line(&self, params: &RenderParams) -> String {
        let mut line = String::new();
        for space in &params.spaces {
            line.push_str(if *space { NO_BRANCH_SPACE } else { BRANCH_SPACE });
        }
        line.push_str(if params.is_last { LAST_ITEM } else { MIDDLE_ITEM });
        line.push_str(if params.show_collapsed {
            COLLAPSED_ITEM
        } else {
            UNCOLLAPSED_ITEM
        });
        line.push_str(&self.node_display(params.id));
        line.push('\n');
        line
    }

    /// Render the rows of the tree between the given bounds. Each
    /// visible node occupies one line; nodes under a collapsed or hidden
    /// ancestor are skipped.
    pub fn render_between(&self, start_row: usize, stop_row: usize, show_attributes: bool) -> String {
        let mut rendered: Vec<RenderParams> = Vec::new();
        let mut to_visit: VecDeque<RenderParams> = VecDeque::new();
        to_visit.push_back(RenderParams {
            id: self.root(),
            spaces: Vec::new(),
            child_spaces: Vec::new(),
            show_collapsed: false,
            is_last: false,
        });

        let mut current_row = 0usize;
        while let Some(current) = to_visit.pop_front() {
            if current_row > stop_row {
                break;
            }

            let current_collapsed = self.node(current.id).data.view_info.collapsed;
            let child_total = self.node(current.id).child_count();
            let mut child_params: Vec<RenderParams> = Vec::new();

            for (idx, (_, child_id)) in self.node(current.id).children().enumerate() {
                let child = self.node(child_id);
                if child.data.view_info.hidden || current_collapsed {
                    continue;
                }

                let is_last = idx == child_total - 1;
                let collapsed = child.data.view_info.collapsed;
                let show_collapsed = collapsed && !child.is_leaf();

                let mut child_spaces = current.child_spaces.clone();
                if !child.is_leaf() && !collapsed {
                    child_spaces.push(is_last);
                }

                child_params.push(RenderParams {
                    id: child_id,
                    spaces: current.child_spaces.clone(),
                    child_spaces,
                    show_collapsed,
                    is_last,
                });
            }

            // depth-first: the children are visited before any pending
            // siblings
            for params in child_params.into_iter().rev() {
                to_visit.push_front(params);
            }

            // the root itself is never a row
            if current.id == self.root() {
                continue;
            }

            if current_row >= start_row && current_row <= stop_row {
                rendered.push(current);
            }
            current_row += 1;
        }

        let mut result = String::new();
        for params in &rendered {
            if show_attributes {
                result.push_str(&self.metadata_string(params.id));
                result.push(' ');
            }
            result.push_str(&self.render_tree_line(params));
        }
        result
    }

    /// Render the entire tree.
    pub fn render(&self, show_attributes: bool) -> String {
        self.render_between(0, self.node_count(), show_attributes)
    }

    /// Count the nodes a renderer would show: hidden nodes and the
    /// contents of collapsed directories are excluded, but a collapsed
    /// directory itself still occupies a row.
    pub fn visible_size(&self) -> usize {
        let mut visible = 0usize;
        let collapsed_dirs = std::cell::Cell::new(0usize);

        let evaluator = |tree: &FileTree, id: NodeId| -> bool {
            let node = tree.node(id);
            if node.data.file_info.is_dir {
                if node.data.view_info.collapsed && !node.data.view_info.hidden {
                    collapsed_dirs.set(collapsed_dirs.get() + 1);
                }
                return !node.data.view_info.collapsed && !node.data.view_info.hidden;
            }
            !node.data.view_info.hidden
        };

        let _ = self.visit_depth_parent_first(
            &mut |_, _| {
                visible += 1;
                Ok(())
            },
            Some(&evaluator),
            SortOrder::ByName,
        );

        visible + collapsed_dirs.get()
    }
}

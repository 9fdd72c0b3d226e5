//! File tree component and cursor state.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{List, ListItem, ListState, Paragraph};

use crate::app::tree::{TreeModel, format_size};
use crate::domain::model::NodeId;

/// Cursor over the rows currently visible in the tree.
#[derive(Debug, Default, Clone)]
pub struct FileTreeState {
    rows: Vec<(NodeId, usize)>,
    selected: usize,
}

impl FileTreeState {
    pub fn new(tree: &TreeModel) -> Self {
        let mut state = Self::default();
        state.refresh(tree);
        state
    }

    /// Re-read visible rows after expansion changes, keeping the cursor in range.
    pub fn refresh(&mut self, tree: &TreeModel) {
        self.rows = tree.visible_rows();
        if self.selected >= self.rows.len() {
            self.selected = self.rows.len().saturating_sub(1);
        }
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_node(&self) -> Option<NodeId> {
        self.rows.get(self.selected).map(|(id, _)| *id)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn rows(&self) -> &[(NodeId, usize)] {
        &self.rows
    }
}

/// Mark state of a row as drawn in the checkbox column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkState {
    Marked,
    Partial,
    Unmarked,
}

impl MarkState {
    pub fn of(tree: &TreeModel, id: NodeId) -> Self {
        if tree.node(id).marked {
            MarkState::Marked
        } else if tree.has_partial_marks(id) {
            MarkState::Partial
        } else {
            MarkState::Unmarked
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            MarkState::Marked => "[✓] ",
            MarkState::Partial => "[◐] ",
            MarkState::Unmarked => "[ ] ",
        }
    }

    fn style(self) -> Style {
        match self {
            MarkState::Marked => Style::default().fg(Color::Green),
            MarkState::Partial => Style::default().fg(Color::Yellow),
            MarkState::Unmarked => Style::default(),
        }
    }
}

/// Plain-text form of one row: size column, indentation, expander, checkbox and name.
pub fn row_text(tree: &TreeModel, id: NodeId, depth: usize) -> String {
    let (prefix, mark, name) = row_parts(tree, id, depth);
    format!("{prefix}{}{name}", mark.symbol())
}

fn row_parts(tree: &TreeModel, id: NodeId, depth: usize) -> (String, MarkState, &str) {
    let node = tree.node(id);
    let icon = match (node.is_dir, node.expanded) {
        (true, true) => "▼ ",
        (true, false) => "▶ ",
        (false, _) => "  ",
    };
    let prefix = format!("{} {}{icon}", format_size(node.size), "  ".repeat(depth));
    (prefix, MarkState::of(tree, id), &node.name)
}

/// Ratatui component drawing the tree rows.
#[derive(Debug, Default)]
pub struct FileTree;

impl FileTree {
    pub fn render(&self, frame: &mut Frame<'_>, area: Rect, tree: &TreeModel, state: &FileTreeState) {
        if state.rows().is_empty() {
            let placeholder = Paragraph::new("No eligible files").style(
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            );
            frame.render_widget(placeholder, area);
            return;
        }

        let items: Vec<ListItem> = state
            .rows()
            .iter()
            .map(|(id, depth)| {
                let (prefix, mark, name) = row_parts(tree, *id, *depth);
                let mut name_style = Style::default();
                if mark == MarkState::Marked {
                    name_style = name_style.add_modifier(Modifier::BOLD);
                }
                ListItem::new(Line::from(vec![
                    Span::raw(prefix),
                    Span::styled(mark.symbol(), mark.style()),
                    Span::styled(name.to_owned(), name_style),
                ]))
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(state.selected_index()));

        let list = List::new(items).highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_stateful_widget(list, area, &mut list_state);
    }
}

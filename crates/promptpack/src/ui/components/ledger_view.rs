//! Patch history list.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{List, ListItem, ListState, Paragraph};
use time::macros::format_description;

use crate::domain::model::PatchRecord;

/// Cursor over the ledger, newest record first.
#[derive(Debug, Default, Clone)]
pub struct LedgerViewState {
    ids: Vec<u64>,
    selected: usize,
}

impl LedgerViewState {
    pub fn refresh(&mut self, records: &[PatchRecord]) {
        self.ids = records.iter().rev().map(|record| record.id).collect();
        if self.selected >= self.ids.len() {
            self.selected = self.ids.len().saturating_sub(1);
        }
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.ids.len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_id(&self) -> Option<u64> {
        self.ids.get(self.selected).copied()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }
}

/// One history line: id, state, time, file and description.
pub fn record_line(record: &PatchRecord, root: &std::path::Path) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let when = record
        .timestamp
        .format(&format)
        .unwrap_or_else(|_| record.timestamp.to_string());
    let state = if record.applied { "applied" } else { "reverted" };
    let path = record.filepath.strip_prefix(root).unwrap_or(&record.filepath);
    format!(
        "#{:<4} {state:<8} {when}  {}  {}",
        record.id,
        path.display(),
        record.description
    )
}

#[derive(Debug, Default)]
pub struct LedgerView;

impl LedgerView {
    pub fn render(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        records: &[PatchRecord],
        root: &std::path::Path,
        state: &LedgerViewState,
    ) {
        if records.is_empty() {
            let placeholder = Paragraph::new("No patches recorded").style(
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            );
            frame.render_widget(placeholder, area);
            return;
        }

        let items: Vec<ListItem> = records
            .iter()
            .rev()
            .map(|record| {
                let color = if record.applied {
                    Color::Green
                } else {
                    Color::DarkGray
                };
                ListItem::new(Line::from(Span::styled(
                    record_line(record, root),
                    Style::default().fg(color),
                )))
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(state.selected_index()));
        let list = List::new(items).highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_stateful_widget(list, area, &mut list_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::{Path, PathBuf};

    use time::macros::datetime;

    fn record(id: u64, applied: bool) -> PatchRecord {
        PatchRecord {
            id,
            timestamp: datetime!(2024-03-01 09:30 UTC),
            filepath: PathBuf::from("/work/proj/src/main.rs"),
            description: "rename entry point".into(),
            old_text: "main".into(),
            new_text: "start".into(),
            applied,
        }
    }

    #[test]
    fn lists_newest_first() {
        let records = vec![record(1, true), record(2, false), record(3, true)];
        let mut state = LedgerViewState::default();
        state.refresh(&records);
        assert_eq!(state.selected_id(), Some(3));
        state.select_next();
        state.select_next();
        state.select_next();
        assert_eq!(state.selected_id(), Some(1));

        state.refresh(&records[..1]);
        assert_eq!(state.selected_id(), Some(1));
    }

    #[test]
    fn formats_record_relative_to_root() {
        let line = record_line(&record(2, false), Path::new("/work/proj"));
        assert_eq!(
            line,
            "#2    reverted 2024-03-01 09:30  src/main.rs  rename entry point"
        );
    }
}

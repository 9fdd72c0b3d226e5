//! Application loop for the TUI.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal};

use crate::app::bundle::{BundleReport, BundleWriter};
use crate::app::ledger::PatchLedger;
use crate::app::manifest::ManifestStore;
use crate::app::tokens::{group_thousands, total_tokens};
use crate::app::tree::TreeModel;
use crate::ui::components::file_tree::{FileTree, FileTreeState};
use crate::ui::components::ledger_view::{LedgerView, LedgerViewState};

/// How the interactive session ended.
#[derive(Debug)]
pub enum UiOutcome {
    /// The user quit without generating anything.
    Quit,
    /// Enter was pressed with no marked files.
    NothingMarked,
    /// The bundle was written.
    Bundle(BundleReport),
}

/// Interactive tree browser over one project.
pub struct UiApp {
    tree: TreeModel,
    tree_state: FileTreeState,
    manifest: ManifestStore,
    writer: BundleWriter,
    ledger_path: PathBuf,
    ledger: Option<PatchLedger>,
    ledger_state: LedgerViewState,
    view: View,
    marked: usize,
    tokens: usize,
    status: Option<StatusMessage>,
    outcome: Option<UiOutcome>,
}

impl UiApp {
    pub fn new(
        tree: TreeModel,
        manifest: ManifestStore,
        writer: BundleWriter,
        ledger_path: impl Into<PathBuf>,
    ) -> Self {
        let tree_state = FileTreeState::new(&tree);
        let mut app = Self {
            tree,
            tree_state,
            manifest,
            writer,
            ledger_path: ledger_path.into(),
            ledger: None,
            ledger_state: LedgerViewState::default(),
            view: View::Tree,
            marked: 0,
            tokens: 0,
            status: None,
            outcome: None,
        };
        app.refresh_totals();
        app
    }

    /// Launch the terminal UI and block until the user leaves it.
    pub fn run(mut self) -> Result<UiOutcome> {
        enable_raw_mode().context("failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to initialize terminal")?;
        terminal.hide_cursor().ok();

        let result = self.event_loop(&mut terminal);

        disable_raw_mode().ok();
        let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
        let _ = terminal.show_cursor();

        result
    }

    fn event_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<UiOutcome> {
        loop {
            terminal.draw(|frame| self.render(frame))?;
            if let Event::Key(key) = event::read()? {
                self.handle_key(key);
            }
            if let Some(outcome) = self.outcome.take() {
                return Ok(outcome);
            }
        }
    }

    /// Outcome once the session is over, `None` while it is still running.
    pub fn outcome(&self) -> Option<&UiOutcome> {
        self.outcome.as_ref()
    }

    pub fn tree(&self) -> &TreeModel {
        &self.tree
    }

    pub fn render(&self, frame: &mut Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(frame.size());

        let header = Paragraph::new(self.hints())
            .style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_widget(header, layout[0]);

        match self.view {
            View::Tree => FileTree.render(frame, layout[1], &self.tree, &self.tree_state),
            View::Ledger => {
                let records = self.ledger.as_ref().map(PatchLedger::records).unwrap_or(&[]);
                LedgerView.render(
                    frame,
                    layout[1],
                    records,
                    self.tree.root_path(),
                    &self.ledger_state,
                );
            }
        }

        self.render_status(frame, layout[2]);
    }

    fn hints(&self) -> String {
        match self.view {
            View::Tree => format!(
                "↑↓: Navigate | ←→: Collapse/Expand | Space: Mark | Enter: Create {} | p: Patches | q: Quit",
                self.output_name()
            ),
            View::Ledger => "↑↓: Navigate | u: Unapply | r: Reapply | p/Esc: Back | q: Quit".to_owned(),
        }
    }

    fn output_name(&self) -> String {
        self.writer
            .output()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.writer.output().display().to_string())
    }

    fn render_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let line = match &self.status {
            Some(status) => {
                let color = match status.level {
                    StatusLevel::Info => Color::Gray,
                    StatusLevel::Error => Color::Red,
                };
                Line::styled(status.text.clone(), Style::default().fg(color))
            }
            None => Line::from(self.status_line()),
        };
        frame.render_widget(
            Paragraph::new(line).style(Style::default().add_modifier(Modifier::REVERSED)),
            area,
        );
    }

    /// Text of the default status bar.
    pub fn status_line(&self) -> String {
        format!(
            "Marked: {} files | Tokensize: {} tokens",
            self.marked,
            group_thousands(self.tokens as u64)
        )
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.outcome = Some(UiOutcome::Quit);
            return;
        }
        self.status = None;
        match self.view {
            View::Tree => self.handle_tree_key(key),
            View::Ledger => self.handle_ledger_key(key),
        }
    }

    fn handle_tree_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.outcome = Some(UiOutcome::Quit);
            }
            KeyCode::Up | KeyCode::Char('k') => self.tree_state.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.tree_state.select_next(),
            KeyCode::Left | KeyCode::Char('h') => self.set_expanded(false),
            KeyCode::Right | KeyCode::Char('l') => self.set_expanded(true),
            KeyCode::Char(' ') => self.toggle_mark(),
            KeyCode::Enter => self.generate(),
            KeyCode::Char('p') => self.open_ledger(),
            _ => {}
        }
    }

    fn handle_ledger_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => self.outcome = Some(UiOutcome::Quit),
            KeyCode::Char('p') | KeyCode::Esc => self.view = View::Tree,
            KeyCode::Up | KeyCode::Char('k') => self.ledger_state.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.ledger_state.select_next(),
            KeyCode::Char('u') => self.transition(false),
            KeyCode::Char('r') => self.transition(true),
            _ => {}
        }
    }

    fn set_expanded(&mut self, expanded: bool) {
        if let Some(id) = self.tree_state.selected_node() {
            self.tree.set_expanded(id, expanded);
            self.tree_state.refresh(&self.tree);
        }
    }

    fn toggle_mark(&mut self) {
        let Some(id) = self.tree_state.selected_node() else {
            return;
        };
        self.tree.toggle_mark(id);
        self.refresh_totals();
        if let Err(err) = self.manifest.save(&self.tree.marked_files()) {
            tracing::warn!(error = %err, "manifest not saved");
            self.set_status(StatusLevel::Error, err.to_string());
        }
    }

    fn generate(&mut self) {
        let files = self.tree.marked_files();
        if files.is_empty() {
            self.outcome = Some(UiOutcome::NothingMarked);
            return;
        }
        if let Err(err) = self.manifest.save(&files) {
            tracing::warn!(error = %err, "manifest not saved");
        }
        match self.writer.write(&self.tree, &files) {
            Ok(report) => self.outcome = Some(UiOutcome::Bundle(report)),
            Err(err) => self.set_status(StatusLevel::Error, format!("{err:#}")),
        }
    }

    fn open_ledger(&mut self) {
        match PatchLedger::open(&self.ledger_path) {
            Ok(ledger) => {
                self.ledger_state.refresh(ledger.records());
                self.ledger = Some(ledger);
                self.view = View::Ledger;
            }
            Err(err) => self.set_status(StatusLevel::Error, err.to_string()),
        }
    }

    fn transition(&mut self, applied: bool) {
        let (Some(ledger), Some(id)) = (self.ledger.as_mut(), self.ledger_state.selected_id())
        else {
            return;
        };
        let result = if applied {
            ledger.reapply(id)
        } else {
            ledger.unapply(id)
        };
        match result {
            Ok(record) => {
                let verb = if record.applied { "reapplied" } else { "unapplied" };
                self.ledger_state.refresh(ledger.records());
                self.set_status(StatusLevel::Info, format!("Patch #{id} {verb}"));
                self.refresh_totals();
            }
            Err(err) => self.set_status(StatusLevel::Error, err.to_string()),
        }
    }

    fn refresh_totals(&mut self) {
        let files = self.tree.marked_files();
        self.marked = files.len();
        self.tokens = total_tokens(&files);
    }

    fn set_status(&mut self, level: StatusLevel, text: impl Into<String>) {
        self.status = Some(StatusMessage {
            level,
            text: text.into(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Tree,
    Ledger,
}

#[derive(Debug)]
struct StatusMessage {
    level: StatusLevel,
    text: String,
}

#[derive(Debug, Clone, Copy)]
enum StatusLevel {
    Info,
    Error,
}

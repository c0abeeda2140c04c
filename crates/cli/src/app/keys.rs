use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use monitor::{Command, Pid};
use ratatui::widgets::TableState;

const PAGE: usize = 10;

/// A keybinding with its key and description for display in help.
#[derive(Debug, Clone, Copy)]
pub struct Keybinding {
    pub key: &'static str,
    pub description: &'static str,
}

pub const KEYBINDINGS: &[Keybinding] = &[
    Keybinding { key: "?", description: "Toggle help" },
    Keybinding { key: "q/Esc", description: "Quit" },
    Keybinding { key: "Up/k Down/j", description: "Move cursor" },
    Keybinding { key: "PgUp/PgDn", description: "Page up/down" },
    Keybinding { key: "Space", description: "Select/deselect process" },
    Keybinding { key: "a / A", description: "Select/deselect all shown" },
    Keybinding { key: "c", description: "Drop ended processes from selection" },
    Keybinding { key: "/", description: "Filter by pid or name" },
    Keybinding { key: "m", description: "Switch memory metric" },
    Keybinding { key: "r/F5", description: "Refresh process list" },
    Keybinding { key: "s / x", description: "Start/stop monitoring" },
    Keybinding { key: "n", description: "Edit operation name" },
    Keybinding { key: "Enter", description: "Start/stop recording" },
    Keybinding { key: "e", description: "Export recording as CSV" },
    Keybinding { key: "y", description: "Sync readings into the table" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Filter,
    Name,
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    Quit,
    Dispatch(Command),
}

/// Front-end state that is not part of the monitor: cursor, text inputs,
/// help visibility.
#[derive(Debug, Default)]
pub struct UiState {
    pub mode: InputMode,
    pub table: TableState,
    pub filter: String,
    pub name: String,
    pub show_help: bool,
}

impl UiState {
    /// Keep the cursor on a row when the table changes under it.
    pub fn clamp(&mut self, rows: usize) {
        match (self.table.selected(), rows) {
            (_, 0) => self.table.select(None),
            (None, _) => self.table.select(Some(0)),
            (Some(idx), rows) if idx >= rows => self.table.select(Some(rows - 1)),
            _ => {}
        }
    }

    pub fn cursor_pid(&self, visible: &[Pid]) -> Option<Pid> {
        self.table.selected().and_then(|idx| visible.get(idx).copied())
    }

    pub fn handle_key(&mut self, key: KeyEvent, visible: &[Pid], recording: bool) -> Action {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Action::Quit;
        }
        match self.mode {
            InputMode::Normal => self.handle_normal(key, visible, recording),
            InputMode::Filter => self.handle_filter(key),
            InputMode::Name => self.handle_name(key, recording),
        }
    }

    fn handle_normal(&mut self, key: KeyEvent, visible: &[Pid], recording: bool) -> Action {
        let last = visible.len().saturating_sub(1);
        let cursor = self.table.selected().unwrap_or(0);
        match key.code {
            KeyCode::Char('?') => {
                self.show_help = !self.show_help;
                Action::None
            }
            KeyCode::Esc if self.show_help => {
                self.show_help = false;
                Action::None
            }
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Up | KeyCode::Char('k') => {
                self.table.select(Some(cursor.saturating_sub(1)));
                Action::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.table.select(Some((cursor + 1).min(last)));
                Action::None
            }
            KeyCode::PageUp => {
                self.table.select(Some(cursor.saturating_sub(PAGE)));
                Action::None
            }
            KeyCode::PageDown => {
                self.table.select(Some((cursor + PAGE).min(last)));
                Action::None
            }
            KeyCode::Home | KeyCode::Char('g') => {
                self.table.select(Some(0));
                Action::None
            }
            KeyCode::End | KeyCode::Char('G') => {
                self.table.select(Some(last));
                Action::None
            }
            KeyCode::Char(' ') => match self.cursor_pid(visible) {
                Some(pid) => Action::Dispatch(Command::ToggleSelect(pid)),
                None => Action::None,
            },
            KeyCode::Char('a') => Action::Dispatch(Command::SelectVisible),
            KeyCode::Char('A') => Action::Dispatch(Command::DeselectVisible),
            KeyCode::Char('c') => Action::Dispatch(Command::CleanSelection),
            KeyCode::Char('/') => {
                self.mode = InputMode::Filter;
                Action::None
            }
            KeyCode::Char('m') => Action::Dispatch(Command::CycleMetric),
            KeyCode::Char('r') | KeyCode::F(5) => Action::Dispatch(Command::Refresh),
            KeyCode::Char('s') => Action::Dispatch(Command::StartMonitoring),
            KeyCode::Char('x') => Action::Dispatch(Command::StopMonitoring),
            KeyCode::Char('n') => {
                self.mode = InputMode::Name;
                Action::None
            }
            KeyCode::Enter if recording => Action::Dispatch(Command::StopRecording),
            KeyCode::Enter => Action::Dispatch(Command::StartRecording(self.name.clone())),
            KeyCode::Char('e') => Action::Dispatch(Command::Export),
            KeyCode::Char('y') => Action::Dispatch(Command::Sync),
            _ => Action::None,
        }
    }

    fn handle_filter(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Enter => {
                self.mode = InputMode::Normal;
                Action::None
            }
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.filter.clear();
                Action::Dispatch(Command::SetFilter(String::new()))
            }
            KeyCode::Backspace => {
                self.filter.pop();
                Action::Dispatch(Command::SetFilter(self.filter.clone()))
            }
            KeyCode::Char(c) => {
                self.filter.push(c);
                self.table.select(Some(0));
                Action::Dispatch(Command::SetFilter(self.filter.clone()))
            }
            _ => Action::None,
        }
    }

    fn handle_name(&mut self, key: KeyEvent, recording: bool) -> Action {
        match key.code {
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                Action::None
            }
            KeyCode::Enter => {
                self.mode = InputMode::Normal;
                if recording {
                    Action::None
                } else {
                    Action::Dispatch(Command::StartRecording(self.name.clone()))
                }
            }
            KeyCode::Backspace => {
                self.name.pop();
                Action::None
            }
            KeyCode::Char(c) => {
                self.name.push(c);
                Action::None
            }
            _ => Action::None,
        }
    }
}

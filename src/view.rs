//! Pure projections of controller state for whatever renders the page.
use crate::mapper::RowViewModel;
use crate::model::{ActionKind, JobRunState};
use crate::progress::LogPanel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBar {
    pub visible: bool,
    pub enabled: bool,
    pub label: String,
}

pub fn action_bar(action: ActionKind, selected: usize, max: usize, state: JobRunState) -> ActionBar {
    if state == JobRunState::Running {
        return ActionBar {
            visible: true,
            enabled: false,
            label: format!("{}...", action.progressive()),
        };
    }
    let count = if selected > max {
        format!("{max} [MAX]")
    } else {
        selected.to_string()
    };
    ActionBar {
        visible: selected > 0,
        enabled: selected > 0,
        label: format!("{} Selected Products ({count})", action.label()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView<'a> {
    pub checked: bool,
    pub row: &'a RowViewModel,
}

#[derive(Debug, Clone)]
pub struct GridView<'a> {
    pub rows: Vec<RowView<'a>>,
    pub header_checked: bool,
    pub action_bar: ActionBar,
    /// False while a fetch is in flight.
    pub controls_enabled: bool,
    pub has_next: bool,
    pub has_prev: bool,
    pub log: &'a LogPanel,
}

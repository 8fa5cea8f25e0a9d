//! Overlay component — centered popup for the states that block the
//! carousel: catalog loading, catalog failure, and the start gate that
//! waits for the first user gesture before any audio is made.

use ratatui::crossterm::event::{MouseButton, MouseEvent, MouseEventKind};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::{
    action::Action,
    app_state::{AppState, CatalogState},
    component::{hit, Component},
    theme::{style_secondary, C_ACCENT, C_CARD_BORDER, C_ERROR, C_PRIMARY},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Loading,
    CatalogError,
    StartGate,
}

pub struct Overlay;

impl Overlay {
    pub fn new() -> Self {
        Self
    }

    /// Which popup, if any, the current state calls for.
    pub fn kind(state: &AppState) -> Option<OverlayKind> {
        match state.catalog {
            CatalogState::Loading => Some(OverlayKind::Loading),
            CatalogState::Failed(_) => Some(OverlayKind::CatalogError),
            CatalogState::Ready if !state.started => Some(OverlayKind::StartGate),
            CatalogState::Ready => None,
        }
    }

    pub fn popup_rect(area: Rect) -> Rect {
        centered_rect(60, 7, area)
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Overlay {
    /// Clicking the start popup counts as the start gesture.
    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, state: &AppState) -> Vec<Action> {
        if event.kind != MouseEventKind::Down(MouseButton::Left) {
            return vec![];
        }
        if !hit(Self::popup_rect(area), event.column, event.row) {
            return vec![];
        }
        match Self::kind(state) {
            Some(OverlayKind::StartGate) => vec![Action::Start],
            Some(OverlayKind::CatalogError) => vec![Action::RetryCatalog],
            _ => vec![],
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        let Some(kind) = Self::kind(state) else {
            return;
        };
        let (title, border, body): (&str, _, Vec<Line>) = match kind {
            OverlayKind::Loading => (
                " swipe radio ",
                C_CARD_BORDER,
                vec![Line::from(Span::styled("Loading stations...", style_secondary()))],
            ),
            OverlayKind::CatalogError => {
                let msg = match &state.catalog {
                    CatalogState::Failed(m) => m.clone(),
                    _ => String::new(),
                };
                (
                    " no stations ",
                    C_ERROR,
                    vec![
                        Line::from(Span::styled(msg, Style::default().fg(C_ERROR))),
                        Line::from(""),
                        Line::from(Span::styled("[r] retry   [q] quit", style_secondary())),
                    ],
                )
            }
            OverlayKind::StartGate => {
                let name = state
                    .current_station()
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                (
                    " swipe radio ",
                    C_ACCENT,
                    vec![
                        Line::from(Span::styled(
                            "Press Enter to start listening",
                            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
                        )),
                        Line::from(""),
                        Line::from(Span::styled(
                            format!("tuned to {} · drag or scroll to change", name),
                            style_secondary(),
                        )),
                    ],
                )
            }
        };

        let popup = Self::popup_rect(area);
        frame.render_widget(Clear, popup);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(title);
        frame.render_widget(
            Paragraph::new(body)
                .block(block)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            popup,
        );
    }
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1])[1]
}

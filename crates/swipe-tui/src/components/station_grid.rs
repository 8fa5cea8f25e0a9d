//! Two-column station grid, shown instead of the carousel on narrow
//! terminals (or toggled with `g`).  Clicking a cell jumps to that station.

use ratatui::crossterm::event::{MouseButton, MouseEvent, MouseEventKind};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::{
    action::Action,
    app_state::AppState,
    component::{hit, Component},
    theme::{style_border, style_default, style_selected, C_LOCATION, C_PLAYING},
};

const COLUMNS: usize = 2;
const CELL_H: u16 = 2;

pub struct StationGrid {
    /// First visible row of cells.
    scroll: usize,
}

impl StationGrid {
    pub fn new() -> Self {
        Self { scroll: 0 }
    }

    fn inner(area: Rect) -> Rect {
        Block::default().borders(Borders::ALL).inner(area)
    }

    fn visible_rows(inner: Rect) -> usize {
        (inner.height / CELL_H).max(1) as usize
    }

    /// Keep the current station's row on screen.
    fn follow(&mut self, current: Option<usize>, rows: usize) {
        let Some(cur) = current else {
            self.scroll = 0;
            return;
        };
        let row = cur / COLUMNS;
        if row < self.scroll {
            self.scroll = row;
        } else if row >= self.scroll + rows {
            self.scroll = row + 1 - rows;
        }
    }

    fn cell_rect(inner: Rect, col: usize, visible_row: usize) -> Rect {
        let col_w = inner.width / COLUMNS as u16;
        Rect {
            x: inner.x + col as u16 * col_w,
            y: inner.y + visible_row as u16 * CELL_H,
            width: col_w,
            height: CELL_H,
        }
    }

    /// Station index under (`col`, `row`), if any.
    fn index_at(&self, area: Rect, col: u16, row: u16, len: usize) -> Option<usize> {
        let inner = Self::inner(area);
        if !hit(inner, col, row) {
            return None;
        }
        for visible_row in 0..Self::visible_rows(inner) {
            for c in 0..COLUMNS {
                let idx = (self.scroll + visible_row) * COLUMNS + c;
                if idx < len && hit(Self::cell_rect(inner, c, visible_row), col, row) {
                    return Some(idx);
                }
            }
        }
        None
    }
}

impl Default for StationGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for StationGrid {
    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, state: &AppState) -> Vec<Action> {
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => self
                .index_at(area, event.column, event.row, state.nav.len())
                .map(|idx| vec![Action::GoTo(idx)])
                .unwrap_or_default(),
            MouseEventKind::ScrollDown => {
                let rows = state.nav.len().div_ceil(COLUMNS);
                let visible = Self::visible_rows(Self::inner(area));
                if self.scroll + visible < rows {
                    self.scroll += 1;
                }
                vec![]
            }
            MouseEventKind::ScrollUp => {
                self.scroll = self.scroll.saturating_sub(1);
                vec![]
            }
            _ => vec![],
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        frame.render_widget(Clear, area);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(style_border())
            .title(Span::styled(
                format!(" stations ({}) ", state.nav.len()),
                style_default(),
            ));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Self::visible_rows(inner);
        self.follow(state.current_index(), rows);

        let stations = state.nav.stations();
        for visible_row in 0..rows {
            for c in 0..COLUMNS {
                let idx = (self.scroll + visible_row) * COLUMNS + c;
                let Some(station) = stations.get(idx) else {
                    continue;
                };
                let cell = Self::cell_rect(inner, c, visible_row);
                if cell.y + cell.height > inner.y + inner.height {
                    continue;
                }
                let is_current = state.current_index() == Some(idx);
                let name_style = if is_current {
                    style_selected()
                } else {
                    style_default()
                };
                let marker = if is_current && state.started {
                    Span::styled("▶ ", Style::default().fg(C_PLAYING))
                } else {
                    Span::raw("  ")
                };
                let lines = vec![
                    Line::from(vec![
                        marker,
                        Span::styled(station.name.clone(), name_style.add_modifier(Modifier::BOLD)),
                    ]),
                    Line::from(Span::styled(
                        format!("  {}", station.location()),
                        Style::default().fg(C_LOCATION),
                    )),
                ];
                frame.render_widget(Paragraph::new(lines), cell);
            }
        }
    }
}

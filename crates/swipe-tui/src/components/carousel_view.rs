//! Vertical carousel — the current station card plus its neighbours, placed
//! by `carousel::layout` and clipped to the viewport.
//!
//! Each card is as tall as the viewport.  Scale narrows a card and opacity
//! fades its colours toward the background.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use swipe_proto::carousel::{self, ItemTransform};
use swipe_proto::protocol::{PlaybackStatus, Station};

use crate::{
    app_state::AppState,
    component::Component,
    theme::{fade, C_CARD_BORDER, C_LOCATION, C_PLAYING, C_PRIMARY, C_SECONDARY, C_TAG},
};

pub struct CarouselView;

impl CarouselView {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CarouselView {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows of `card_top..card_top + card_h` that fall inside `area`, as
/// (visible rect top, rows skipped at the top of the card, visible height).
fn clip_rows(area: Rect, card_top: i32, card_h: i32) -> Option<(u16, u16, u16)> {
    let area_top = area.y as i32;
    let area_bottom = area_top + area.height as i32;
    let top = card_top.max(area_top);
    let bottom = (card_top + card_h).min(area_bottom);
    if bottom <= top {
        return None;
    }
    Some((top as u16, (top - card_top) as u16, (bottom - top) as u16))
}

impl Component for CarouselView {
    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        frame.render_widget(Clear, area);
        let Some(current) = state.current_index() else {
            return;
        };
        let viewport_px = state.rows_to_px(area.height as f32);
        let mut items = carousel::layout(
            state.nav.len(),
            current,
            state.drag_offset,
            viewport_px,
            state.ui.visible_window,
        );
        // Far cards first so the current one is drawn last.
        items.sort_by_key(|t| std::cmp::Reverse(t.slot.unsigned_abs()));

        for t in items {
            if let Some(station) = state.nav.stations().get(t.index) {
                draw_card(frame, area, station, &t, state);
            }
        }
    }
}

fn draw_card(frame: &mut Frame, area: Rect, station: &Station, t: &ItemTransform, state: &AppState) {
    let card_h = area.height as i32;
    let card_top = area.y as i32 + state.px_to_rows(t.offset_px).round() as i32;
    let Some((y, skip, height)) = clip_rows(area, card_top, card_h) else {
        return;
    };

    let min_w = 12.min(area.width);
    let width = ((area.width as f32 * 0.8 * t.scale).round() as u16).clamp(min_w, area.width);
    let x = area.x + (area.width - width) / 2;
    let rect = Rect {
        x,
        y,
        width,
        height,
    };

    let is_current = t.slot == 0;
    let lines = card_lines(station, width, card_h as u16, is_current, t.opacity, state);
    frame.render_widget(Clear, rect);
    frame.render_widget(Paragraph::new(lines).scroll((skip, 0)), rect);
}

fn card_lines(
    station: &Station,
    width: u16,
    height: u16,
    is_current: bool,
    opacity: f32,
    state: &AppState,
) -> Vec<Line<'static>> {
    let inner = width.saturating_sub(2) as usize;
    let border = Style::default().fg(fade(C_CARD_BORDER, opacity));
    let edge = |l: &str, r: &str| {
        Line::from(Span::styled(
            format!("{}{}{}", l, "─".repeat(inner), r),
            border,
        ))
    };

    let mut body: Vec<(String, Style)> = vec![(
        station.name.clone(),
        Style::default()
            .fg(fade(C_PRIMARY, opacity))
            .add_modifier(Modifier::BOLD),
    )];
    let location = station.location();
    if !location.is_empty() {
        body.push((location, Style::default().fg(fade(C_LOCATION, opacity))));
    }
    if let Some(genre) = station.genre.as_deref().filter(|g| !g.is_empty()) {
        body.push((format!("#{}", genre), Style::default().fg(fade(C_TAG, opacity))));
    }
    if is_current && state.started {
        let (text, color) = match state.status {
            PlaybackStatus::Playing => ("▶ on air", C_PLAYING),
            PlaybackStatus::Paused => ("⏸ paused", C_SECONDARY),
            _ => ("", C_SECONDARY),
        };
        if !text.is_empty() {
            body.push((String::new(), Style::default()));
            body.push((text.to_string(), Style::default().fg(color)));
        }
    }

    let h = height as usize;
    let mut lines = Vec::with_capacity(h);
    lines.push(edge("╭", "╮"));
    let interior = h.saturating_sub(2);
    let pad_top = interior.saturating_sub(body.len()) / 2;
    for row in 0..interior {
        let content = row
            .checked_sub(pad_top)
            .and_then(|i| body.get(i))
            .map(|(text, style)| centered(text, inner, *style))
            .unwrap_or_else(|| Span::raw(" ".repeat(inner)));
        lines.push(Line::from(vec![
            Span::styled("│", border),
            content,
            Span::styled("│", border),
        ]));
    }
    if h >= 2 {
        lines.push(edge("╰", "╯"));
    }
    lines.truncate(h);
    lines
}

fn centered(text: &str, width: usize, style: Style) -> Span<'static> {
    let mut t: String = text.to_string();
    while t.width() > width {
        t.pop();
    }
    let pad = width - t.width();
    let left = pad / 2;
    Span::styled(
        format!("{}{}{}", " ".repeat(left), t, " ".repeat(pad - left)),
        style,
    )
}

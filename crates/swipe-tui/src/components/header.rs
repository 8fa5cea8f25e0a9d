//! Header component — 1-row top bar.
//!
//! Left: status icon, station name, location.  Right: listener count and the
//! clickable mute / pause badges plus volume.

use ratatui::crossterm::event::{MouseButton, MouseEvent, MouseEventKind};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use swipe_proto::protocol::PlaybackStatus;

use crate::{
    action::Action,
    app_state::AppState,
    component::{hit, Component},
    theme::{
        C_ACCENT, C_BADGE_ERR, C_BADGE_LIVE, C_BADGE_PENDING, C_CONNECTING, C_LOCATION, C_MUTED,
        C_PLAYING, C_PRIMARY, C_SECONDARY,
    },
};

const MUTE_BADGE: &str = " [m]ute ";
const UNMUTE_BADGE: &str = " [m]uted ";
const PAUSE_BADGE: &str = " [p]ause ";
const RESUME_BADGE: &str = " [p]lay ";
/// Width reserved for each control badge.
const BADGE_W: u16 = 9;

pub struct Header;

impl Header {
    pub fn new() -> Self {
        Self
    }

    /// Hit areas of the (mute, pause) badges at the right edge of `area`.
    pub fn control_rects(area: Rect) -> (Rect, Rect) {
        let pause_x = area.x + area.width.saturating_sub(BADGE_W);
        let mute_x = pause_x.saturating_sub(BADGE_W);
        let badge = |x: u16| Rect {
            x,
            y: area.y,
            width: BADGE_W.min(area.width),
            height: 1.min(area.height),
        };
        (badge(mute_x), badge(pause_x))
    }

    /// True when the point is on one of the badges.
    pub fn is_control(area: Rect, col: u16, row: u16) -> bool {
        let (mute, pause) = Self::control_rects(area);
        hit(mute, col, row) || hit(pause, col, row)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Header {
    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, state: &AppState) -> Vec<Action> {
        if !state.started || event.kind != MouseEventKind::Down(MouseButton::Left) {
            return vec![];
        }
        let (mute, pause) = Self::control_rects(area);
        if hit(mute, event.column, event.row) {
            vec![Action::ToggleMute]
        } else if hit(pause, event.column, event.row) {
            vec![Action::TogglePause]
        } else {
            vec![]
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        if area.height == 0 {
            return;
        }
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(now_playing(state)), area);

        if !state.started {
            return;
        }
        let (mute, pause) = Self::control_rects(area);
        let (mute_text, mute_color) = if state.muted {
            (UNMUTE_BADGE, C_BADGE_ERR)
        } else {
            (MUTE_BADGE, C_SECONDARY)
        };
        let (pause_text, pause_color) = if state.status == PlaybackStatus::Paused {
            (RESUME_BADGE, C_BADGE_PENDING)
        } else {
            (PAUSE_BADGE, C_SECONDARY)
        };
        frame.render_widget(
            Paragraph::new(Span::styled(mute_text, Style::default().fg(mute_color))),
            mute,
        );
        frame.render_widget(
            Paragraph::new(Span::styled(pause_text, Style::default().fg(pause_color))),
            pause,
        );

        let mut extras = vec![Span::styled(
            format!("vol {:>3}% ", (state.volume * 100.0).round() as u32),
            Style::default().fg(C_MUTED),
        )];
        if state.listeners > 0 {
            let noun = if state.listeners == 1 {
                "listener"
            } else {
                "listeners"
            };
            extras.insert(
                0,
                Span::styled(
                    format!("{} {}  ", state.listeners, noun),
                    Style::default().fg(C_BADGE_LIVE),
                ),
            );
        }
        let extras_w: u16 = extras.iter().map(|s| s.content.width() as u16).sum();
        let extras_area = Rect {
            x: mute.x.saturating_sub(extras_w),
            y: area.y,
            width: extras_w.min(mute.x.saturating_sub(area.x)),
            height: 1,
        };
        frame.render_widget(Paragraph::new(Line::from(extras)), extras_area);
    }
}

fn now_playing(state: &AppState) -> Line<'static> {
    let (icon, color) = match state.status {
        PlaybackStatus::Idle => ("■", C_MUTED),
        PlaybackStatus::Loading | PlaybackStatus::Crossfading => ("◔", C_CONNECTING),
        PlaybackStatus::Playing => ("▶", C_PLAYING),
        PlaybackStatus::Paused => ("⏸", C_CONNECTING),
        PlaybackStatus::Error => ("⛔", C_ACCENT),
    };
    let mut spans = vec![
        Span::raw(" "),
        Span::styled(icon, Style::default().fg(color)),
        Span::raw(" "),
    ];
    match state.current_station() {
        Some(station) => {
            spans.push(Span::styled(
                station.name.clone(),
                Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
            ));
            let location = station.location();
            if !location.is_empty() {
                spans.push(Span::styled(
                    format!("  {}", location),
                    Style::default().fg(C_LOCATION),
                ));
            }
        }
        None => spans.push(Span::styled("swipe radio", Style::default().fg(C_SECONDARY))),
    }
    Line::from(spans)
}

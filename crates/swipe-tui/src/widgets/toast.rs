//! Toasts and the transition banner.
//!
//! Toasts are transient messages stacked in the top-right corner.  The banner
//! is a single animated line centred at the bottom of the carousel that
//! stays up while playback is loading or switching.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::theme::{C_TOAST_ERROR, C_TOAST_INFO, C_TOAST_SUCCESS, C_TOAST_WARNING};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

struct Toast {
    message: String,
    severity: Severity,
    expires: Instant,
}

struct Banner {
    message: String,
    frame: usize,
}

const SPINNER_FRAMES: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

pub struct ToastManager {
    toasts: VecDeque<Toast>,
    banner: Option<Banner>,
    max_visible: usize,
}

impl ToastManager {
    pub fn new() -> Self {
        Self {
            toasts: VecDeque::new(),
            banner: None,
            max_visible: 3,
        }
    }

    pub fn push(&mut self, message: impl Into<String>, severity: Severity, duration: Duration) {
        let msg = message.into();
        self.toasts.retain(|t| t.message != msg);
        self.toasts.push_back(Toast {
            message: msg,
            severity,
            expires: Instant::now() + duration,
        });
        while self.toasts.len() > self.max_visible * 2 {
            self.toasts.pop_front();
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Info, Duration::from_secs(3));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Success, Duration::from_secs(3));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Warning, Duration::from_secs(4));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Error, Duration::from_secs(5));
    }

    /// Show, replace or clear the banner.  Setting the same text again keeps
    /// the animation running.
    pub fn set_banner(&mut self, message: Option<&str>) {
        match message {
            Some(m) if self.banner_text() == Some(m) => {}
            Some(m) => {
                self.banner = Some(Banner {
                    message: m.to_string(),
                    frame: 0,
                })
            }
            None => self.banner = None,
        }
    }

    pub fn banner_text(&self) -> Option<&str> {
        self.banner.as_ref().map(|b| b.message.as_str())
    }

    /// Drop expired toasts and advance the banner spinner.  Call each tick.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.toasts.retain(|t| t.expires > now);
        if let Some(ref mut b) = self.banner {
            b.frame = (b.frame + 1) % SPINNER_FRAMES.len();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty() && self.banner.is_none()
    }

    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        if self.is_empty() {
            return;
        }
        self.draw_banner(frame, area);

        let max_width = (area.width / 2).clamp(30, 60).min(area.width);
        let mut y = area.y + 1;
        for toast in self.toasts.iter().rev().take(self.max_visible) {
            if y >= area.y + area.height {
                break;
            }
            let (color, icon) = match toast.severity {
                Severity::Info => (C_TOAST_INFO, "·"),
                Severity::Success => (C_TOAST_SUCCESS, "✓"),
                Severity::Warning => (C_TOAST_WARNING, "!"),
                Severity::Error => (C_TOAST_ERROR, "✗"),
            };
            let w = (toast.message.width() as u16 + 5).min(max_width);
            let toast_area = Rect {
                x: area.x + area.width.saturating_sub(w + 1),
                y,
                width: w,
                height: 1,
            };
            frame.render_widget(Clear, toast_area);
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(
                    format!(" {} {} ", icon, toast.message),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))),
                toast_area,
            );
            y += 1;
        }
    }

    fn draw_banner(&self, frame: &mut Frame, area: Rect) {
        let Some(ref b) = self.banner else {
            return;
        };
        if area.height < 3 {
            return;
        }
        let icon = SPINNER_FRAMES[b.frame % SPINNER_FRAMES.len()];
        let w = (b.message.width() as u16 + 5).min(area.width);
        let banner_area = Rect {
            x: area.x + area.width.saturating_sub(w) / 2,
            y: area.y + area.height - 2,
            width: w,
            height: 1,
        };
        frame.render_widget(Clear, banner_area);
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                format!(" {} {} ", icon, b.message),
                Style::default()
                    .fg(C_TOAST_WARNING)
                    .add_modifier(Modifier::BOLD),
            ))),
            banner_area,
        );
    }
}

impl Default for ToastManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Looping background clips.
//!
//! `VideoLoop` decides when to seek; a `VideoSurface` carries it out.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::protocol::VideoClip;

fn video_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?:youtube\.com/(?:[^/]+/.+/|(?:v|e(?:mbed)?|shorts)/|.*[?&]v=)|youtu\.be/)([^"&?/\s]{11})"#,
        )
        .ok()
    })
    .as_ref()
}

/// The 11-character YouTube id in `url`, if it is a YouTube link.
pub fn extract_video_id(url: &str) -> Option<String> {
    video_id_regex()?
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// What the surface should play for `clip`: a canonical watch URL for
/// YouTube links, the URL itself otherwise.
pub fn playable_url(clip: &VideoClip) -> String {
    match extract_video_id(&clip.url) {
        Some(id) => format!("https://www.youtube.com/watch?v={}", id),
        None => clip.url.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopAction {
    SeekTo(f64),
    /// Seek then resume playback (after the view was hidden).
    ResumeAt(f64),
}

#[derive(Debug, Clone)]
pub struct VideoLoop {
    start: f64,
    end: Option<f64>,
    last_position: Option<f64>,
}

impl VideoLoop {
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        let start = start.unwrap_or(0.0).max(0.0);
        Self {
            start,
            end: end.filter(|e| *e > start),
            last_position: None,
        }
    }

    pub fn for_clip(clip: &VideoClip) -> Self {
        Self::new(clip.start_secs, clip.end_secs)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    /// Periodic playback position report.
    pub fn on_time(&mut self, position: f64) -> Option<LoopAction> {
        self.last_position = Some(position);
        match self.end {
            Some(end) if position >= end => {
                self.last_position = Some(self.start);
                Some(LoopAction::SeekTo(self.start))
            }
            _ => None,
        }
    }

    /// The asset itself finished.
    pub fn on_ended(&mut self) -> Option<LoopAction> {
        self.last_position = Some(self.start);
        Some(LoopAction::SeekTo(self.start))
    }

    /// The view was shown or hidden.  On show, resume where we were (or at
    /// the loop start when nothing is known).
    pub fn on_visibility(&mut self, visible: bool, position: Option<f64>) -> Option<LoopAction> {
        if let Some(p) = position {
            self.last_position = Some(p);
        }
        if !visible {
            return None;
        }
        let at = match self.last_position {
            Some(p) if p > 0.0 => p,
            _ => self.start,
        };
        Some(LoopAction::ResumeAt(at))
    }
}

#[async_trait]
pub trait VideoSurface: Send + Sync {
    async fn play(&self, url: &str, start: f64) -> anyhow::Result<()>;
    async fn seek(&self, secs: f64) -> anyhow::Result<()>;
    async fn resume(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Apply a loop decision to a surface.
pub async fn apply<S: VideoSurface + ?Sized>(surface: &S, action: LoopAction) -> anyhow::Result<()> {
    match action {
        LoopAction::SeekTo(secs) => surface.seek(secs).await,
        LoopAction::ResumeAt(secs) => {
            surface.seek(secs).await?;
            surface.resume().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id_shapes() {
        let id = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?t=10"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/v/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"), id);
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"),
            id
        );
        assert_eq!(extract_video_id("https://vimeo.com/12345"), None);
    }

    #[test]
    fn test_playable_url() {
        let clip = VideoClip {
            url: "https://youtu.be/dQw4w9WgXcQ".into(),
            ..VideoClip::default()
        };
        assert_eq!(playable_url(&clip), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        let other = VideoClip {
            url: "/srv/loops/city.mp4".into(),
            ..VideoClip::default()
        };
        assert_eq!(playable_url(&other), "/srv/loops/city.mp4");
    }

    #[test]
    fn test_loops_at_end_marker() {
        let mut lp = VideoLoop::new(Some(12.0), Some(40.0));
        assert_eq!(lp.on_time(20.0), None);
        assert_eq!(lp.on_time(40.2), Some(LoopAction::SeekTo(12.0)));
    }

    #[test]
    fn test_end_before_start_is_ignored() {
        let lp = VideoLoop::new(Some(30.0), Some(10.0));
        assert_eq!(lp.end(), None);
        let mut lp = VideoLoop::new(None, None);
        assert_eq!(lp.on_time(9999.0), None);
        assert_eq!(lp.on_ended(), Some(LoopAction::SeekTo(0.0)));
    }

    #[test]
    fn test_visibility_resumes_at_last_position() {
        let mut lp = VideoLoop::new(Some(5.0), None);
        assert_eq!(lp.on_visibility(true, None), Some(LoopAction::ResumeAt(5.0)));
        lp.on_time(17.5);
        assert_eq!(lp.on_visibility(false, None), None);
        assert_eq!(lp.on_visibility(true, None), Some(LoopAction::ResumeAt(17.5)));
        assert_eq!(
            lp.on_visibility(true, Some(21.0)),
            Some(LoopAction::ResumeAt(21.0))
        );
    }
}

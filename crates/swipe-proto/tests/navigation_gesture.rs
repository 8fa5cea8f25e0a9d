//! Drag and wheel input driving the playlist, the way the host wires them.

use std::time::{Duration, Instant};

use swipe_proto::carousel;
use swipe_proto::gesture::{DragStart, GestureConfig, GestureTracker, PointerTarget, Snap};
use swipe_proto::navigation::Navigator;
use swipe_proto::protocol::Station;
use swipe_proto::spring::SpringParams;
use swipe_proto::wheel::WheelAccumulator;

const VIEWPORT: f32 = 800.0;

fn playlist(n: usize) -> Vec<Station> {
    (0..n)
        .map(|i| Station {
            id: i.to_string(),
            name: format!("Station {}", i),
            stream_url: format!("https://example.org/{}.mp3", i),
            display_order: i as i64,
            ..Station::default()
        })
        .collect()
}

fn apply(nav: &mut Navigator, snap: Snap) {
    match snap {
        Snap::Next => {
            nav.next();
        }
        Snap::Previous => {
            nav.previous();
        }
        Snap::Current => {}
    }
}

fn settle(tracker: &mut GestureTracker, nav: &mut Navigator) {
    for _ in 0..5_000 {
        if let Some(snap) = tracker.tick(1.0 / 60.0) {
            apply(nav, snap);
            return;
        }
        if !tracker.is_animating() {
            return;
        }
    }
    panic!("settle never finished");
}

#[test]
fn slow_long_drag_up_advances() {
    let mut nav = Navigator::with_start(playlist(3), 1);
    let mut tracker = GestureTracker::new(GestureConfig::default(), SpringParams::default());
    let t0 = Instant::now();

    assert_eq!(
        tracker.pointer_down(500.0, t0, PointerTarget::Surface),
        DragStart::Started
    );
    // 200 px over a full second: well under the flick threshold.
    for step in 1..=10u64 {
        let y = 500.0 - 20.0 * step as f32;
        tracker.pointer_move(y, t0 + Duration::from_millis(100 * step), nav.bounds());
    }
    assert_eq!(tracker.offset(), -200.0);

    let mid = carousel::layout(nav.len(), 1, tracker.offset(), VIEWPORT, 1);
    assert!(mid.iter().any(|t| t.index == 2 && t.offset_px == 600.0));

    assert_eq!(tracker.pointer_up(VIEWPORT, nav.bounds()), Some(Snap::Next));
    settle(&mut tracker, &mut nav);
    assert_eq!(nav.index(), Some(2));
    assert_eq!(tracker.offset(), 0.0);
}

#[test]
fn short_drag_springs_back() {
    let mut nav = Navigator::with_start(playlist(3), 0);
    let mut tracker = GestureTracker::new(GestureConfig::default(), SpringParams::default());
    let t0 = Instant::now();

    tracker.pointer_down(400.0, t0, PointerTarget::Surface);
    tracker.pointer_move(350.0, t0 + Duration::from_millis(400), nav.bounds());
    tracker.pointer_move(340.0, t0 + Duration::from_millis(800), nav.bounds());
    assert_eq!(tracker.pointer_up(VIEWPORT, nav.bounds()), Some(Snap::Current));
    settle(&mut tracker, &mut nav);
    assert_eq!(nav.index(), Some(0));
    assert!(nav.history().is_empty());
}

#[test]
fn new_drag_cancels_running_settle() {
    let mut nav = Navigator::with_start(playlist(4), 0);
    let mut tracker = GestureTracker::new(GestureConfig::default(), SpringParams::default());
    let t0 = Instant::now();

    tracker.pointer_down(400.0, t0, PointerTarget::Surface);
    tracker.pointer_move(200.0, t0 + Duration::from_millis(300), nav.bounds());
    tracker.pointer_up(VIEWPORT, nav.bounds());
    tracker.tick(1.0 / 60.0);
    assert!(tracker.is_animating());

    tracker.pointer_down(300.0, t0 + Duration::from_millis(350), PointerTarget::Surface);
    assert!(tracker.is_dragging());
    assert_eq!(tracker.offset(), 0.0);
    // The cancelled slide-out never reports, so the index is untouched.
    assert_eq!(tracker.tick(1.0 / 60.0), None);
    assert_eq!(nav.index(), Some(0));
}

#[test]
fn wheel_burst_makes_one_decision() {
    let mut nav = Navigator::with_start(playlist(5), 2);
    let mut wheel = WheelAccumulator::default();
    let t0 = Instant::now();

    for i in 0..6u64 {
        wheel.push(50.0, t0 + Duration::from_millis(20 * i));
    }
    assert_eq!(wheel.poll(t0 + Duration::from_millis(120)), None);
    let snap = wheel.poll(t0 + Duration::from_millis(400));
    assert_eq!(snap, Some(Snap::Next));
    apply(&mut nav, Snap::Next);
    assert_eq!(nav.index(), Some(3));
    assert!(!wheel.is_pending());
}

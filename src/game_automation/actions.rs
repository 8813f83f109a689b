//! Input primitives with human-looking timing

use super::cancel::CancelToken;
use super::session::Session;
use crate::adb::Transport;
use crate::error::AutomationResult;
use crate::template_matching::BoundingBox;
use rand::Rng;
use std::time::Duration;

/// Tap at `(x, y)`, then wait for the UI to settle.
///
/// Returns whether the tap was delivered; only a stop request is an error.
pub async fn click<T: Transport>(session: &Session<T>, x: u32, y: u32) -> AutomationResult<bool> {
    session.token().check_running()?;
    let delivered = session.transport().tap(session.device(), x, y).await;
    if delivered {
        log::debug!("👆 Tap ({}, {})", x, y);
    } else {
        log::warn!("Tap at ({}, {}) was not delivered", x, y);
    }
    let settle = Duration::from_millis(session.config().actions.settle_ms);
    session.token().sleep(settle).await?;
    Ok(delivered)
}

/// Uniformly random point inside the rectangle, edges included. Corners may
/// be given in any order.
pub fn random_point(area: BoundingBox) -> (u32, u32) {
    let mut rng = rand::rng();
    (
        rng.random_range(area.x1..=area.x2),
        rng.random_range(area.y1..=area.y2),
    )
}

fn random_millis(min: u64, max: u64) -> Duration {
    let (lo, hi) = (min.min(max), min.max(max));
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

/// Tap a random point inside `(x1, y1)`-`(x2, y2)` after a short random
/// pause, then pause briefly again.
pub async fn random_click<T: Transport>(
    session: &Session<T>,
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
) -> AutomationResult<bool> {
    let area = BoundingBox::from_corners(x1, y1, x2, y2);
    let (x, y) = random_point(area);
    let actions = &session.config().actions;
    let pre_delay = random_millis(actions.pre_delay_min_ms, actions.pre_delay_max_ms);
    let post_delay = Duration::from_millis(actions.post_delay_ms);

    session.token().sleep(pre_delay).await?;
    let delivered = session.transport().tap(session.device(), x, y).await;
    if delivered {
        log::debug!("👆 Random tap ({}, {}) in [{},{},{},{}]", x, y, area.x1, area.y1, area.x2, area.y2);
        session.token().sleep(post_delay).await?;
    } else {
        log::warn!("Random tap at ({}, {}) was not delivered", x, y);
    }
    Ok(delivered)
}

/// Duration for [`random_sleep`]: below one second the result lies in
/// `[0.8t, 1.5t]`, otherwise in `[t - vt, t + 2vt]` and never below 0.3s.
pub fn jittered_secs(t: f64, variation: f64) -> f64 {
    let t = t.max(0.0);
    let mut rng = rand::rng();
    if t < 1.0 {
        rng.random_range(t * 0.8..=t * 1.5)
    } else {
        let spread = t * variation.abs();
        (t + rng.random_range(-spread..=spread * 2.0)).max(0.3)
    }
}

/// Interruptible sleep of roughly `t` seconds.
pub async fn random_sleep(token: &CancelToken, t: f64, variation: f64) -> AutomationResult<()> {
    let secs = jittered_secs(t, variation);
    log::debug!("💤 Sleeping {:.2}s", secs);
    token.sleep_secs(secs).await
}

/// Interruptible sleep for a uniform duration between `min` and `max`
/// seconds.
pub async fn random_sleep_range(token: &CancelToken, min: f64, max: f64) -> AutomationResult<()> {
    let (lo, hi) = (min.min(max).max(0.0), min.max(max).max(0.0));
    let secs = rand::rng().random_range(lo..=hi);
    log::debug!("💤 Sleeping {:.2}s", secs);
    token.sleep_secs(secs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_automation::testing::{FakeTransport, quick_session, session_with};

    #[tokio::test]
    async fn click_taps_then_settles() {
        let (transport, session) = session_with(FakeTransport::offline(), |c| c.actions.settle_ms = 300);
        let started = std::time::Instant::now();
        assert!(click(&session, 2400, 1740).await.unwrap());
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(transport.taps(), vec![(2400, 1740)]);
    }

    #[tokio::test]
    async fn click_after_stop_does_not_tap() {
        let (transport, session) = quick_session(FakeTransport::offline());
        session.token().stop();
        assert!(click(&session, 1, 1).await.unwrap_err().is_stop());
        assert!(transport.taps().is_empty());
    }

    #[tokio::test]
    async fn random_click_stays_inside_rectangle() {
        let (transport, session) = quick_session(FakeTransport::offline());
        for _ in 0..200 {
            random_click(&session, 1500, 1250, 1450, 1170).await.unwrap();
        }
        let taps = transport.taps();
        assert_eq!(taps.len(), 200);
        for (x, y) in taps {
            assert!((1450..=1500).contains(&x), "x={x}");
            assert!((1170..=1250).contains(&y), "y={y}");
        }
    }

    #[test]
    fn degenerate_rectangle_is_a_point() {
        let area = BoundingBox::from_corners(7, 9, 7, 9);
        for _ in 0..10 {
            assert_eq!(random_point(area), (7, 9));
        }
    }

    #[test]
    fn jitter_bounds() {
        for _ in 0..500 {
            let short = jittered_secs(0.5, 0.1);
            assert!((0.4..=0.75).contains(&short), "{short}");
            let long = jittered_secs(10.0, 0.1);
            assert!((9.0..=12.0).contains(&long), "{long}");
            let floored = jittered_secs(1.0, 0.9);
            assert!(floored >= 0.3, "{floored}");
        }
        assert_eq!(jittered_secs(2.0, 0.0), 2.0);
    }

    #[tokio::test]
    async fn random_sleep_range_respects_bounds() {
        let token = CancelToken::new();
        let started = std::time::Instant::now();
        random_sleep_range(&token, 0.3, 0.1).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(450), "{elapsed:?}");
    }
}

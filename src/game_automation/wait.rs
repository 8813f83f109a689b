//! Polling a device until a template shows up on screen

use super::session::Session;
use crate::adb::Transport;
use crate::error::{AutomationError, AutomationResult};
use crate::template_matching::{BoundingBox, MatchResult, Template};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// What [`wait_until_match`] does when the template never appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTimeout {
    /// Fail with [`AutomationError::Timeout`]
    #[default]
    Raise,
    /// Return `Ok(None)` so the caller can branch
    ReturnNone,
}

/// Where to look for the template on each poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchArea {
    #[default]
    FullScreen,
    /// Region mode on a fixed rectangle
    Region(BoundingBox),
}

/// One capture + match. A failed capture or an undecodable frame counts as
/// "not matched"; an unreadable template is an error. The session's token
/// reaches into the full-screen search, so a stop ends it early.
pub async fn probe<T: Transport>(
    session: &Session<T>,
    template: &Template,
    area: SearchArea,
    threshold: f32,
) -> AutomationResult<Option<MatchResult>> {
    let Some(frame) = session.transport().capture_frame(session.device()).await else {
        log::debug!("No frame from {}, treating as no match", session.device());
        return Ok(None);
    };

    let matcher = session.matcher().clone();
    let template = template.clone();
    let token = session.token().clone();
    let outcome = tokio::task::spawn_blocking(move || match area {
        SearchArea::FullScreen => matcher.match_frame(&frame, &template, threshold, &token),
        SearchArea::Region(region) => matcher.match_in_region(&frame, &template, region, threshold),
    })
    .await?;

    match outcome {
        Ok(result) => Ok(Some(result)),
        Err(AutomationError::FrameDecode { source }) => {
            log::warn!("Discarding undecodable frame: {}", source);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Block until `template` matches, checking the session's token every
/// iteration.
///
/// Polls at the configured interval with the configured threshold over the
/// full screen. See [`wait_until_match_in`] for the general form.
pub async fn wait_until_match<T: Transport>(
    session: &Session<T>,
    template: &Template,
    timeout: Duration,
    on_timeout: OnTimeout,
) -> AutomationResult<Option<MatchResult>> {
    let threshold = session.matcher().config().threshold;
    wait_until_match_in(
        session,
        template,
        SearchArea::FullScreen,
        threshold,
        timeout,
        on_timeout,
    )
    .await
}

pub async fn wait_until_match_in<T: Transport>(
    session: &Session<T>,
    template: &Template,
    area: SearchArea,
    threshold: f32,
    timeout: Duration,
    on_timeout: OnTimeout,
) -> AutomationResult<Option<MatchResult>> {
    let poll_interval = session.config().wait.poll_interval();
    let started = Instant::now();
    let deadline = started + timeout;
    let mut attempts = 0u32;

    log::debug!(
        "⏳ Waiting up to {:?} for '{}' (poll {:?})",
        timeout,
        template.name,
        poll_interval
    );

    loop {
        session.token().check_running()?;
        attempts += 1;

        if let Some(result) = probe(session, template, area, threshold).await?
            && result.is_match
        {
            log::info!(
                "✅ '{}' matched after {} attempt(s) in {:.1}s ({})",
                template.name,
                attempts,
                started.elapsed().as_secs_f32(),
                result
            );
            return Ok(Some(result));
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        session
            .token()
            .sleep(poll_interval.min(deadline - now))
            .await?;
        if Instant::now() >= deadline {
            break;
        }
    }

    let waited = started.elapsed();
    match on_timeout {
        OnTimeout::Raise => {
            log::warn!("⏰ '{}' not seen within {:?}", template.name, timeout);
            Err(AutomationError::Timeout {
                template: template.name.clone(),
                waited,
            })
        }
        OnTimeout::ReturnNone => {
            log::debug!("'{}' not seen within {:?}", template.name, timeout);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_automation::testing::{
        FakeTransport, button_template, encode, quick_session, screen_png, session_with, texture,
    };

    #[tokio::test]
    async fn returns_immediately_when_visible() {
        let dir = tempfile::tempdir().unwrap();
        let template = button_template(dir.path(), "restart");
        let (transport, session) =
            quick_session(FakeTransport::showing(screen_png(100, 80, Some((40, 30)))));

        let result = wait_until_match(&session, &template, Duration::from_secs(5), OnTimeout::Raise)
            .await
            .unwrap()
            .unwrap();

        assert!(result.is_match);
        assert_eq!(result.center(), Some((60, 45)));
        assert_eq!(transport.capture_count(), 1);
    }

    #[tokio::test]
    async fn keeps_polling_until_it_appears() {
        let dir = tempfile::tempdir().unwrap();
        let template = button_template(dir.path(), "start");
        let frames = vec![
            None,
            Some(vec![0xde, 0xad]),
            Some(screen_png(100, 80, None)),
            Some(screen_png(100, 80, Some((10, 40)))),
        ];
        let (transport, session) = quick_session(FakeTransport::with_frames(frames));

        let result = wait_until_match(&session, &template, Duration::from_secs(10), OnTimeout::Raise)
            .await
            .unwrap();

        assert!(result.is_some());
        assert_eq!(transport.capture_count(), 4);
    }

    #[tokio::test]
    async fn timeout_raises_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let template = button_template(dir.path(), "restart");
        let (_, session) = session_with(FakeTransport::showing(screen_png(60, 45, None)), |_| {});

        let started = std::time::Instant::now();
        let err = wait_until_match(&session, &template, Duration::from_secs(2), OnTimeout::Raise)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "{err:?}");
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2200), "{elapsed:?}");
    }

    #[tokio::test]
    async fn timeout_returns_none_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let template = button_template(dir.path(), "restart");
        let (_, session) = session_with(FakeTransport::offline(), |_| {});

        let started = std::time::Instant::now();
        let result = wait_until_match(&session, &template, Duration::from_secs(2), OnTimeout::ReturnNone)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(result.is_none());
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2200), "{elapsed:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_interrupts_wait() {
        let dir = tempfile::tempdir().unwrap();
        let template = button_template(dir.path(), "restart");
        let (_, session) = session_with(FakeTransport::offline(), |_| {});
        let token = session.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.stop();
        });

        let started = std::time::Instant::now();
        let err = wait_until_match(&session, &template, Duration::from_secs(30), OnTimeout::ReturnNone)
            .await
            .unwrap_err();

        assert!(err.is_stop());
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn stopped_token_checked_before_capture() {
        let dir = tempfile::tempdir().unwrap();
        let template = button_template(dir.path(), "restart");
        let (transport, session) = quick_session(FakeTransport::offline());
        session.token().stop();

        let err = wait_until_match(&session, &template, Duration::from_secs(1), OnTimeout::Raise)
            .await
            .unwrap_err();
        assert!(err.is_stop());
        assert_eq!(transport.capture_count(), 0);
    }

    #[tokio::test]
    async fn missing_template_is_fatal() {
        let (_, session) = quick_session(FakeTransport::showing(screen_png(100, 100, None)));
        let err = wait_until_match(
            &session,
            &Template::new("does/not/exist.png"),
            Duration::from_secs(5),
            OnTimeout::ReturnNone,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AutomationError::TemplateLoad { .. }));
    }

    #[tokio::test]
    async fn region_probe_reports_no_box() {
        let dir = tempfile::tempdir().unwrap();
        let template = button_template(dir.path(), "restart");
        let (_, session) = quick_session(FakeTransport::showing(screen_png(100, 80, Some((40, 30)))));

        let result = probe(
            &session,
            &template,
            SearchArea::Region(BoundingBox::from_corners(40, 30, 80, 60)),
            0.8,
        )
        .await
        .unwrap()
        .unwrap();
        assert!(result.is_match, "{result}");
        assert!(result.bounding_box.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_reaches_search_on_full_size_screen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banner.png");
        texture(200, 80, 7).save(&path).unwrap();
        let template = Template::new(&path);
        let (_, session) = quick_session(FakeTransport::showing(encode(&texture(1080, 2400, 99))));

        let token = session.token().clone();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.stop();
            std::time::Instant::now()
        });

        let err = wait_until_match(&session, &template, Duration::from_secs(60), OnTimeout::ReturnNone)
            .await
            .unwrap_err();
        let returned = std::time::Instant::now();
        let stopped_at = stopper.await.unwrap();

        assert!(err.is_stop(), "{err:?}");
        let latency = returned.saturating_duration_since(stopped_at);
        assert!(latency < Duration::from_secs(1), "stop took {latency:?}");
    }
}

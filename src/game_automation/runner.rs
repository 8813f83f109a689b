// Runs one routine at a time on a background task and reports how it ended
use super::cancel::CancelToken;
use super::notify::Notifier;
use super::routine::Routine;
use super::session::Session;
use crate::adb::Transport;
use crate::config::AppConfig;
use crate::error::{AutomationError, AutomationResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How a run ended. A stop request is a clean finish, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { rounds: u32 },
    Stopped { rounds: u32 },
    Failed { rounds: u32, error: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed { .. })
    }

    pub fn rounds(&self) -> u32 {
        match self {
            RunOutcome::Completed { rounds }
            | RunOutcome::Stopped { rounds }
            | RunOutcome::Failed { rounds, .. } => *rounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    Started { routine: String, device: String },
    RoundCompleted(u32),
    Finished(RunOutcome),
}

/// Supervisor side of a routine run.
///
/// Owns the cancellation token; [`ScriptRunner::stop`] (or stopping a clone
/// of [`ScriptRunner::token`]) ends the run at its next check.
pub struct ScriptRunner<T: Transport + 'static> {
    transport: Arc<T>,
    config: Arc<AppConfig>,
    notifier: Notifier,
    token: CancelToken,
    event_tx: mpsc::Sender<RunnerEvent>,
    handle: Option<JoinHandle<RunOutcome>>,
}

impl<T: Transport + 'static> ScriptRunner<T> {
    pub fn new(transport: Arc<T>, config: Arc<AppConfig>) -> (Self, mpsc::Receiver<RunnerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(32);
        let notifier = Notifier::new(config.notify.clone());
        let runner = Self {
            transport,
            config,
            notifier,
            token: CancelToken::new(),
            event_tx,
            handle: None,
        };
        (runner, event_rx)
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start `routine` against `device`. Refused while another run is
    /// active.
    pub fn start(&mut self, routine: Routine, device: &str) -> AutomationResult<()> {
        if self.is_running() {
            return Err(AutomationError::AlreadyRunning);
        }
        self.token.set_running(true);

        let session = Session::new(
            Arc::clone(&self.transport),
            device,
            self.token.clone(),
            Arc::clone(&self.config),
        );
        let notifier = self.notifier.clone();
        let event_tx = self.event_tx.clone();
        log::info!("🚀 Starting '{}' on {}", routine.name, device);

        self.handle = Some(tokio::spawn(async move {
            let _ = event_tx
                .send(RunnerEvent::Started {
                    routine: routine.name.clone(),
                    device: session.device().to_string(),
                })
                .await;

            let rounds = AtomicU32::new(0);
            let round_tx = event_tx.clone();
            let on_round = |n: u32| {
                rounds.store(n, Ordering::SeqCst);
                if round_tx.try_send(RunnerEvent::RoundCompleted(n)).is_err() {
                    log::debug!("Event channel full, dropped round {} notice", n);
                }
            };

            let result = routine.run(&session, &notifier, &on_round).await;
            let outcome = match result {
                Ok(n) => {
                    log::info!("✅ '{}' completed after {} round(s)", routine.name, n);
                    notifier.send_success(n).await;
                    RunOutcome::Completed { rounds: n }
                }
                Err(e) if e.is_stop() => {
                    let n = rounds.load(Ordering::SeqCst);
                    log::info!("⏹️ '{}' stopped by request after {} round(s)", routine.name, n);
                    RunOutcome::Stopped { rounds: n }
                }
                Err(e) => {
                    let n = rounds.load(Ordering::SeqCst);
                    log::error!("❌ '{}' failed after {} round(s): {}", routine.name, n, e);
                    notifier.send_failure(&e.to_string()).await;
                    RunOutcome::Failed {
                        rounds: n,
                        error: e.to_string(),
                    }
                }
            };

            let _ = event_tx.send(RunnerEvent::Finished(outcome.clone())).await;
            outcome
        }));
        Ok(())
    }

    /// Request a cooperative stop. Idempotent.
    pub fn stop(&self) {
        if self.is_running() {
            log::info!("🛑 Stop requested");
        }
        self.token.stop();
    }

    /// Wait for the current run to end. `None` if nothing was started.
    pub async fn wait(&mut self) -> AutomationResult<Option<RunOutcome>> {
        match self.handle.take() {
            Some(handle) => Ok(Some(handle.await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_automation::testing::FakeTransport;
    use std::time::Duration;

    fn runner() -> (ScriptRunner<FakeTransport>, mpsc::Receiver<RunnerEvent>, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::offline());
        let mut config = AppConfig::default();
        config.actions.settle_ms = 0;
        config.wait.poll_interval_ms = 100;
        let (runner, rx) = ScriptRunner::new(Arc::clone(&transport), Arc::new(config));
        (runner, rx, transport)
    }

    fn routine(text: &str) -> Routine {
        Routine::from_toml("test_routine", text).unwrap()
    }

    async fn drain(rx: &mut mpsc::Receiver<RunnerEvent>) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn completed_run_reports_rounds() {
        let (mut runner, mut rx, transport) = runner();
        runner
            .start(
                routine("max_rounds = 2\n[[repeat]]\naction = \"click\"\nx = 3\ny = 4\n"),
                "emulator-5554",
            )
            .unwrap();

        let outcome = runner.wait().await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Completed { rounds: 2 });
        assert_eq!(transport.taps().len(), 2);

        let events = drain(&mut rx).await;
        assert_eq!(
            events,
            vec![
                RunnerEvent::Started {
                    routine: "test_routine".into(),
                    device: "emulator-5554".into()
                },
                RunnerEvent::RoundCompleted(1),
                RunnerEvent::RoundCompleted(2),
                RunnerEvent::Finished(RunOutcome::Completed { rounds: 2 }),
            ]
        );
    }

    #[tokio::test]
    async fn stop_is_a_clean_finish() {
        let (mut runner, _rx, _) = runner();
        runner
            .start(routine("[[repeat]]\naction = \"sleep\"\nsecs = 30\n"), "emulator-5554")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(runner.is_running());

        let started = std::time::Instant::now();
        runner.stop();
        runner.stop();
        let outcome = runner.wait().await.unwrap().unwrap();

        assert_eq!(outcome, RunOutcome::Stopped { rounds: 0 });
        assert!(outcome.is_success());
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn second_start_is_refused_while_running() {
        let (mut runner, _rx, _) = runner();
        let looping = routine("[[repeat]]\naction = \"sleep\"\nsecs = 30\n");
        runner.start(looping.clone(), "emulator-5554").unwrap();
        assert!(matches!(
            runner.start(looping.clone(), "emulator-5554"),
            Err(AutomationError::AlreadyRunning)
        ));

        runner.stop();
        runner.wait().await.unwrap();

        // The token is re-armed for the next run.
        runner
            .start(routine("[[setup]]\naction = \"log\"\nmessage = \"hi\"\n"), "emulator-5554")
            .unwrap();
        assert_eq!(
            runner.wait().await.unwrap().unwrap(),
            RunOutcome::Completed { rounds: 0 }
        );
    }

    #[tokio::test]
    async fn timeout_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let template = crate::game_automation::testing::button_template(dir.path(), "restart");
        let mut failing = routine("[[repeat]]\naction = \"wait\"\ntemplate = \"restart\"\ntimeout_secs = 0.2\n");
        failing.templates.insert("restart".into(), template.path.clone());

        let (mut runner, _rx, _) = runner();
        runner.start(failing, "emulator-5554").unwrap();
        match runner.wait().await.unwrap().unwrap() {
            RunOutcome::Failed { rounds, error } => {
                assert_eq!(rounds, 0);
                assert!(error.contains("restart"), "{error}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_without_start_is_none() {
        let (mut runner, _rx, _) = runner();
        assert!(runner.wait().await.unwrap().is_none());
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn busy_repeat_block_can_be_stopped() {
        let (mut runner, _rx, _) = runner();
        runner
            .start(
                routine("[[repeat]]\naction = \"log\"\nmessage = \"tick {rounds}\"\n"),
                "emulator-5554",
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.stop();

        let outcome = tokio::time::timeout(Duration::from_secs(5), runner.wait())
            .await
            .expect("runner never yielded")
            .unwrap()
            .unwrap();
        assert!(
            matches!(outcome, RunOutcome::Stopped { rounds } if rounds > 0),
            "{outcome:?}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn completion_notice_survives_runtime_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("notified.txt");
        let script = crate::game_automation::testing::recording_script(dir.path(), &marker);

        let mut config = AppConfig::default();
        config.actions.settle_ms = 0;
        config.notify.enabled = true;
        config.notify.app_name = "Bot".into();
        config.notify.command = script.to_string_lossy().into_owned();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let outcome = rt.block_on(async {
            let (mut runner, _rx) = ScriptRunner::new(Arc::new(FakeTransport::offline()), Arc::new(config));
            runner
                .start(
                    routine("max_rounds = 1\n[[repeat]]\naction = \"click\"\nx = 1\ny = 1\n"),
                    "emulator-5554",
                )
                .unwrap();
            runner.wait().await.unwrap().unwrap()
        });
        drop(rt);

        assert_eq!(outcome, RunOutcome::Completed { rounds: 1 });
        let sent = std::fs::read_to_string(&marker).unwrap();
        assert!(sent.starts_with("Bot - run complete|"), "{sent}");
    }
}

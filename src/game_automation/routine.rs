//! Declarative automation routines loaded from TOML
//!
//! A routine names its templates, lists `setup` steps that run once and
//! `repeat` steps that loop until the run is stopped or `max_rounds` is
//! reached:
//!
//! ```toml
//! description = "Replay a mission forever"
//!
//! [templates]
//! restart = "templates/restart.png"
//!
//! [[repeat]]
//! action = "wait"
//! template = "restart"
//! timeout_secs = 360
//!
//! [[repeat]]
//! action = "count_round"
//!
//! [[repeat]]
//! action = "click"
//! x = 1882
//! y = 1745
//! ```

use super::actions::{click, random_click, random_sleep, random_sleep_range};
use super::joystick::{Direction, joystick_move};
use super::notify::Notifier;
use super::session::Session;
use super::wait::{OnTimeout, SearchArea, wait_until_match_in};
use crate::adb::Transport;
use crate::error::{AutomationError, AutomationResult};
use crate::template_matching::{BoundingBox, MatchResult, Template};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

fn default_variation() -> f64 {
    0.1
}

/// One instruction of a routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Click {
        x: u32,
        y: u32,
    },
    /// Tap somewhere inside `[x1, y1, x2, y2]`
    RandomClick {
        area: [u32; 4],
    },
    Swipe {
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u32,
    },
    Sleep {
        secs: f64,
    },
    RandomSleep {
        secs: f64,
        #[serde(default = "default_variation")]
        variation: f64,
    },
    RandomSleepRange {
        min_secs: f64,
        max_secs: f64,
    },
    Joystick {
        direction: String,
        secs: f64,
    },
    /// Block until the template appears
    Wait {
        template: String,
        timeout_secs: f64,
        #[serde(default)]
        on_timeout: OnTimeout,
        threshold: Option<f32>,
        region: Option<[u32; 4]>,
    },
    /// Wait for the template, then tap it
    ClickMatch {
        template: String,
        timeout_secs: f64,
        threshold: Option<f32>,
        region: Option<[u32; 4]>,
        /// Tap a random point of the match instead of its center
        #[serde(default)]
        random: bool,
    },
    /// Probe for the template and run one of two branches
    IfMatch {
        template: String,
        timeout_secs: f64,
        threshold: Option<f32>,
        region: Option<[u32; 4]>,
        #[serde(default)]
        then: Vec<Step>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Step>,
    },
    /// Count a completed round
    CountRound,
    /// `{rounds}` in the message is replaced by the round count
    Notify {
        message: String,
    },
    Log {
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Routine {
    /// Registry key; defaults to the file stem
    pub name: String,
    pub description: String,
    /// Alias -> image path, relative to the working directory
    pub templates: BTreeMap<String, PathBuf>,
    pub setup: Vec<Step>,
    pub repeat: Vec<Step>,
    /// Stop after this many rounds; unlimited when absent
    pub max_rounds: Option<u32>,
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

fn area(corners: [u32; 4]) -> BoundingBox {
    BoundingBox::from_corners(corners[0], corners[1], corners[2], corners[3])
}

fn search_area(region: Option<[u32; 4]>) -> SearchArea {
    region.map_or(SearchArea::FullScreen, |r| SearchArea::Region(area(r)))
}

impl Routine {
    pub fn from_toml(name: &str, text: &str) -> Result<Self, toml::de::Error> {
        let mut routine: Routine = toml::from_str(text)?;
        if routine.name.is_empty() {
            routine.name = name.to_string();
        }
        Ok(routine)
    }

    /// Parse and validate a routine file.
    pub fn load(path: &Path) -> AutomationResult<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("routine");
        let text = std::fs::read_to_string(path)?;
        let routine = Self::from_toml(stem, &text).map_err(|e| AutomationError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        routine.validate()?;
        Ok(routine)
    }

    pub fn template(&self, alias: &str) -> AutomationResult<Template> {
        self.templates
            .get(alias)
            .map(|path| Template::named(alias, path))
            .ok_or_else(|| AutomationError::routine(&self.name, format!("unknown template '{}'", alias)))
    }

    /// Check template aliases, directions and durations up front so a bad
    /// definition fails before anything is sent to the device.
    pub fn validate(&self) -> AutomationResult<()> {
        if self.name.is_empty() {
            return Err(AutomationError::routine("<unnamed>", "routine has no name"));
        }
        if self.setup.is_empty() && self.repeat.is_empty() {
            return Err(AutomationError::routine(&self.name, "no steps"));
        }
        self.validate_steps(&self.setup)?;
        self.validate_steps(&self.repeat)
    }

    fn validate_steps(&self, steps: &[Step]) -> AutomationResult<()> {
        let duration = |what: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(AutomationError::routine(&self.name, format!("invalid {}: {}", what, v)))
            }
        };
        for step in steps {
            match step {
                Step::Sleep { secs } | Step::RandomSleep { secs, .. } => duration("sleep", *secs)?,
                Step::RandomSleepRange { min_secs, max_secs } => {
                    duration("sleep", *min_secs)?;
                    duration("sleep", *max_secs)?;
                }
                Step::Joystick { direction, secs } => {
                    direction.parse::<Direction>()?;
                    duration("joystick duration", *secs)?;
                }
                Step::Wait {
                    template,
                    timeout_secs,
                    threshold,
                    ..
                }
                | Step::ClickMatch {
                    template,
                    timeout_secs,
                    threshold,
                    ..
                } => {
                    self.template(template)?;
                    duration("timeout", *timeout_secs)?;
                    self.validate_threshold(*threshold)?;
                }
                Step::IfMatch {
                    template,
                    timeout_secs,
                    threshold,
                    then,
                    otherwise,
                    ..
                } => {
                    self.template(template)?;
                    duration("timeout", *timeout_secs)?;
                    self.validate_threshold(*threshold)?;
                    self.validate_steps(then)?;
                    self.validate_steps(otherwise)?;
                }
                Step::Click { .. }
                | Step::RandomClick { .. }
                | Step::Swipe { .. }
                | Step::CountRound
                | Step::Notify { .. }
                | Step::Log { .. } => {}
            }
        }
        Ok(())
    }

    fn validate_threshold(&self, threshold: Option<f32>) -> AutomationResult<()> {
        match threshold {
            Some(t) if !(0.0..=1.0).contains(&t) => Err(AutomationError::routine(
                &self.name,
                format!("threshold {} outside 0..1", t),
            )),
            _ => Ok(()),
        }
    }

    /// Run setup once, then the repeat block until stopped or `max_rounds`
    /// is reached. Returns the number of rounds counted.
    ///
    /// `on_round` is called with the new count each time a round completes.
    pub async fn run<T: Transport>(
        &self,
        session: &Session<T>,
        notifier: &Notifier,
        on_round: &(dyn Fn(u32) + Send + Sync),
    ) -> AutomationResult<u32> {
        let mut exec = Execution {
            routine: self,
            session,
            notifier,
            on_round,
            rounds: 0,
            counted: false,
        };
        log::info!("▶️ Routine '{}' on {}", self.name, session.device());

        exec.run_steps(&self.setup).await?;

        while !self.repeat.is_empty() {
            if self.max_rounds.is_some_and(|max| exec.rounds >= max) {
                log::info!("🏁 Reached {} round(s)", exec.rounds);
                break;
            }
            exec.counted = false;
            exec.run_steps(&self.repeat).await?;
            if !exec.counted && !self.counts_rounds() {
                exec.count_round();
            }
            // A pass made only of log/notify/count steps never suspends.
            tokio::task::yield_now().await;
        }
        Ok(exec.rounds)
    }

    /// Whether the repeat block counts rounds itself.
    fn counts_rounds(&self) -> bool {
        fn contains(steps: &[Step]) -> bool {
            steps.iter().any(|s| match s {
                Step::CountRound => true,
                Step::IfMatch { then, otherwise, .. } => contains(then) || contains(otherwise),
                _ => false,
            })
        }
        contains(&self.repeat)
    }
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = AutomationResult<()>> + Send + 'a>>;

struct Execution<'r, T: Transport> {
    routine: &'r Routine,
    session: &'r Session<T>,
    notifier: &'r Notifier,
    on_round: &'r (dyn Fn(u32) + Send + Sync),
    rounds: u32,
    /// A count_round step ran during the current pass
    counted: bool,
}

impl<'r, T: Transport> Execution<'r, T> {
    fn count_round(&mut self) {
        self.rounds += 1;
        self.counted = true;
        log::info!("===== Round {} complete =====", self.rounds);
        (self.on_round)(self.rounds);
    }

    fn threshold(&self, threshold: Option<f32>) -> f32 {
        threshold.unwrap_or(self.session.matcher().config().threshold)
    }

    async fn find(
        &self,
        template: &str,
        timeout_secs: f64,
        threshold: Option<f32>,
        region: Option<[u32; 4]>,
        on_timeout: OnTimeout,
    ) -> AutomationResult<Option<MatchResult>> {
        let template = self.routine.template(template)?;
        wait_until_match_in(
            self.session,
            &template,
            search_area(region),
            self.threshold(threshold),
            secs(timeout_secs),
            on_timeout,
        )
        .await
    }

    fn run_steps<'a>(&'a mut self, steps: &'a [Step]) -> StepFuture<'a> {
        Box::pin(async move {
            for step in steps {
                self.session.token().check_running()?;
                self.run_step(step).await?;
            }
            Ok(())
        })
    }

    async fn run_step(&mut self, step: &Step) -> AutomationResult<()> {
        let session = self.session;
        let token = session.token();
        match step {
            Step::Click { x, y } => {
                click(session, *x, *y).await?;
            }
            Step::RandomClick { area: corners } => {
                random_click(session, corners[0], corners[1], corners[2], corners[3]).await?;
            }
            Step::Swipe {
                from,
                to,
                duration_ms,
            } => {
                token.check_running()?;
                if !session
                    .transport()
                    .swipe(session.device(), *from, *to, *duration_ms)
                    .await
                {
                    log::warn!("Swipe {:?} -> {:?} was not delivered", from, to);
                }
            }
            Step::Sleep { secs: s } => token.sleep(secs(*s)).await?,
            Step::RandomSleep { secs, variation } => random_sleep(token, *secs, *variation).await?,
            Step::RandomSleepRange { min_secs, max_secs } => {
                random_sleep_range(token, *min_secs, *max_secs).await?
            }
            Step::Joystick { direction, secs } => {
                joystick_move(session, direction, *secs).await?;
            }
            Step::Wait {
                template,
                timeout_secs,
                on_timeout,
                threshold,
                region,
            } => {
                self.find(template, *timeout_secs, *threshold, *region, *on_timeout)
                    .await?;
            }
            Step::ClickMatch {
                template,
                timeout_secs,
                threshold,
                region,
                random,
            } => {
                let Some(found) = self
                    .find(template, *timeout_secs, *threshold, *region, OnTimeout::Raise)
                    .await?
                else {
                    return Ok(());
                };
                // Region mode has no location; aim at the region itself.
                let target = found.bounding_box.or(region.map(area));
                match target {
                    Some(b) if *random => {
                        // x2/y2 are exclusive
                        let x2 = b.x2.saturating_sub(1).max(b.x1);
                        let y2 = b.y2.saturating_sub(1).max(b.y1);
                        random_click(session, b.x1, b.y1, x2, y2).await?;
                    }
                    Some(b) => {
                        let (x, y) = b.center();
                        click(session, x, y).await?;
                    }
                    None => log::warn!("'{}' matched without a location", template),
                }
            }
            Step::IfMatch {
                template,
                timeout_secs,
                threshold,
                region,
                then,
                otherwise,
            } => {
                let found = self
                    .find(template, *timeout_secs, *threshold, *region, OnTimeout::ReturnNone)
                    .await?
                    .is_some();
                log::info!("🔀 '{}' {}", template, if found { "present" } else { "absent" });
                let branch = if found { then } else { otherwise };
                self.run_steps(branch).await?;
            }
            Step::CountRound => self.count_round(),
            Step::Notify { message } => {
                let message = message.replace("{rounds}", &self.rounds.to_string());
                self.notifier.send(&self.routine.name, &message).await;
            }
            Step::Log { message } => {
                log::info!("{}", message.replace("{rounds}", &self.rounds.to_string()));
            }
        }
        Ok(())
    }
}

/// Routines by name, loaded from a directory of `*.toml` files.
#[derive(Debug, Clone, Default)]
pub struct RoutineRegistry {
    routines: BTreeMap<String, Routine>,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates before registering; a later routine with the same name
    /// replaces the earlier one.
    pub fn register(&mut self, routine: Routine) -> AutomationResult<()> {
        routine.validate()?;
        if self.routines.contains_key(&routine.name) {
            log::warn!("Routine '{}' registered twice, keeping the last", routine.name);
        }
        self.routines.insert(routine.name.clone(), routine);
        Ok(())
    }

    /// Load every `*.toml` in `dir`. A missing directory gives an empty
    /// registry; a malformed file is an error.
    pub fn load_dir(dir: &Path) -> AutomationResult<Self> {
        let mut registry = Self::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Routine directory {} does not exist", dir.display());
                return Ok(registry);
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("toml") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let routine = Routine::load(&path)?;
            log::debug!("📜 Loaded routine '{}' from {}", routine.name, path.display());
            registry.register(routine)?;
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> AutomationResult<&Routine> {
        self.routines
            .get(name)
            .ok_or_else(|| AutomationError::UnknownRoutine(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routines.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Routine> {
        self.routines.values()
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

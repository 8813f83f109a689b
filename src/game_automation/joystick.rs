//! Virtual joystick emulated with a single swipe per movement

use super::session::Session;
use crate::adb::Transport;
use crate::config::JoystickConfig;
use crate::error::{AutomationError, AutomationResult};
use rand::Rng;
use std::str::FromStr;

/// Unit movement vector in screen coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Direction {
    dx: f64,
    dy: f64,
}

impl Direction {
    pub fn unit(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }
}

impl FromStr for Direction {
    type Err = AutomationError;

    /// Any combination of `w` (up), `a` (left), `s` (down) and `d` (right).
    /// Opposite keys cancel; a combination that cancels out entirely is
    /// rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AutomationError::InvalidDirection(s.to_string());
        let (mut up, mut down, mut left, mut right) = (false, false, false, false);
        for c in s.chars() {
            match c.to_ascii_lowercase() {
                'w' => up = true,
                's' => down = true,
                'a' => left = true,
                'd' => right = true,
                _ => return Err(invalid()),
            }
        }
        let dx = f64::from(right as u8) - f64::from(left as u8);
        let dy = f64::from(down as u8) - f64::from(up as u8);
        let len = dx.hypot(dy);
        if len == 0.0 {
            return Err(invalid());
        }
        Ok(Self {
            dx: dx / len,
            dy: dy / len,
        })
    }
}

/// A fully resolved swipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipePlan {
    pub start: (u32, u32),
    pub end: (u32, u32),
    pub duration_ms: u32,
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut impl Rng) -> (f64, f64) {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    let r = (-2.0 * u1.ln()).sqrt();
    let theta = std::f64::consts::TAU * u2;
    (r * theta.cos(), r * theta.sin())
}

fn to_screen(v: f64) -> u32 {
    v.round().max(0.0) as u32
}

/// Randomize one joystick movement.
///
/// The start point is the configured center plus Gaussian jitter limited to
/// `jitter_max`, and the end point is projected from that start point, so
/// repeated movements in one direction are parallel.
pub fn plan_swipe(config: &JoystickConfig, direction: Direction, duration_secs: f64) -> SwipePlan {
    let mut rng = rand::rng();

    let (gx, gy) = gaussian(&mut rng);
    let (mut jx, mut jy) = (gx * config.jitter_sigma, gy * config.jitter_sigma);
    let offset = jx.hypot(jy);
    if offset > config.jitter_max && offset > 0.0 {
        let k = config.jitter_max / offset;
        jx *= k;
        jy *= k;
    }
    let start_x = f64::from(config.center.0) + jx;
    let start_y = f64::from(config.center.1) + jy;

    let rj = config.radius_jitter.abs();
    let radius = config.radius * rng.random_range(1.0 - rj..=1.0 + rj);
    let (ux, uy) = direction.unit();

    let jitter = config.duration_jitter_ms.abs();
    let base_ms = (duration_secs.max(0.0) * 1000.0).round() as i64;
    let duration_ms = (base_ms + rng.random_range(-jitter..=jitter)).max(i64::from(config.min_duration_ms));

    SwipePlan {
        start: (to_screen(start_x), to_screen(start_y)),
        end: (to_screen(start_x + ux * radius), to_screen(start_y + uy * radius)),
        duration_ms: u32::try_from(duration_ms).unwrap_or(u32::MAX),
    }
}

/// Hold the joystick in `direction` for about `duration_secs`.
///
/// One call is one straight swipe; a change of direction needs another call.
pub async fn joystick_move<T: Transport>(
    session: &Session<T>,
    direction: &str,
    duration_secs: f64,
) -> AutomationResult<bool> {
    let direction: Direction = direction.parse()?;
    let plan = plan_swipe(&session.config().joystick, direction, duration_secs);
    session.token().check_running()?;

    log::debug!(
        "🕹️ Joystick {:?} -> {:?} for {}ms",
        plan.start,
        plan.end,
        plan.duration_ms
    );
    let delivered = session
        .transport()
        .swipe(session.device(), plan.start, plan.end, plan.duration_ms)
        .await;
    if !delivered {
        log::warn!("Joystick swipe was not delivered");
    }
    Ok(delivered)
}

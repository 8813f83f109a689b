// Game automation module
// Cancellable waits, input primitives and declarative routines driven through
// a device transport.

pub mod actions;
pub mod cancel;
pub mod joystick;
pub mod notify;
pub mod routine;
pub mod runner;
pub mod session;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the main types and functions for easy access
pub use actions::{click, random_click, random_sleep, random_sleep_range};
pub use cancel::CancelToken;
pub use joystick::{Direction, SwipePlan, joystick_move, plan_swipe};
pub use notify::Notifier;
pub use routine::{Routine, RoutineRegistry, Step};
pub use runner::{RunOutcome, RunnerEvent, ScriptRunner};
pub use session::Session;
pub use wait::{OnTimeout, SearchArea, probe, wait_until_match, wait_until_match_in};

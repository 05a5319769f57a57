/*
 * The session layer: `DockSession` composes the providers and the preference
 * store into the single published dock-item list, and pumps change events
 * from background watchers onto the main context. Unit tests are in
 * `session_tests.rs`.
 */
pub mod session;

#[cfg(test)]
mod session_tests;

pub use session::{DockSession, SessionEvent};

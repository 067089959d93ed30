//! Envelope lifecycle rules.
//!
//! The state machine is pure: it takes an envelope and an event and returns
//! the next envelope or an error. Persistence and locking live in the
//! workflow coordinator and the envelope service.

pub mod state_machine;

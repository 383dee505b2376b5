//! The membership protocol state.
//!
//! This module owns the data the gossip state machine converges on: peer
//! records with their signed notes and accusations, the ring placements
//! that decide who monitors whom, the view indexing every known peer, and
//! the wire messages exchanged during a `Spread`. The state machine itself
//! (eval functions, merge, failure detector) lives in [`crate::node`].

mod accusation;
mod error;
mod message;
mod note;
mod peer;
mod ring;
mod view;

pub use {
	accusation::Accusation,
	error::Error,
	message::{Ping, Pong, State, StateResponse},
	note::Note,
	peer::Peer,
	view::{DeadlineTimer, View},
};

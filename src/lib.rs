//! Decentralized membership and gossip substrate.
//!
//! Each node maintains a signed view of every known peer and disseminates
//! membership state through point-to-point `Spread` exchanges with a small
//! set of ring neighbors. Liveness is decided by a ring-based failure
//! detector: monitors ping their ring successors and publish signed
//! accusations on timeout, and accused peers rebut by publishing a note
//! with a higher epoch. Every piece of view state is signed by the peer it
//! describes or by the peer accountable for the accusation, so the view
//! converges despite crashes, partitions and lying participants.
//!
//! The transport, certificate authority and application payload handling
//! are external collaborators injected as capabilities, see
//! [`transport::Connectivity`], [`transport::Prober`],
//! [`identity::CertificateAuthority`] and [`client::Client`].

mod client;
mod config;
mod error;
mod id;
pub mod identity;
pub mod membership;
pub mod node;
pub mod transport;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use {
	client::{Capabilities, Client},
	config::{Config, ConfigBuilder, ConfigBuilderError},
	error::Error,
	id::PeerId,
};

pub mod prelude {
	pub use super::{
		Capabilities,
		Client,
		Config,
		PeerId,
		identity::{Certificate, Identity},
		membership::{Accusation, Note, State, StateResponse},
		node::Node,
		transport::{Connectivity, Prober},
	};
}

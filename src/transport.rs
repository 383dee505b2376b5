//! Abstract authenticated transport.
//!
//! The wire carrier (message framing, mutually-authenticated TLS, stream
//! limits) is an external collaborator. The node only needs two outbound
//! capabilities, [`Connectivity`] and [`Prober`], and a [`CallerContext`]
//! describing what the carrier authenticated about an inbound caller. Both
//! sides of the contract deal in the parsed [`Certificate`] form; DER
//! handling stays inside the carrier.

use {
	crate::{
		identity::Certificate,
		membership::{State, StateResponse},
	},
	async_trait::async_trait,
	bytes::Bytes,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("peer unreachable: {0}")]
	Unreachable(String),

	#[error("request timed out")]
	Timeout,

	#[error("remote rejected the request: {0}")]
	Remote(String),
}

/// Outbound request/response channel to other peers.
///
/// Implementations must only deliver requests over a channel that
/// authenticates the local node with its certificate, so the remote
/// [`CallerContext`] is populated.
#[async_trait]
pub trait Connectivity: Send + Sync + 'static {
	/// Performs a `Spread` exchange with the peer at `addr`.
	async fn spread(
		&self,
		addr: &str,
		state: State,
	) -> Result<StateResponse, Error>;

	/// Delivers an opaque application payload to the peer at `addr` and
	/// returns its reply.
	async fn send(&self, addr: &str, payload: Bytes) -> Result<Bytes, Error>;
}

/// Failure-detector probe channel.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
	/// Probes the peer at `addr`; an `Err` is treated as a failed probe.
	async fn ping(&self, addr: &str) -> Result<(), Error>;
}

/// What the transport authenticated about an inbound caller.
///
/// The nesting mirrors what a TLS-terminating carrier can actually know:
/// there may be no peer at all, a peer without a TLS session, a session
/// without a client certificate, or a full chain. [`crate::node::Node`]
/// inbound handlers reject the first three.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
	peer: Option<TransportPeer>,
}

#[derive(Debug, Clone, Default)]
pub struct TransportPeer {
	auth: Option<AuthInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
	certificates: Vec<Certificate>,
}

impl CallerContext {
	/// A context with no peer information at all.
	pub const fn empty() -> Self {
		Self { peer: None }
	}

	/// A peer that arrived over a channel without TLS information.
	pub const fn without_tls() -> Self {
		Self {
			peer: Some(TransportPeer { auth: None }),
		}
	}

	/// An authenticated session that presented no client certificate.
	pub const fn without_certificate() -> Self {
		Self {
			peer: Some(TransportPeer {
				auth: Some(AuthInfo {
					certificates: Vec::new(),
				}),
			}),
		}
	}

	/// A fully authenticated caller.
	pub fn authenticated(certificate: Certificate) -> Self {
		Self {
			peer: Some(TransportPeer {
				auth: Some(AuthInfo {
					certificates: vec![certificate],
				}),
			}),
		}
	}

	pub const fn peer(&self) -> Option<&TransportPeer> {
		self.peer.as_ref()
	}
}

impl TransportPeer {
	pub const fn auth(&self) -> Option<&AuthInfo> {
		self.auth.as_ref()
	}
}

impl AuthInfo {
	/// The caller's certificate chain; the leaf comes first.
	pub fn certificates(&self) -> &[Certificate] {
		&self.certificates
	}
}

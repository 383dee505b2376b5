//! Stub capabilities and scaffolding for protocol tests.

use {
	crate::{
		config::Config,
		identity::{Certificate, CertificateAuthority, Identity, Locality},
		membership::{Note, State, StateResponse},
		node::Node,
		transport::{CallerContext, Connectivity, Error, Prober},
	},
	async_trait::async_trait,
	bytes::Bytes,
	parking_lot::Mutex,
	sha3::{Digest as _, Sha3_256},
	std::{
		collections::{HashMap, HashSet},
		sync::Arc,
	},
};

#[ctor::ctor]
fn init_test_logging() {
	use tracing_subscriber::{filter::filter_fn, prelude::*};
	if let Ok(v) = std::env::var("TEST_TRACE") {
		let level = match v.as_str() {
			"true" | "debug" | "on" => tracing::Level::DEBUG,
			"trace" => tracing::Level::TRACE,
			"info" => tracing::Level::INFO,
			"warn" => tracing::Level::WARN,
			"error" => tracing::Level::ERROR,
			_ => return,
		};

		let _ = tracing_subscriber::registry()
			.with(tracing_subscriber::fmt::layer())
			.with(filter_fn(move |metadata| metadata.level() <= &level))
			.try_init();
	}
}

/// A transport stub that records outbound exchanges and answers every
/// spread with an empty response and every send with an echo.
#[derive(Default)]
pub struct StubConnectivity {
	pub spreads: Mutex<Vec<(String, State)>>,
}

#[async_trait]
impl Connectivity for StubConnectivity {
	async fn spread(
		&self,
		addr: &str,
		state: State,
	) -> Result<StateResponse, Error> {
		self.spreads.lock().push((addr.to_string(), state));
		Ok(StateResponse::default())
	}

	async fn send(&self, _addr: &str, payload: Bytes) -> Result<Bytes, Error> {
		Ok(payload)
	}
}

/// A probe stub with a scriptable failure set.
#[derive(Default)]
pub struct StubProber {
	failing: Mutex<HashSet<String>>,
}

impl StubProber {
	/// Marks an address as unreachable for subsequent probes.
	pub fn fail(&self, addr: impl Into<String>) {
		self.failing.lock().insert(addr.into());
	}
}

#[async_trait]
impl Prober for StubProber {
	async fn ping(&self, addr: &str) -> Result<(), Error> {
		if self.failing.lock().contains(addr) {
			return Err(Error::Unreachable(addr.to_string()));
		}
		Ok(())
	}
}

/// An authority stub that assigns ids the same way self-signing does and
/// stamps a fixed ring count.
pub struct StubAuthority {
	pub rings: u32,
}

#[async_trait]
impl CertificateAuthority for StubAuthority {
	async fn issue(
		&self,
		public_key: &[u8],
		locality: &Locality,
	) -> Result<Certificate, crate::identity::Error> {
		let subject: [u8; 32] = Sha3_256::digest(public_key).into();
		Ok(Certificate::unsigned(
			subject.to_vec(),
			public_key.to_vec(),
			locality.clone(),
			self.rings,
		))
	}
}

/// An in-memory wire connecting the nodes of a test cluster.
///
/// Requests are dispatched straight into the callee's inbound handlers,
/// with a [`CallerContext`] carrying the caller's certificate the way an
/// authenticated carrier would. Unregistering a node simulates its death
/// at the transport level while its handlers keep existing.
#[derive(Default)]
pub struct Router {
	nodes: Mutex<HashMap<String, Node>>,
}

impl Router {
	/// Makes a node reachable under its advertised service address.
	pub fn register(&self, node: &Node) {
		self.nodes.lock().insert(node.addr(), node.clone());
	}

	/// Cuts a node off the wire.
	pub fn unregister(&self, addr: &str) {
		self.nodes.lock().remove(addr);
	}

	fn lookup(&self, addr: &str) -> Result<Node, Error> {
		self
			.nodes
			.lock()
			.get(addr)
			.cloned()
			.ok_or_else(|| Error::Unreachable(addr.to_string()))
	}

	/// One node's outbound side of this wire.
	pub fn handle(self: &Arc<Self>, certificate: Certificate) -> RouterHandle {
		RouterHandle {
			router: Arc::clone(self),
			certificate,
		}
	}

	/// An outbound side whose caller certificate is resolved lazily from
	/// the node registered under `own_addr`. Lets a [`crate::Client`] be
	/// wired to the router before its identity exists.
	pub fn client_handle(
		self: &Arc<Self>,
		own_addr: impl Into<String>,
	) -> RouterClientHandle {
		RouterClientHandle {
			router: Arc::clone(self),
			own_addr: own_addr.into(),
		}
	}
}

/// A per-caller [`Connectivity`] over a [`Router`], authenticated with the
/// caller's certificate.
pub struct RouterHandle {
	router: Arc<Router>,
	certificate: Certificate,
}

#[async_trait]
impl Connectivity for RouterHandle {
	async fn spread(
		&self,
		addr: &str,
		state: State,
	) -> Result<StateResponse, Error> {
		let callee = self.router.lookup(addr)?;
		callee
			.spread(
				&CallerContext::authenticated(self.certificate.clone()),
				&state,
			)
			.map_err(|e| Error::Remote(e.to_string()))
	}

	async fn send(&self, addr: &str, payload: Bytes) -> Result<Bytes, Error> {
		let callee = self.router.lookup(addr)?;
		callee
			.handle_message(payload)
			.map_err(|e| Error::Remote(e.to_string()))
	}
}

/// A per-caller [`Connectivity`] over a [`Router`] that authenticates with
/// whatever certificate the node registered under `own_addr` advertises.
pub struct RouterClientHandle {
	router: Arc<Router>,
	own_addr: String,
}

impl RouterClientHandle {
	fn own_certificate(&self) -> Result<Certificate, Error> {
		Ok(self.router.lookup(&self.own_addr)?.certificate().clone())
	}
}

#[async_trait]
impl Connectivity for RouterClientHandle {
	async fn spread(
		&self,
		addr: &str,
		state: State,
	) -> Result<StateResponse, Error> {
		let certificate = self.own_certificate()?;
		let callee = self.router.lookup(addr)?;
		callee
			.spread(&CallerContext::authenticated(certificate), &state)
			.map_err(|e| Error::Remote(e.to_string()))
	}

	async fn send(&self, addr: &str, payload: Bytes) -> Result<Bytes, Error> {
		let callee = self.router.lookup(addr)?;
		callee
			.handle_message(payload)
			.map_err(|e| Error::Remote(e.to_string()))
	}
}

/// A loopback locality; stub transports never dial it.
pub fn localhost_locality() -> Locality {
	Locality::new("127.0.0.1:8000", "127.0.0.1:8001", "127.0.0.1:8002")
}

/// A distinct loopback locality per cluster slot, for router-based tests
/// that key nodes and probe targets by address.
pub fn locality_for(slot: u16) -> Locality {
	let base = 9000 + u32::from(slot) * 3;
	Locality::new(
		format!("127.0.0.1:{base}"),
		format!("127.0.0.1:{}", base + 1),
		format!("127.0.0.1:{}", base + 2),
	)
}

/// A fresh identity participating in `rings` rings.
pub fn test_identity(rings: u32) -> Identity {
	Identity::self_signed(rings, localhost_locality())
		.expect("test identity generation cannot fail")
}

/// A node wired to stub capabilities, with handles to all of them.
pub struct StubNode {
	pub node: Node,
	pub identity: Arc<Identity>,
	pub connectivity: Arc<StubConnectivity>,
	pub prober: Arc<StubProber>,
}

/// Builds a node wired to stub capabilities and protocol intervals short
/// enough to drive the background loops inside a test.
pub fn stub_node(rings: u32) -> StubNode {
	let config = Config::builder()
		.with_num_rings(rings)
		.with_gossip_interval(core::time::Duration::from_millis(20))
		.with_monitor_interval(core::time::Duration::from_millis(20))
		.with_timer_sweep_interval(core::time::Duration::from_millis(10))
		.with_accusation_timeout(core::time::Duration::from_millis(50))
		.build()
		.expect("defaults");

	stub_node_with_config(rings, config)
}

/// Builds a node wired to stub capabilities with an explicit config.
pub fn stub_node_with_config(rings: u32, config: Config) -> StubNode {
	let identity = Arc::new(test_identity(rings));
	let connectivity = Arc::new(StubConnectivity::default());
	let prober = Arc::new(StubProber::default());

	let node = Node::new(
		Arc::clone(&connectivity) as _,
		Arc::clone(&prober) as _,
		Arc::clone(&identity) as _,
		Arc::clone(&identity) as _,
		config,
	)
	.expect("stub node construction cannot fail");

	StubNode {
		node,
		identity,
		connectivity,
		prober,
	}
}

/// Builds a node wired to a [`Router`] under a distinct per-slot locality,
/// registers it on the wire and returns it together with its identity. The
/// protocol intervals are short enough to drive convergence in a test.
pub fn router_node(
	router: &Arc<Router>,
	prober: &Arc<StubProber>,
	rings: u32,
	slot: u16,
	entry_addrs: Vec<String>,
) -> (Node, Arc<Identity>) {
	let identity = Arc::new(
		Identity::self_signed(rings, locality_for(slot))
			.expect("test identity generation cannot fail"),
	);

	let config = Config::builder()
		.with_num_rings(rings)
		.with_entry_addrs(entry_addrs)
		.with_gossip_interval(core::time::Duration::from_millis(20))
		.with_monitor_interval(core::time::Duration::from_millis(20))
		.with_timer_sweep_interval(core::time::Duration::from_millis(10))
		.with_accusation_timeout(core::time::Duration::from_millis(60))
		.build()
		.expect("defaults");

	let node = Node::new(
		Arc::new(router.handle(identity.certificate().clone())) as _,
		Arc::clone(prober) as _,
		Arc::clone(&identity) as _,
		Arc::clone(&identity) as _,
		config,
	)
	.expect("router node construction cannot fail");

	router.register(&node);
	(node, identity)
}

/// Admits a synthetic peer into the node's view the way the protocol
/// would: certificate into `full`, first note at epoch 1 with all rings
/// active, marked alive. Returns the peer's identity so tests can sign on
/// its behalf.
pub fn add_peer(node: &Node) -> Identity {
	let identity = test_identity(node.view().num_rings());
	let peer = node
		.view()
		.add_full(*identity.id(), identity.certificate().clone());
	peer.set_note(Note::new(*identity.id(), 1, u32::MAX, &identity));
	node.view().add_live(identity.id());
	identity
}

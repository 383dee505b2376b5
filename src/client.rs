use {
	crate::{
		config::Config,
		error::Error,
		id::PeerId,
		identity::{
			CertificateAuthority,
			Identity,
			IdentityProvider,
			Locality,
			Signer,
		},
		node::{MsgHandler, Node},
		transport::{Connectivity, Prober},
	},
	bytes::Bytes,
	p256::ecdsa::SigningKey,
	std::sync::Arc,
	tokio::sync::{mpsc, oneshot},
};

/// The injected implementations a node is built from.
///
/// The transport capabilities are mandatory; the certificate authority is
/// only consulted when [`Config::ca`] is set.
#[derive(Clone)]
pub struct Capabilities {
	pub connectivity: Arc<dyn Connectivity>,
	pub prober: Arc<dyn Prober>,
	pub authority: Option<Arc<dyn CertificateAuthority>>,
}

/// Handle for embedding applications.
///
/// A client owns one [`Node`], generates its identity (self-signed or
/// CA-issued, per [`Config::ca`]) and exposes the messaging surface the
/// application talks to. The protocol loops run in the background between
/// [`Client::start`] and [`Client::stop`].
pub struct Client {
	node: Node,
}

impl Client {
	pub async fn new(
		config: Config,
		capabilities: Capabilities,
	) -> Result<Self, Error> {
		let locality = Locality::new(
			config.service_addr.clone(),
			config.ping_addr.clone(),
			config.http_addr.clone(),
		);

		let identity: Arc<Identity> = if config.ca {
			let authority = capabilities
				.authority
				.clone()
				.ok_or(Error::MissingAuthority)?;

			let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
			let public_key = signing_key
				.verifying_key()
				.to_encoded_point(false)
				.as_bytes()
				.to_vec();
			let certificate = authority
				.issue(&public_key, &locality)
				.await?
				.into_signed(&signing_key);
			Arc::new(Identity::new(signing_key, certificate)?)
		} else {
			Arc::new(Identity::self_signed(config.num_rings, locality)?)
		};

		let node = Node::new(
			capabilities.connectivity,
			capabilities.prober,
			Arc::clone(&identity) as Arc<dyn IdentityProvider>,
			identity as Arc<dyn Signer>,
			config,
		)?;

		Ok(Self { node })
	}

	/// Starts the gossip and monitor loops.
	pub fn start(&self) {
		self.node.start();
	}

	/// Stops all protocol activity. Terminal; a stopped client cannot be
	/// restarted.
	pub fn stop(&self) {
		self.node.stop();
	}

	/// Sends an opaque payload to the named peer; the returned channel
	/// yields the remote's reply.
	pub fn send_to(
		&self,
		id: &PeerId,
		payload: Bytes,
	) -> oneshot::Receiver<Result<Bytes, Error>> {
		self.node.send_to(id, payload)
	}

	/// Sends an opaque payload to every live peer. Returns the reply
	/// channel and the number of recipients.
	pub fn send_to_all(
		&self,
		payload: Bytes,
	) -> (mpsc::Receiver<(PeerId, Result<Bytes, Error>)>, usize) {
		self.node.send_to_all(payload)
	}

	/// Registers the callback invoked for every payload delivered to this
	/// node, either directly or attached to inbound gossip.
	pub fn register_msg_handler(&self, handler: MsgHandler) {
		self.node.register_msg_handler(handler);
	}

	/// Sets the payload attached to every outbound `Spread`.
	pub fn set_gossip_content(&self, content: Bytes) {
		self.node.set_gossip_content(content);
	}

	/// Ids of all currently live members, this node included.
	pub fn members(&self) -> Vec<PeerId> {
		self.node.members()
	}

	/// The advertised service address of this node.
	pub fn addr(&self) -> String {
		self.node.addr()
	}

	/// The underlying node, for transports that need to dispatch inbound
	/// requests into it.
	pub fn node(&self) -> &Node {
		&self.node
	}
}

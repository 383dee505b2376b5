use {
	crate::{
		config::Config,
		id::PeerId,
		identity::{Certificate, IdentityProvider, Signer},
		membership::{self, Note, View},
		transport::{Connectivity, Prober},
	},
	bytes::Bytes,
	core::sync::atomic::{AtomicBool, Ordering},
	std::sync::Arc,
	tokio::sync::{Notify, mpsc, oneshot},
	tokio_util::sync::CancellationToken,
	tracing::info,
};

mod handlers;
mod worker;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("no peer information in caller context")]
	NoPeerInCtx,

	#[error("no TLS info in caller context")]
	NoTlsInfo,

	#[error("no certificate in caller context")]
	NoCert,

	#[error("caller is not a ring neighbour of this node")]
	NotMyNeighbour,

	#[error("own certificate carries an invalid ring count: {0}")]
	InvalidRingCount(u32),

	#[error("unknown peer {0}")]
	UnknownPeer(PeerId),

	#[error("no message handler registered")]
	NoHandler,

	#[error("message handler failed: {0}")]
	Handler(String),

	#[error(transparent)]
	Membership(#[from] membership::Error),
}

/// Application callback invoked for every payload delivered to this node.
pub type MsgHandler = Arc<
	dyn Fn(Bytes) -> Result<Bytes, Box<dyn std::error::Error + Send + Sync>>
		+ Send
		+ Sync,
>;

/// The composition root of one protocol participant.
///
/// A node owns the [`View`] and its own identity, and exposes the inbound
/// message API ([`Node::spread`], [`Node::ping`], [`Node::handle_message`])
/// that the embedding transport dispatches into. The four injected
/// capabilities cover everything the protocol needs from the outside
/// world: an authenticated request channel, a probe channel, the local
/// certificate material and a signing key. Tests substitute stubs for all
/// four.
///
/// This type is cheap to clone; all clones drive the same node.
pub struct Node(Arc<Inner>);

impl Clone for Node {
	fn clone(&self) -> Self {
		Self(Arc::clone(&self.0))
	}
}

struct Inner {
	config: Config,
	view: View,
	certificate: Certificate,
	comm: Arc<dyn Connectivity>,
	prober: Arc<dyn Prober>,
	signer: Arc<dyn Signer>,
	gossip_content: parking_lot::Mutex<Option<Bytes>>,
	msg_handler: parking_lot::RwLock<Option<MsgHandler>>,
	/// Wakes the gossip loop outside its regular tick, e.g. after a
	/// rebuttal that should propagate immediately.
	kick: Notify,
	cancel: CancellationToken,
	running: AtomicBool,
}

impl Node {
	/// Builds a node from its four capabilities.
	///
	/// The node starts alone: it knows itself, holds its own first note at
	/// epoch 1 with every ring activated, and considers itself alive. The
	/// background loops do not run until [`Node::start`].
	pub fn new(
		comm: Arc<dyn Connectivity>,
		prober: Arc<dyn Prober>,
		identity: Arc<dyn IdentityProvider>,
		signer: Arc<dyn Signer>,
		config: Config,
	) -> Result<Self, Error> {
		let certificate = identity.certificate();
		let id = certificate
			.id()
			.ok_or(membership::Error::InvalidId)?;

		let rings = certificate.rings();
		if rings == 0 || rings > 32 {
			return Err(Error::InvalidRingCount(rings));
		}

		let view = View::new(id, rings);
		let self_peer = view.add_full(id, certificate.clone());
		self_peer.set_note(Note::new(id, 1, initial_mask(rings), signer.as_ref()));
		view.add_live(&id);

		info!(id = %id, rings, "node initialized");

		Ok(Self(Arc::new(Inner {
			config,
			view,
			certificate,
			comm,
			prober,
			signer,
			gossip_content: parking_lot::Mutex::new(None),
			msg_handler: parking_lot::RwLock::new(None),
			kick: Notify::new(),
			cancel: CancellationToken::new(),
			running: AtomicBool::new(false),
		})))
	}

	pub fn id(&self) -> &PeerId {
		self.0.view.self_id()
	}

	pub fn view(&self) -> &View {
		&self.0.view
	}

	pub fn certificate(&self) -> &Certificate {
		&self.0.certificate
	}

	/// The advertised service address of this node.
	pub fn addr(&self) -> String {
		self.0.certificate.locality().service.clone()
	}

	/// Ids of all peers currently considered alive, the local node
	/// included.
	pub fn members(&self) -> Vec<PeerId> {
		self.0.view.live().iter().map(|peer| *peer.id()).collect()
	}

	/// Spawns the gossip and monitor loops. Idempotent; a stopped node
	/// stays stopped.
	pub fn start(&self) {
		if self.0.running.swap(true, Ordering::SeqCst) {
			return;
		}
		if self.0.cancel.is_cancelled() {
			return;
		}

		info!(id = %self.id(), "starting protocol loops");
		tokio::spawn(worker::run_gossip(self.clone()));
		tokio::spawn(worker::run_monitor(self.clone()));
	}

	/// Signals all loops to terminate. Outstanding exchanges are abandoned
	/// at their next cancellation check.
	pub fn stop(&self) {
		info!(id = %self.id(), "stopping protocol loops");
		self.0.cancel.cancel();
	}

	/// Registers the callback invoked for payloads delivered to this node.
	pub fn register_msg_handler(&self, handler: MsgHandler) {
		*self.0.msg_handler.write() = Some(handler);
	}

	/// Sets the payload attached to every outbound `Spread`.
	pub fn set_gossip_content(&self, content: Bytes) {
		*self.0.gossip_content.lock() = Some(content);
	}

	/// Sends an opaque payload to one peer; the returned channel yields
	/// the remote's reply.
	pub fn send_to(
		&self,
		id: &PeerId,
		payload: Bytes,
	) -> oneshot::Receiver<Result<Bytes, crate::Error>> {
		let (tx, rx) = oneshot::channel();
		let node = self.clone();
		let id = *id;
		tokio::spawn(async move {
			let _ = tx.send(node.send_to_peer(id, payload).await);
		});
		rx
	}

	/// Sends an opaque payload to every live peer. Returns the reply
	/// channel and the number of recipients.
	pub fn send_to_all(
		&self,
		payload: Bytes,
	) -> (
		mpsc::Receiver<(PeerId, Result<Bytes, crate::Error>)>,
		usize,
	) {
		let recipients: Vec<PeerId> = self
			.0
			.view
			.live()
			.iter()
			.map(|peer| *peer.id())
			.filter(|id| id != self.id())
			.collect();

		let (tx, rx) = mpsc::channel(recipients.len().max(1));
		for id in &recipients {
			let node = self.clone();
			let tx = tx.clone();
			let id = *id;
			let payload = payload.clone();
			tokio::spawn(async move {
				let result = node.send_to_peer(id, payload).await;
				let _ = tx.send((id, result)).await;
			});
		}

		(rx, recipients.len())
	}

	async fn send_to_peer(
		&self,
		id: PeerId,
		payload: Bytes,
	) -> Result<Bytes, crate::Error> {
		let peer = self.0.view.peer(&id).ok_or(Error::UnknownPeer(id))?;
		let addr = peer.service_addr().to_string();
		Ok(self.0.comm.send(&addr, payload).await?)
	}
}

/// The initial note mask: every ring the certificate covers is activated.
const fn initial_mask(rings: u32) -> u32 {
	if rings >= 32 {
		u32::MAX
	} else {
		(1u32 << rings) - 1
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn initial_mask_covers_exactly_the_ring_count() {
		assert_eq!(initial_mask(1), 0b1);
		assert_eq!(initial_mask(3), 0b111);
		assert_eq!(initial_mask(32), u32::MAX);
	}
}

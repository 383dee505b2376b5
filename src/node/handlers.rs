use {
	super::{Error, Node},
	crate::{
		id::PeerId,
		identity::Certificate,
		membership::{self, Accusation, Note, Ping, Pong, State, StateResponse},
		transport::CallerContext,
	},
	bytes::Bytes,
	std::collections::BTreeMap,
	tracing::{debug, info},
};

/// Inbound message API.
///
/// The embedding transport dispatches decoded requests into these
/// handlers. They are synchronous: all work happens against the local
/// view, and no lock is ever held while the transport does I/O.
impl Node {
	/// Handles a `Spread` exchange initiated by a remote caller.
	///
	/// The caller is admitted lazily: its certificate rides in the
	/// transport context and is evaluated before anything else, so a
	/// previously unknown (but validly certified) peer gets a seed set of
	/// its future neighbours instead of a rejection. Known callers must be
	/// ring neighbours of this node, except accused ones, which are always
	/// served so they learn the accusations against themselves and can
	/// rebut.
	pub fn spread(
		&self,
		ctx: &CallerContext,
		args: &State,
	) -> Result<StateResponse, Error> {
		let certificate = self.validate_ctx(ctx)?;
		let existed = certificate
			.id()
			.is_some_and(|id| self.0.view.exists(&id));

		self.eval_certificate(Some(certificate))?;
		let caller = certificate.id().ok_or(membership::Error::InvalidId)?;

		if !existed {
			return Ok(self.bootstrap_reply(&caller, args));
		}

		let peer = self
			.0
			.view
			.peer(&caller)
			.ok_or(membership::Error::NoPeer)?;

		if !peer.is_accused() && !self.0.view.should_be_neighbour(&caller) {
			debug!(peer = %caller, "rejecting spread from non-neighbour");
			return Err(Error::NotMyNeighbour);
		}

		if let Some(note) = &args.own_note {
			if let Err(e) = self.eval_note(note) {
				debug!(peer = %caller, error = %e, "dropped caller note");
			}
		}

		let mut reply = StateResponse::default();

		// the caller always learns of accusations against itself, even
		// when its state digest does not cover them
		if !args.existing.contains_key(&caller) {
			reply.accusations.extend(peer.accusations());
		}

		if !args.existing.is_empty() {
			self.merge_views(&args.existing, &mut reply);
		}

		self.deliver_payload(args, &mut reply);
		Ok(reply)
	}

	/// Failure-detector probe endpoint.
	pub fn ping(&self, _: Ping) -> Pong {
		Pong {}
	}

	/// Delivers an application payload to the registered message handler
	/// and returns its reply.
	pub fn handle_message(&self, payload: Bytes) -> Result<Bytes, Error> {
		let handler = self.0.msg_handler.read().clone();
		let handler = handler.ok_or(Error::NoHandler)?;
		handler(payload).map_err(|e| Error::Handler(e.to_string()))
	}

	/// Extracts the caller's leaf certificate from the transport context.
	pub fn validate_ctx<'a>(
		&self,
		ctx: &'a CallerContext,
	) -> Result<&'a Certificate, Error> {
		let peer = ctx.peer().ok_or(Error::NoPeerInCtx)?;
		let auth = peer.auth().ok_or(Error::NoTlsInfo)?;
		auth.certificates().first().ok_or(Error::NoCert)
	}
}

/// Artifact evaluation.
impl Node {
	/// Evaluates incoming certificate material, lazily admitting new peers.
	///
	/// An already-known id is accepted without touching its record, so
	/// certificates can gossip freely. A new id enters `full`, joins every
	/// ring and starts with empty note and accusation cells.
	pub fn eval_certificate(
		&self,
		certificate: Option<&Certificate>,
	) -> Result<(), membership::Error> {
		let certificate = certificate.ok_or(membership::Error::NilCert)?;

		if certificate.subject_key_id() == self.id().as_bytes() {
			return Err(membership::Error::SelfCert);
		}

		let id = certificate.id().ok_or(membership::Error::InvalidId)?;

		if !certificate.verify() {
			return Err(membership::Error::InvalidSignature);
		}

		if self.0.view.exists(&id) {
			return Ok(());
		}

		info!(peer = %id, "admitting new peer");
		self.0.view.add_full(id, certificate.clone());
		Ok(())
	}

	/// Evaluates an incoming note.
	///
	/// An accepted note replaces the peer's current one and drops every
	/// accusation not anchored to the new epoch. Only when no accusation
	/// survives does the peer (re-)enter `live` and lose its deadline
	/// timer; an accusation anchored at exactly the accepted epoch keeps
	/// the peer accused and the deadline armed.
	pub fn eval_note(&self, note: &Note) -> Result<(), membership::Error> {
		let peer = self
			.0
			.view
			.peer(note.id())
			.ok_or(membership::Error::NoPeer)?;

		if let Some(current) = peer.note() {
			if note.epoch() <= current.epoch() {
				return Err(membership::Error::OldNote);
			}
		}

		if note.mask() == 0 {
			return Err(membership::Error::InvalidMask);
		}

		if !note.verify(peer.certificate()) {
			return Err(membership::Error::InvalidSignature);
		}

		let still_accused = peer.set_note(note.clone());
		if still_accused {
			self.0.view.repin_timer(note.id(), note.clone());
			self.0.view.remove_live(note.id());
		} else {
			self.0.view.delete_timeout(note.id());
			self.0.view.add_live(note.id());
		}
		Ok(())
	}

	/// Evaluates an incoming accusation.
	///
	/// The accuser must be the peer every honest node would have picked as
	/// the accused's monitor on the named ring. An accusation naming the
	/// local node is never stored; it is proof that a rebuttal must be
	/// published, unless it claims an epoch this node never declared.
	pub fn eval_accusation(
		&self,
		accusation: &Accusation,
	) -> Result<(), membership::Error> {
		let accused_id = *accusation.accused();
		let accuser_id = *accusation.accuser();

		if accuser_id == accused_id {
			return Err(membership::Error::InvalidAccuser);
		}

		let accuser = self
			.0
			.view
			.peer(&accuser_id)
			.ok_or(membership::Error::InvalidAccuser)?;

		let expected =
			self.0.view.live_predecessor(accusation.ring(), &accused_id);
		if expected != Some(accuser_id) {
			return Err(membership::Error::InvalidAccuser);
		}

		if accused_id == *self.id() {
			if !accusation.verify(accuser.certificate()) {
				return Err(membership::Error::InvalidSignature);
			}

			let own_epoch =
				self.0.view.peer(self.id()).map_or(0, |peer| peer.epoch());
			if accusation.epoch() > own_epoch {
				return Err(membership::Error::InvalidSelfAccusation);
			}

			info!(
				accuser = %accuser_id,
				ring = accusation.ring(),
				"accused by a monitor, publishing rebuttal"
			);
			self.publish_rebuttal();
			return Ok(());
		}

		let accused = self
			.0
			.view
			.peer(&accused_id)
			.ok_or(membership::Error::NoPeer)?;

		let note = match accused.note() {
			Some(note) if note.epoch() == accusation.epoch() => note,
			_ => return Err(membership::Error::InvalidEpoch),
		};

		if !accusation.verify(accuser.certificate()) {
			return Err(membership::Error::InvalidSignature);
		}

		if accused.accusation_on(accusation.ring()).is_some() {
			return Err(membership::Error::AccAlreadyExists);
		}

		info!(
			accused = %accused_id,
			accuser = %accuser_id,
			ring = accusation.ring(),
			epoch = accusation.epoch(),
			"accusation accepted"
		);

		accused.add_accusation(accusation.clone());
		self.0.view.remove_live(&accused_id);
		if !self.0.view.has_timer(&accused_id) {
			self.0.view.start_timer(accused_id, note, accuser_id);
		}
		Ok(())
	}
}

/// View merging.
impl Node {
	/// Computes the delta between the local view and a caller's state
	/// digest.
	///
	/// For every locally known peer: a peer the caller has never heard of
	/// contributes its certificate and note; a peer whose local note is
	/// strictly newer contributes the note; an accused peer always
	/// contributes its note and every accusation, since accusations carry
	/// their own anchor epoch. Peers the caller is ahead on contribute
	/// nothing; the caller pushes those in its own gossip rounds.
	pub fn merge_views(
		&self,
		existing: &BTreeMap<PeerId, u64>,
		reply: &mut StateResponse,
	) {
		for peer in self.0.view.full() {
			let note = peer.note();
			let accusations = peer.accusations();
			let accused = !accusations.is_empty();

			match existing.get(peer.id()) {
				None => {
					reply.certificates.push(peer.certificate().clone());
					if let Some(note) = &note {
						reply.notes.push(note.clone());
					}
				}
				Some(&remote_epoch) => {
					if let Some(note) = &note {
						if note.epoch() > remote_epoch || accused {
							reply.notes.push(note.clone());
						}
					}
				}
			}

			reply.accusations.extend(accusations);
		}
	}

	/// Merges a `StateResponse` into the local view.
	///
	/// Certificates are applied first so that notes can be verified, and
	/// notes before accusations so that a rebuttal clears the accusations
	/// it invalidates within the same round. Validation failures are
	/// dropped; the protocol recovers through later rounds.
	pub fn merge_response(&self, response: StateResponse) {
		for certificate in &response.certificates {
			if let Err(e) = self.eval_certificate(Some(certificate)) {
				debug!(error = %e, "dropped gossiped certificate");
			}
		}

		for note in &response.notes {
			if let Err(e) = self.eval_note(note) {
				debug!(peer = %note.id(), error = %e, "dropped gossiped note");
			}
		}

		for accusation in &response.accusations {
			if let Err(e) = self.eval_accusation(accusation) {
				debug!(
					accused = %accusation.accused(),
					error = %e,
					"dropped gossiped accusation"
				);
			}
		}
	}

	/// Builds the local state digest sent on outbound gossip.
	pub fn local_state(&self) -> State {
		let mut existing = BTreeMap::new();
		for peer in self.0.view.full() {
			existing.insert(*peer.id(), peer.epoch());
		}

		State {
			own_note: self.0.view.peer(self.id()).and_then(|peer| peer.note()),
			existing,
			payload: self.0.gossip_content.lock().clone(),
		}
	}
}

impl Node {
	/// Seed response for a caller this node had never seen before: the
	/// certificates and notes of the caller's future neighbours plus this
	/// node itself.
	fn bootstrap_reply(&self, caller: &PeerId, args: &State) -> StateResponse {
		if let Some(note) = &args.own_note {
			if let Err(e) = self.eval_note(note) {
				debug!(peer = %caller, error = %e, "dropped bootstrap note");
			}
		}

		info!(peer = %caller, "seeding previously unknown caller");

		let mut seeds = self.0.view.find_neighbours(caller);
		if let Some(me) = self.0.view.peer(self.id()) {
			seeds.push(me);
		}

		let mut reply = StateResponse::default();
		for peer in seeds {
			reply.certificates.push(peer.certificate().clone());
			if let Some(note) = peer.note() {
				reply.notes.push(note);
			}
		}

		self.deliver_payload(args, &mut reply);
		reply
	}

	/// Publishes a fresh own note one epoch up, preserving the current
	/// mask. This is the only path by which the local epoch increases.
	fn publish_rebuttal(&self) {
		let id = *self.id();
		let Some(self_peer) = self.0.view.peer(&id) else {
			return;
		};

		let (epoch, mask) = self_peer.note().map_or_else(
			|| (0, super::initial_mask(self.0.view.num_rings())),
			|note| (note.epoch(), note.mask()),
		);

		let fresh = Note::new(id, epoch + 1, mask, self.0.signer.as_ref());
		self_peer.set_note(fresh);
		self.0.view.add_live(&id);

		// propagate the rebuttal outside the regular gossip cadence
		self.0.kick.notify_one();
	}

	/// Hands an attached gossip payload to the registered handler and
	/// carries its reply back.
	fn deliver_payload(&self, args: &State, reply: &mut StateResponse) {
		let Some(payload) = &args.payload else {
			return;
		};
		let handler = self.0.msg_handler.read().clone();
		let Some(handler) = handler else {
			return;
		};

		match handler(payload.clone()) {
			Ok(response) => reply.payload = Some(response),
			Err(e) => debug!(error = %e, "gossip payload handler failed"),
		}
	}
}

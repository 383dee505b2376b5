use {
	super::{Accusation, Note},
	crate::{id::PeerId, identity::Certificate},
	core::fmt,
	parking_lot::Mutex,
	std::collections::BTreeMap,
};

/// One known peer: immutable identity plus mutable signed state cells.
///
/// The mutable cells (current note and the accusation set) sit behind a
/// per-peer lock so that concurrent merges targeting different peers do
/// not serialize on the view lock. Lock order is always view before peer;
/// neither is ever held across I/O.
///
/// At most one accusation is held per ring. A peer is *accused* iff it has
/// at least one accusation, and *alive* iff it has a note and none.
pub struct Peer {
	id: PeerId,
	certificate: Certificate,
	state: Mutex<State>,
}

#[derive(Default)]
struct State {
	note: Option<Note>,
	accusations: BTreeMap<u32, Accusation>,
}

impl Peer {
	/// Creates a peer record from validated certificate material, with no
	/// note and no accusations. The id is passed separately because callers
	/// have already parsed and validated it during certificate evaluation.
	pub fn new(id: PeerId, certificate: Certificate) -> Self {
		Self {
			id,
			certificate,
			state: Mutex::new(State::default()),
		}
	}

	pub const fn id(&self) -> &PeerId {
		&self.id
	}

	pub const fn certificate(&self) -> &Certificate {
		&self.certificate
	}

	/// Snapshot of the current note.
	pub fn note(&self) -> Option<Note> {
		self.state.lock().note.clone()
	}

	/// The current note epoch, 0 when noteless.
	pub fn epoch(&self) -> u64 {
		self.state.lock().note.as_ref().map_or(0, Note::epoch)
	}

	/// Replaces the current note and drops every accusation that is no
	/// longer anchored to the new note's epoch. Returns true if the peer is
	/// still accused afterwards.
	pub fn set_note(&self, note: Note) -> bool {
		let mut state = self.state.lock();
		let epoch = note.epoch();
		state.note = Some(note);
		state.accusations.retain(|_, acc| acc.epoch() == epoch);
		!state.accusations.is_empty()
	}

	/// Marks the peer as noteless, e.g. when its certificate was just
	/// (re-)accepted and no signed state has arrived yet.
	pub fn clear_note(&self) {
		self.state.lock().note = None;
	}

	pub fn is_accused(&self) -> bool {
		!self.state.lock().accusations.is_empty()
	}

	/// Snapshot of all current accusations, ordered by ring.
	pub fn accusations(&self) -> Vec<Accusation> {
		self.state.lock().accusations.values().cloned().collect()
	}

	pub fn accusation_on(&self, ring: u32) -> Option<Accusation> {
		self.state.lock().accusations.get(&ring).cloned()
	}

	/// Attaches an accusation, keyed by its ring. An existing accusation on
	/// the same ring is left in place and false is returned.
	pub fn add_accusation(&self, accusation: Accusation) -> bool {
		let mut state = self.state.lock();
		match state.accusations.entry(accusation.ring()) {
			std::collections::btree_map::Entry::Occupied(_) => false,
			std::collections::btree_map::Entry::Vacant(slot) => {
				slot.insert(accusation);
				true
			}
		}
	}

	pub fn clear_accusations(&self) {
		self.state.lock().accusations.clear();
	}

	/// Convenience accessors into the certificate's locality.
	pub fn service_addr(&self) -> &str {
		&self.certificate.locality().service
	}

	pub fn ping_addr(&self) -> &str {
		&self.certificate.locality().ping
	}
}

impl fmt::Debug for Peer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		write!(
			f,
			"Peer({}, epoch: {}, accusations: {})",
			self.id,
			state.note.as_ref().map_or(0, Note::epoch),
			state.accusations.len()
		)
	}
}

use {
	super::{Note, Peer, ring::Ring},
	crate::{id::PeerId, identity::Certificate},
	core::time::Duration,
	parking_lot::RwLock,
	std::{
		collections::{BTreeSet, HashMap, HashSet},
		sync::Arc,
		time::Instant,
	},
};

/// An armed accusation deadline.
///
/// The accused's note is pinned at arming time: expiry only evicts when the
/// peer still holds the same note, so a rebuttal that raced the sweep wins.
/// Timers reference their target by id, never by pointer, so cancellation
/// is a map delete.
#[derive(Debug, Clone)]
pub struct DeadlineTimer {
	pub accused: PeerId,
	pub accuser: PeerId,
	pub note: Note,
	pub started: Instant,
}

/// The local database of known peers and their liveness.
///
/// Notes:
///
/// - `full` indexes every peer whose certificate has been accepted; `live`
///   is the subset currently considered alive. A peer is in `live` iff it
///   has an unaccused, non-nil note; the eval logic in [`crate::node`]
///   maintains that invariant.
///
/// - Every peer in `full` is placed on all rings. Ring *r* orders ids by
///   `SHA3-256(r ‖ id)`, so placements agree across all participants.
///
/// - Reads take the shared lock, writes the exclusive lock. Per-peer
///   note/accusation cells are guarded by the peer's own lock, acquired
///   strictly after the view lock. No lock is held across I/O.
pub struct View {
	self_id: PeerId,
	num_rings: u32,
	inner: RwLock<Inner>,
}

struct Inner {
	full: HashMap<PeerId, Arc<Peer>>,
	live: HashSet<PeerId>,
	rings: Vec<Ring>,
	timers: HashMap<PeerId, DeadlineTimer>,
}

impl Inner {
	/// Whether `id` can be picked as a gossip or monitoring neighbor on
	/// `ring`: it must be alive and participate in that ring.
	fn eligible(&self, id: &PeerId, ring: u32) -> bool {
		self.live.contains(id)
			&& self
				.full
				.get(id)
				.and_then(|peer| peer.note())
				.is_some_and(|note| note.ring_active(ring))
	}

	fn ring(&self, ring: u32) -> Option<&Ring> {
		ring.checked_sub(1)
			.and_then(|idx| self.rings.get(idx as usize))
	}

	fn live_successor(&self, ring: u32, anchor: &PeerId) -> Option<PeerId> {
		self
			.ring(ring)?
			.successor_where(anchor, |id| self.eligible(id, ring))
	}

	fn live_predecessor(&self, ring: u32, anchor: &PeerId) -> Option<PeerId> {
		self
			.ring(ring)?
			.predecessor_where(anchor, |id| self.eligible(id, ring))
	}
}

impl View {
	pub fn new(self_id: PeerId, num_rings: u32) -> Self {
		let rings = (1..=num_rings).map(Ring::new).collect();
		Self {
			self_id,
			num_rings,
			inner: RwLock::new(Inner {
				full: HashMap::new(),
				live: HashSet::new(),
				rings,
				timers: HashMap::new(),
			}),
		}
	}

	pub const fn self_id(&self) -> &PeerId {
		&self.self_id
	}

	pub const fn num_rings(&self) -> u32 {
		self.num_rings
	}

	/// Snapshot of every known peer.
	pub fn full(&self) -> Vec<Arc<Peer>> {
		self.inner.read().full.values().cloned().collect()
	}

	/// Snapshot of every peer currently considered alive.
	pub fn live(&self) -> Vec<Arc<Peer>> {
		let inner = self.inner.read();
		inner
			.live
			.iter()
			.filter_map(|id| inner.full.get(id).cloned())
			.collect()
	}

	pub fn peer(&self, id: &PeerId) -> Option<Arc<Peer>> {
		self.inner.read().full.get(id).cloned()
	}

	pub fn exists(&self, id: &PeerId) -> bool {
		self.inner.read().full.contains_key(id)
	}

	pub fn is_alive(&self, id: &PeerId) -> bool {
		self.inner.read().live.contains(id)
	}

	/// Admits a peer into `full` and onto every ring.
	///
	/// Idempotent: an already-known id keeps its existing record untouched,
	/// which is what lets certificates gossip freely without wiping state.
	pub fn add_full(&self, id: PeerId, certificate: Certificate) -> Arc<Peer> {
		let mut inner = self.inner.write();
		if let Some(existing) = inner.full.get(&id) {
			return Arc::clone(existing);
		}

		let peer = Arc::new(Peer::new(id, certificate));
		inner.full.insert(id, Arc::clone(&peer));
		for ring in &mut inner.rings {
			ring.insert(id);
		}
		peer
	}

	/// Removes a peer from the view entirely: `full`, `live`, all rings and
	/// any pending timer. Protocol-level eviction from `full` is not part
	/// of the gossip exchange; this exists for embedding-level
	/// administration and test scaffolding.
	pub fn remove_full(&self, id: &PeerId) -> Option<Arc<Peer>> {
		let mut inner = self.inner.write();
		let peer = inner.full.remove(id)?;
		inner.live.remove(id);
		inner.timers.remove(id);
		for ring in &mut inner.rings {
			ring.remove(id);
		}
		Some(peer)
	}

	pub fn add_live(&self, id: &PeerId) -> bool {
		let mut inner = self.inner.write();
		inner.full.contains_key(id) && inner.live.insert(*id)
	}

	pub fn remove_live(&self, id: &PeerId) -> bool {
		self.inner.write().live.remove(id)
	}

	/// The local node's gossip and monitoring targets on `ring`: the
	/// nearest alive, ring-active peers clockwise and counter-clockwise.
	pub fn my_ring_neighbours(
		&self,
		ring: u32,
	) -> Option<(Arc<Peer>, Arc<Peer>)> {
		let inner = self.inner.read();
		let succ = inner.live_successor(ring, &self.self_id)?;
		let prev = inner.live_predecessor(ring, &self.self_id)?;
		Some((
			Arc::clone(inner.full.get(&succ)?),
			Arc::clone(inner.full.get(&prev)?),
		))
	}

	/// Whether `id` is one of the local node's ring neighbours on any ring,
	/// i.e. a peer the local node would gossip with or be monitored by.
	pub fn should_be_neighbour(&self, id: &PeerId) -> bool {
		let inner = self.inner.read();
		(1..=self.num_rings).any(|ring| {
			inner.live_successor(ring, &self.self_id) == Some(*id)
				|| inner.live_predecessor(ring, &self.self_id) == Some(*id)
		})
	}

	/// The union over all rings of `id`'s immediate alive neighbours,
	/// excluding the local node itself.
	pub fn find_neighbours(&self, id: &PeerId) -> Vec<Arc<Peer>> {
		let inner = self.inner.read();
		let mut found = BTreeSet::new();
		for ring in 1..=self.num_rings {
			found.extend(inner.live_successor(ring, id));
			found.extend(inner.live_predecessor(ring, id));
		}
		found.remove(&self.self_id);
		found.remove(id);
		found
			.into_iter()
			.filter_map(|id| inner.full.get(&id).cloned())
			.collect()
	}

	/// The alive predecessor of `anchor` on `ring`; accusation validity is
	/// checked against this placement.
	pub fn live_predecessor(
		&self,
		ring: u32,
		anchor: &PeerId,
	) -> Option<PeerId> {
		self.inner.read().live_predecessor(ring, anchor)
	}

	/// Arms the accusation deadline for `accused`, pinning the note under
	/// accusation and the responsible accuser. A no-op when a timer is
	/// already running for this peer.
	pub fn start_timer(&self, accused: PeerId, note: Note, accuser: PeerId) {
		let mut inner = self.inner.write();
		inner.timers.entry(accused).or_insert_with(|| DeadlineTimer {
			accused,
			accuser,
			note,
			started: Instant::now(),
		});
	}

	pub fn has_timer(&self, id: &PeerId) -> bool {
		self.inner.read().timers.contains_key(id)
	}

	/// Re-pins a running timer to a newer note, keeping its deadline. Used
	/// when a note replacement leaves the peer accused.
	pub fn repin_timer(&self, id: &PeerId, note: Note) {
		if let Some(timer) = self.inner.write().timers.get_mut(id) {
			timer.note = note;
		}
	}

	/// Cancels the deadline timer for `id`, if any.
	pub fn delete_timeout(&self, id: &PeerId) {
		self.inner.write().timers.remove(id);
	}

	/// Expires timers older than `timeout`. A peer whose current note still
	/// equals the pinned note is evicted from `live`; a peer that rebutted
	/// in the meantime just loses the stale timer. Returns the evicted ids.
	pub fn sweep_timers(&self, timeout: Duration) -> Vec<PeerId> {
		let mut inner = self.inner.write();
		let expired: Vec<PeerId> = inner
			.timers
			.values()
			.filter(|timer| timer.started.elapsed() >= timeout)
			.map(|timer| timer.accused)
			.collect();

		let mut evicted = Vec::new();
		for id in expired {
			let Some(timer) = inner.timers.remove(&id) else {
				continue;
			};
			let current = inner.full.get(&id).and_then(|peer| peer.note());
			if current.as_ref() == Some(&timer.note) {
				inner.live.remove(&id);
				evicted.push(id);
			}
		}
		evicted
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::identity::{Identity, Locality},
	};

	const RINGS: u32 = 8;

	fn identity() -> Identity {
		Identity::self_signed(
			RINGS,
			Locality::new("127.0.0.1:8000", "127.0.0.1:8001", "127.0.0.1:8002"),
		)
		.unwrap()
	}

	fn seeded_view(peers: usize) -> (View, Vec<Identity>) {
		let me = identity();
		let view = View::new(*me.id(), RINGS);
		view.add_full(*me.id(), me.certificate().clone());
		let self_peer = view.peer(me.id()).unwrap();
		self_peer.set_note(Note::new(*me.id(), 1, u32::MAX, &me));
		view.add_live(me.id());

		let mut identities = vec![me];
		for _ in 0..peers {
			let identity = identity();
			let peer =
				view.add_full(*identity.id(), identity.certificate().clone());
			peer.set_note(Note::new(*identity.id(), 1, u32::MAX, &identity));
			view.add_live(identity.id());
			identities.push(identity);
		}
		(view, identities)
	}

	#[test]
	fn add_full_is_idempotent() {
		let (view, identities) = seeded_view(3);
		let id = *identities[1].id();
		let before = view.peer(&id).unwrap();
		before.set_note(Note::new(id, 5, u32::MAX, &identities[1]));

		let again = view.add_full(id, identities[1].certificate().clone());
		assert_eq!(again.epoch(), 5, "existing record must be untouched");
		assert_eq!(view.full().len(), 4);
	}

	#[test]
	fn ring_neighbours_are_deterministic() {
		let (view, _) = seeded_view(30);
		for ring in 1..=RINGS {
			let (s1, p1) = view.my_ring_neighbours(ring).unwrap();
			let (s2, p2) = view.my_ring_neighbours(ring).unwrap();
			assert_eq!(s1.id(), s2.id());
			assert_eq!(p1.id(), p2.id());
		}
	}

	#[test]
	fn dead_peers_are_skipped_as_neighbours() {
		let (view, _) = seeded_view(30);
		let ring = 1;
		let (succ, _) = view.my_ring_neighbours(ring).unwrap();
		let skipped = *succ.id();

		view.remove_live(&skipped);
		let (next, _) = view.my_ring_neighbours(ring).unwrap();
		assert_ne!(*next.id(), skipped);
	}

	#[test]
	fn deactivated_peers_are_skipped_on_that_ring() {
		let (view, identities) = seeded_view(30);
		let ring = 2;
		let (succ, _) = view.my_ring_neighbours(ring).unwrap();
		let skipped = *succ.id();
		let identity = identities
			.iter()
			.find(|identity| identity.id() == &skipped)
			.unwrap();

		// epoch 2 note that deactivates ring 2 but keeps the others
		let mask = u32::MAX & !(1 << (ring - 1));
		succ.set_note(Note::new(skipped, 2, mask, identity));

		let (next, _) = view.my_ring_neighbours(ring).unwrap();
		assert_ne!(*next.id(), skipped);
	}

	#[test]
	fn neighbour_relation_matches_ring_queries() {
		let (view, identities) = seeded_view(30);
		let mut expected = BTreeSet::new();
		for ring in 1..=RINGS {
			let (succ, prev) = view.my_ring_neighbours(ring).unwrap();
			expected.insert(*succ.id());
			expected.insert(*prev.id());
		}

		for identity in identities.iter().skip(1) {
			assert_eq!(
				view.should_be_neighbour(identity.id()),
				expected.contains(identity.id()),
			);
		}
	}

	#[test]
	fn timers_arm_once_and_cancel() {
		let (view, identities) = seeded_view(5);
		let accused = *identities[1].id();
		let accuser = *identities[2].id();
		let note = view.peer(&accused).unwrap().note().unwrap();

		view.start_timer(accused, note.clone(), accuser);
		assert!(view.has_timer(&accused));

		// second arming keeps the original deadline
		view.start_timer(accused, note, *identities[3].id());
		assert!(view.has_timer(&accused));

		view.delete_timeout(&accused);
		assert!(!view.has_timer(&accused));
	}

	#[test]
	fn sweep_evicts_only_unchanged_notes() {
		let (view, identities) = seeded_view(5);
		let evicted_id = *identities[1].id();
		let rebutted_id = *identities[2].id();
		let accuser = *identities[3].id();

		for id in [&evicted_id, &rebutted_id] {
			let note = view.peer(id).unwrap().note().unwrap();
			view.start_timer(*id, note, accuser);
		}

		// the rebutting peer publishes a newer note before expiry
		let rebutted = view.peer(&rebutted_id).unwrap();
		rebutted.set_note(Note::new(rebutted_id, 2, u32::MAX, &identities[2]));

		let evicted = view.sweep_timers(Duration::ZERO);
		assert_eq!(evicted, vec![evicted_id]);
		assert!(!view.is_alive(&evicted_id));
		assert!(view.is_alive(&rebutted_id));
		assert!(!view.has_timer(&evicted_id));
		assert!(!view.has_timer(&rebutted_id));
	}

	#[test]
	fn sweep_respects_the_deadline() {
		let (view, identities) = seeded_view(3);
		let accused = *identities[1].id();
		let note = view.peer(&accused).unwrap().note().unwrap();
		view.start_timer(accused, note, *identities[2].id());

		let evicted = view.sweep_timers(Duration::from_secs(3600));
		assert!(evicted.is_empty());
		assert!(view.has_timer(&accused));
		assert!(view.is_alive(&accused));
	}
}

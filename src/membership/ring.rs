use {
	crate::id::PeerId,
	sha3::{Digest as _, Sha3_256},
	std::{collections::BTreeMap, ops::Bound},
};

/// Sort key of one peer on one ring.
///
/// The hash makes the placement deterministic and uniform across all
/// participants; the id breaks hash collisions bytewise, so every peer
/// computes the same order.
type Position = ([u8; 32], PeerId);

fn position(ring: u32, id: &PeerId) -> Position {
	let mut hasher = Sha3_256::new();
	hasher.update(ring.to_le_bytes());
	hasher.update(id.as_bytes());
	(hasher.finalize().into(), *id)
}

/// One deterministic circular ordering of all known peer ids.
///
/// Rings are 1-indexed to line up with note mask bits. Every participant
/// that knows the same id set computes the same successors and
/// predecessors for any anchor, which is what makes accusations
/// verifiable: the accuser of a peer must be the peer every other honest
/// node would have picked as its monitor.
pub(crate) struct Ring {
	num: u32,
	order: BTreeMap<Position, PeerId>,
}

impl Ring {
	pub(crate) fn new(num: u32) -> Self {
		Self {
			num,
			order: BTreeMap::new(),
		}
	}

	pub(crate) fn insert(&mut self, id: PeerId) {
		self.order.insert(position(self.num, &id), id);
	}

	pub(crate) fn remove(&mut self, id: &PeerId) {
		self.order.remove(&position(self.num, id));
	}

	/// The first peer clockwise from `anchor` satisfying `eligible`.
	///
	/// The anchor itself is never yielded and does not have to be present
	/// on the ring; its position is recomputed from its id.
	pub(crate) fn successor_where(
		&self,
		anchor: &PeerId,
		mut eligible: impl FnMut(&PeerId) -> bool,
	) -> Option<PeerId> {
		let pos = position(self.num, anchor);
		self
			.order
			.range((Bound::Excluded(pos), Bound::Unbounded))
			.map(|(_, id)| id)
			.chain(
				self
					.order
					.range((Bound::Unbounded, Bound::Excluded(pos)))
					.map(|(_, id)| id),
			)
			.find(|id| *id != anchor && eligible(id))
			.copied()
	}

	/// The first peer counter-clockwise from `anchor` satisfying `eligible`.
	pub(crate) fn predecessor_where(
		&self,
		anchor: &PeerId,
		mut eligible: impl FnMut(&PeerId) -> bool,
	) -> Option<PeerId> {
		let pos = position(self.num, anchor);
		self
			.order
			.range((Bound::Unbounded, Bound::Excluded(pos)))
			.rev()
			.map(|(_, id)| id)
			.chain(
				self
					.order
					.range((Bound::Excluded(pos), Bound::Unbounded))
					.rev()
					.map(|(_, id)| id),
			)
			.find(|id| *id != anchor && eligible(id))
			.copied()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ids(n: usize) -> Vec<PeerId> {
		(0..n).map(|_| PeerId::random()).collect()
	}

	/// Unfiltered immediate `(successor, predecessor)` of `anchor`.
	fn neighbours(ring: &Ring, anchor: &PeerId) -> Option<(PeerId, PeerId)> {
		let succ = ring.successor_where(anchor, |_| true)?;
		let prev = ring.predecessor_where(anchor, |_| true)?;
		Some((succ, prev))
	}

	#[test]
	fn placement_is_deterministic() {
		let peers = ids(50);

		let mut a = Ring::new(3);
		let mut b = Ring::new(3);
		for id in &peers {
			a.insert(*id);
		}
		for id in peers.iter().rev() {
			b.insert(*id);
		}

		for id in &peers {
			assert_eq!(neighbours(&a, id), neighbours(&b, id));
		}
	}

	#[test]
	fn rings_differ_in_placement() {
		let peers = ids(50);
		let mut a = Ring::new(1);
		let mut b = Ring::new(2);
		for id in &peers {
			a.insert(*id);
			b.insert(*id);
		}

		// with 50 random peers at least one anchor must have different
		// neighbours on independently keyed rings
		assert!(
			peers
				.iter()
				.any(|id| neighbours(&a, id) != neighbours(&b, id))
		);
	}

	#[test]
	fn successor_and_predecessor_are_inverse() {
		let peers = ids(20);
		let mut ring = Ring::new(1);
		for id in &peers {
			ring.insert(*id);
		}

		for id in &peers {
			let (succ, prev) = neighbours(&ring, id).unwrap();
			assert_eq!(
				ring.predecessor_where(&succ, |_| true),
				Some(*id),
				"successor's predecessor must be the anchor"
			);
			assert_eq!(
				ring.successor_where(&prev, |_| true),
				Some(*id),
				"predecessor's successor must be the anchor"
			);
		}
	}

	#[test]
	fn walk_skips_ineligible_peers() {
		let peers = ids(10);
		let mut ring = Ring::new(1);
		for id in &peers {
			ring.insert(*id);
		}

		let anchor = peers[0];
		let (succ, _) = neighbours(&ring, &anchor).unwrap();
		let filtered = ring.successor_where(&anchor, |id| *id != succ).unwrap();
		assert_ne!(filtered, succ);
		assert_eq!(
			ring.successor_where(&succ, |id| *id != anchor),
			Some(filtered),
			"skipping the immediate successor must land on the next one"
		);
	}

	#[test]
	fn absent_anchor_still_resolves_neighbours() {
		let peers = ids(10);
		let mut ring = Ring::new(1);
		for id in &peers {
			ring.insert(*id);
		}

		let outsider = PeerId::random();
		let (succ, prev) = neighbours(&ring, &outsider).unwrap();
		assert_ne!(succ, outsider);
		assert_ne!(prev, outsider);
	}

	#[test]
	fn two_peer_ring_wraps() {
		let a = PeerId::random();
		let b = PeerId::random();
		let mut ring = Ring::new(1);
		ring.insert(a);
		ring.insert(b);

		assert_eq!(neighbours(&ring, &a), Some((b, b)));
		assert_eq!(neighbours(&ring, &b), Some((a, a)));
	}

	#[test]
	fn lone_peer_has_no_neighbours() {
		let a = PeerId::random();
		let mut ring = Ring::new(1);
		ring.insert(a);
		assert_eq!(neighbours(&ring, &a), None);
	}
}

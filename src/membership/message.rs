use {
	super::{Accusation, Note},
	crate::{id::PeerId, identity::Certificate},
	bytes::Bytes,
	serde::{Deserialize, Serialize},
	std::collections::BTreeMap,
};

/// The caller's side of a `Spread` exchange: a compact digest of what it
/// already knows, so the callee only returns the delta.
///
/// `existing` maps every known peer id to its current note epoch, 0 for
/// peers whose certificate is known but that are still noteless. The map
/// is ordered so the encoding is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
	pub own_note: Option<Note>,
	pub existing: BTreeMap<PeerId, u64>,
	pub payload: Option<Bytes>,
}

impl State {
	pub fn to_bytes(&self) -> Vec<u8> {
		rmp_serde::to_vec(self).expect("state serialization cannot fail")
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
		rmp_serde::from_slice(bytes)
	}
}

/// The callee's side of a `Spread` exchange: everything the caller was
/// missing. An empty but well-formed response means the caller's state was
/// exhaustive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
	pub certificates: Vec<Certificate>,
	pub notes: Vec<Note>,
	pub accusations: Vec<Accusation>,
	pub payload: Option<Bytes>,
}

impl StateResponse {
	pub fn is_empty(&self) -> bool {
		self.certificates.is_empty()
			&& self.notes.is_empty()
			&& self.accusations.is_empty()
			&& self.payload.is_none()
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		rmp_serde::to_vec(self).expect("state response serialization cannot fail")
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
		rmp_serde::from_slice(bytes)
	}
}

/// Failure-detector probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

/// Failure-detector probe response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::identity::{Identity, Locality},
	};

	#[test]
	fn state_wire_round_trip() {
		let identity = Identity::self_signed(
			4,
			Locality::new("127.0.0.1:8000", "127.0.0.1:8001", "127.0.0.1:8002"),
		)
		.unwrap();

		let mut state = State {
			own_note: Some(Note::new(*identity.id(), 3, 0b1111, &identity)),
			payload: Some(Bytes::from_static(b"app data")),
			..State::default()
		};
		state.existing.insert(*identity.id(), 3);
		state.existing.insert(PeerId::from([9u8; 32]), 0);

		let bytes = state.to_bytes();
		let decoded = State::from_bytes(&bytes).unwrap();
		assert_eq!(decoded, state);
		assert_eq!(decoded.to_bytes(), bytes);
	}

	#[test]
	fn empty_response_is_empty() {
		let response = StateResponse::default();
		assert!(response.is_empty());

		let bytes = response.to_bytes();
		let decoded = StateResponse::from_bytes(&bytes).unwrap();
		assert!(decoded.is_empty());
	}
}

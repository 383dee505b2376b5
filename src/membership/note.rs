use {
	crate::{
		id::PeerId,
		identity::{Certificate, Signer},
	},
	core::fmt,
	p256::ecdsa::{Signature, signature::Verifier as _},
	serde::{Deserialize, Serialize},
	sha3::{Digest as _, Sha3_256},
};

/// A peer's signed self-declaration of its current epoch and ring mask.
///
/// Notes are monotonic per peer: one with an epoch at or below the
/// currently accepted note is stale and dropped on receipt. Publishing a
/// note with a higher epoch is also the rebuttal mechanism, invalidating
/// accusations anchored to earlier epochs.
///
/// Bit *i* of the mask (1-indexed) declares participation in ring *i*; a
/// cleared bit deactivates the peer on that ring for both monitoring and
/// gossip. An all-zero mask is invalid.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
	id: PeerId,
	epoch: u64,
	mask: u32,
	signature: Vec<u8>,
}

impl Note {
	/// Creates a note signed over the canonical `id ‖ epoch ‖ mask` tuple.
	pub fn new(
		id: PeerId,
		epoch: u64,
		mask: u32,
		signer: &dyn Signer,
	) -> Self {
		let mut note = Self::unsigned(id, epoch, mask);
		note.signature = signer.sign(&note.digest());
		note
	}

	/// Creates a note without a valid signature.
	///
	/// Such a note fails [`Note::verify`]; it only exists as a decoding
	/// intermediate and as scaffolding for signature-rejection tests.
	pub fn unsigned(id: PeerId, epoch: u64, mask: u32) -> Self {
		Self {
			id,
			epoch,
			mask,
			signature: Vec::new(),
		}
	}

	pub const fn id(&self) -> &PeerId {
		&self.id
	}

	pub const fn epoch(&self) -> u64 {
		self.epoch
	}

	pub const fn mask(&self) -> u32 {
		self.mask
	}

	/// Whether the owner participates in `ring` (1-indexed).
	pub const fn ring_active(&self, ring: u32) -> bool {
		ring >= 1 && ring <= 32 && self.mask & (1u32 << (ring - 1)) != 0
	}

	/// Digest over the canonical fixed-width encoding of the signed tuple.
	pub fn digest(&self) -> [u8; 32] {
		let mut hasher = Sha3_256::new();
		hasher.update(self.id.as_bytes());
		hasher.update(self.epoch.to_le_bytes());
		hasher.update(self.mask.to_le_bytes());
		hasher.finalize().into()
	}

	/// Verifies the signature against the note owner's certificate.
	pub fn verify(&self, certificate: &Certificate) -> bool {
		let Ok(key) = certificate.verifying_key() else {
			return false;
		};
		let Ok(signature) = Signature::from_slice(&self.signature) else {
			return false;
		};
		key.verify(&self.digest(), &signature).is_ok()
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		rmp_serde::to_vec(self).expect("note serialization cannot fail")
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
		rmp_serde::from_slice(bytes)
	}
}

impl fmt::Debug for Note {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Note({}, epoch: {}, mask: {:#010x})",
			self.id, self.epoch, self.mask
		)
	}
}

#[cfg(test)]
mod tests {
	use {super::*, crate::identity::{Identity, Locality}};

	fn identity() -> Identity {
		Identity::self_signed(
			32,
			Locality::new("127.0.0.1:8000", "127.0.0.1:8001", "127.0.0.1:8002"),
		)
		.unwrap()
	}

	#[test]
	fn signed_note_verifies_against_owner_certificate() {
		let identity = identity();
		let note = Note::new(*identity.id(), 1, u32::MAX, &identity);
		assert!(note.verify(identity.certificate()));
	}

	#[test]
	fn unsigned_note_fails_verification() {
		let identity = identity();
		let note = Note::unsigned(*identity.id(), 1, u32::MAX);
		assert!(!note.verify(identity.certificate()));
	}

	#[test]
	fn note_signed_by_another_key_fails_verification() {
		let owner = identity();
		let imposter = identity();
		let note = Note::new(*owner.id(), 2, u32::MAX, &imposter);
		assert!(!note.verify(owner.certificate()));
	}

	#[test]
	fn wire_round_trip_is_byte_identical() {
		let identity = identity();
		let note = Note::new(*identity.id(), 7, 0b1010, &identity);
		let bytes = note.to_bytes();
		let decoded = Note::from_bytes(&bytes).unwrap();
		assert_eq!(decoded, note);
		assert_eq!(decoded.to_bytes(), bytes);
	}

	#[test]
	fn ring_mask_is_one_indexed() {
		let identity = identity();
		let note = Note::new(*identity.id(), 1, 0b101, &identity);
		assert!(note.ring_active(1));
		assert!(!note.ring_active(2));
		assert!(note.ring_active(3));
		assert!(!note.ring_active(0));
		assert!(!note.ring_active(33));
	}
}

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

/// A signed claim by one peer that another has failed.
///
/// The accuser stakes its own signature on the claim, so a lying accuser
/// is identifiable. An accusation is anchored to the accused's note epoch:
/// it is valid only while `epoch` equals the accused's current note epoch,
/// which is what lets the accused rebut by publishing a newer note.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accusation {
	accused: PeerId,
	accuser: PeerId,
	epoch: u64,
	ring: u32,
	signature: Vec<u8>,
}

impl Accusation {
	/// Creates an accusation signed by the accuser over the canonical
	/// `accused ‖ accuser ‖ epoch ‖ ring` tuple.
	pub fn new(
		accused: PeerId,
		accuser: PeerId,
		epoch: u64,
		ring: u32,
		signer: &dyn Signer,
	) -> Self {
		let mut accusation = Self::unsigned(accused, accuser, epoch, ring);
		accusation.signature = signer.sign(&accusation.digest());
		accusation
	}

	/// Creates an accusation without a valid signature; fails
	/// [`Accusation::verify`].
	pub fn unsigned(
		accused: PeerId,
		accuser: PeerId,
		epoch: u64,
		ring: u32,
	) -> Self {
		Self {
			accused,
			accuser,
			epoch,
			ring,
			signature: Vec::new(),
		}
	}

	pub const fn accused(&self) -> &PeerId {
		&self.accused
	}

	pub const fn accuser(&self) -> &PeerId {
		&self.accuser
	}

	pub const fn epoch(&self) -> u64 {
		self.epoch
	}

	pub const fn ring(&self) -> u32 {
		self.ring
	}

	pub fn digest(&self) -> [u8; 32] {
		let mut hasher = Sha3_256::new();
		hasher.update(self.accused.as_bytes());
		hasher.update(self.accuser.as_bytes());
		hasher.update(self.epoch.to_le_bytes());
		hasher.update(self.ring.to_le_bytes());
		hasher.finalize().into()
	}

	/// Verifies the signature against the accuser's certificate.
	pub fn verify(&self, accuser_certificate: &Certificate) -> bool {
		let Ok(key) = accuser_certificate.verifying_key() else {
			return false;
		};
		let Ok(signature) = Signature::from_slice(&self.signature) else {
			return false;
		};
		key.verify(&self.digest(), &signature).is_ok()
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		rmp_serde::to_vec(self).expect("accusation serialization cannot fail")
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
		rmp_serde::from_slice(bytes)
	}
}

impl fmt::Debug for Accusation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Accusation({} accused by {}, epoch: {}, ring: {})",
			self.accused, self.accuser, self.epoch, self.ring
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
	fn signed_accusation_verifies_against_accuser_certificate() {
		let accuser = identity();
		let accused = identity();
		let accusation =
			Accusation::new(*accused.id(), *accuser.id(), 1, 1, &accuser);
		assert!(accusation.verify(accuser.certificate()));
		assert!(!accusation.verify(accused.certificate()));
	}

	#[test]
	fn unsigned_accusation_fails_verification() {
		let accuser = identity();
		let accused = identity();
		let accusation =
			Accusation::unsigned(*accused.id(), *accuser.id(), 1, 1);
		assert!(!accusation.verify(accuser.certificate()));
	}

	#[test]
	fn wire_round_trip_is_byte_identical() {
		let accuser = identity();
		let accused = identity();
		let accusation =
			Accusation::new(*accused.id(), *accuser.id(), 3, 17, &accuser);
		let bytes = accusation.to_bytes();
		let decoded = Accusation::from_bytes(&bytes).unwrap();
		assert_eq!(decoded, accusation);
		assert_eq!(decoded.to_bytes(), bytes);
	}
}

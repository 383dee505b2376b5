use {
	core::{fmt, str::FromStr},
	derive_more::{From, Into},
	serde::{Deserialize, Serialize},
};

/// Number of bytes in a peer identifier.
pub const ID_LEN: usize = 32;

/// This type uniquely identifies a peer in the network.
///
/// It is the subject key id of the peer's certificate: a 32-byte value that
/// is compared bytewise. When the node self-signs, the id is derived from
/// the SEC1 encoding of its public key, but certificate authorities are
/// free to assign ids any way they like as long as they are unique.
#[derive(
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
	From,
	Into,
)]
pub struct PeerId([u8; ID_LEN]);

impl PeerId {
	pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
		&self.0
	}

	/// Parses an id from raw bytes, rejecting anything that is not exactly
	/// [`ID_LEN`] bytes long.
	pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
		<[u8; ID_LEN]>::try_from(bytes).ok().map(Self)
	}

	/// Full lowercase hex rendering of the id.
	pub fn full_hex(&self) -> String {
		hex::encode(self.0)
	}

	/// Generates a random id for testing purposes.
	#[cfg(any(test, feature = "test-utils"))]
	pub fn random() -> Self {
		use rand::RngCore;

		let mut bytes = [0u8; ID_LEN];
		rand::thread_rng().fill_bytes(&mut bytes);
		Self(bytes)
	}
}

/// Abbreviated rendering for logs; the full id is 64 hex chars.
impl fmt::Display for PeerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", &hex::encode(&self.0[..4]))
	}
}

impl fmt::Debug for PeerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PeerId({})", self.full_hex())
	}
}

impl AsRef<[u8]> for PeerId {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl FromStr for PeerId {
	type Err = hex::FromHexError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut bytes = [0u8; ID_LEN];
		hex::decode_to_slice(s, &mut bytes)?;
		Ok(Self(bytes))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slice_parsing_rejects_wrong_lengths() {
		assert!(PeerId::try_from_slice(&[0u8; 31]).is_none());
		assert!(PeerId::try_from_slice(&[0u8; 33]).is_none());
		assert!(PeerId::try_from_slice(b"Invalid id").is_none());
		assert!(PeerId::try_from_slice(&[7u8; 32]).is_some());
	}

	#[test]
	fn hex_round_trip() {
		let id = PeerId::random();
		let parsed: PeerId = id.full_hex().parse().unwrap();
		assert_eq!(id, parsed);
	}

	#[test]
	fn ids_order_bytewise() {
		let a = PeerId::from([0u8; 32]);
		let mut high = [0u8; 32];
		high[0] = 1;
		let b = PeerId::from(high);
		assert!(a < b);
	}
}

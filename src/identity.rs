//! Peer identity material.
//!
//! A peer's identity is an ECDSA keypair plus a certificate that binds the
//! public key to a 32-byte subject key id, a locality tuple and the number
//! of rings the owner participates in. Certificate issuance is an external
//! concern: either the node self-signs (see [`Identity::self_signed`]) or a
//! [`CertificateAuthority`] oracle yields the trusted material. The DER and
//! TLS carriers live with the transport collaborator; this module deals in
//! the parsed form only.

use {
	crate::id::PeerId,
	async_trait::async_trait,
	core::fmt,
	p256::ecdsa::{Signature, SigningKey, VerifyingKey, signature::Verifier as _},
	serde::{Deserialize, Serialize},
	sha3::{Digest as _, Sha3_256},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("public key is not a valid SEC1 encoding")]
	InvalidPublicKey,

	#[error("locality is missing a service address")]
	MissingServiceAddr,

	#[error("certificate authority error: {0}")]
	Authority(String),

	#[error("wire decoding failed: {0}")]
	Decode(#[from] rmp_serde::decode::Error),
}

/// Where a peer can be reached.
///
/// The service address carries protocol RPCs, the ping address the failure
/// detector probes, and the http address whatever diagnostic surface the
/// embedding application exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locality {
	pub service: String,
	pub ping: String,
	pub http: String,
}

impl Locality {
	pub fn new(
		service: impl Into<String>,
		ping: impl Into<String>,
		http: impl Into<String>,
	) -> Self {
		Self {
			service: service.into(),
			ping: ping.into(),
			http: http.into(),
		}
	}
}

/// The parsed trusted material describing one peer.
///
/// Notes:
///
/// - Certificates are content-addressed by their subject key id; two
///   certificates with the same id describe the same peer. The subject key
///   id is carried as raw bytes, exactly as an X.509 extension would hold
///   it, so a malformed length is representable and rejected during
///   evaluation rather than at decode time.
///
/// - The ring count travels as a 4-byte little-endian extension in the
///   original X.509 envelope; the same encoding is folded into the signed
///   digest here (see [`Certificate::ring_extension`]).
///
/// - The self-signature covers every other field, so a certificate cannot
///   be reassigned to a different key, locality or ring count without
///   failing [`Certificate::verify`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
	subject_key_id: Vec<u8>,
	public_key: Vec<u8>,
	locality: Locality,
	rings: u32,
	signature: Vec<u8>,
}

impl Certificate {
	/// Assembles certificate material and self-signs it.
	///
	/// This is how a certificate authority (or the local node, through
	/// [`Identity::self_signed`]) produces trusted material.
	pub fn signed(
		subject_key_id: Vec<u8>,
		public_key: Vec<u8>,
		locality: Locality,
		rings: u32,
		signer: &dyn Signer,
	) -> Self {
		let mut certificate =
			Self::unsigned(subject_key_id, public_key, locality, rings);
		certificate.signature = signer.sign(&certificate.digest());
		certificate
	}

	/// Assembles certificate material without a signature; fails
	/// [`Certificate::verify`].
	pub fn unsigned(
		subject_key_id: Vec<u8>,
		public_key: Vec<u8>,
		locality: Locality,
		rings: u32,
	) -> Self {
		Self {
			subject_key_id,
			public_key,
			locality,
			rings,
			signature: Vec::new(),
		}
	}

	/// Re-signs the material with the owner's key.
	///
	/// Certificate authorities assemble material for a public key they do
	/// not own; the requesting keyholder applies the self-signature that
	/// the rest of the network verifies.
	#[must_use]
	pub fn into_signed(mut self, signer: &dyn Signer) -> Self {
		self.signature = signer.sign(&self.digest());
		self
	}

	/// The raw subject key id bytes.
	pub fn subject_key_id(&self) -> &[u8] {
		&self.subject_key_id
	}

	/// The subject key id as a [`PeerId`], when it has the right length.
	pub fn id(&self) -> Option<PeerId> {
		PeerId::try_from_slice(&self.subject_key_id)
	}

	pub const fn locality(&self) -> &Locality {
		&self.locality
	}

	/// Number of rings the certificate owner participates in.
	pub const fn rings(&self) -> u32 {
		self.rings
	}

	/// The SEC1 encoding of the owner's public key.
	pub fn public_key(&self) -> &[u8] {
		&self.public_key
	}

	/// The ring count in its wire extension encoding.
	pub const fn ring_extension(&self) -> [u8; 4] {
		self.rings.to_le_bytes()
	}

	/// The owner's verifying key, parsed from the embedded public key.
	pub fn verifying_key(&self) -> Result<VerifyingKey, Error> {
		VerifyingKey::from_sec1_bytes(&self.public_key)
			.map_err(|_| Error::InvalidPublicKey)
	}

	/// Digest of every field covered by the self-signature.
	pub fn digest(&self) -> [u8; 32] {
		let mut hasher = Sha3_256::new();
		hasher.update((self.subject_key_id.len() as u32).to_le_bytes());
		hasher.update(&self.subject_key_id);
		hasher.update((self.public_key.len() as u32).to_le_bytes());
		hasher.update(&self.public_key);
		for addr in [
			&self.locality.service,
			&self.locality.ping,
			&self.locality.http,
		] {
			hasher.update((addr.len() as u32).to_le_bytes());
			hasher.update(addr.as_bytes());
		}
		hasher.update(self.ring_extension());
		hasher.finalize().into()
	}

	/// Verifies the self-signature against the embedded public key.
	pub fn verify(&self) -> bool {
		let Ok(key) = self.verifying_key() else {
			return false;
		};
		let Ok(signature) = Signature::from_slice(&self.signature) else {
			return false;
		};
		key.verify(&self.digest(), &signature).is_ok()
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		rmp_serde::to_vec(self).expect("certificate serialization cannot fail")
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
		Ok(rmp_serde::from_slice(bytes)?)
	}
}

impl fmt::Debug for Certificate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Certificate")
			.field("subject_key_id", &hex::encode(&self.subject_key_id))
			.field("locality", &self.locality)
			.field("rings", &self.rings)
			.finish_non_exhaustive()
	}
}

/// Signing capability injected into the node.
///
/// Production identities sign with their ECDSA key; tests substitute
/// whatever they need. Signatures are 64-byte fixed-width `r || s`.
pub trait Signer: Send + Sync + 'static {
	fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// Certificate capability injected into the node: yields the local node's
/// own trusted material.
pub trait IdentityProvider: Send + Sync + 'static {
	fn certificate(&self) -> Certificate;
}

/// External certificate authority, treated as an oracle that yields trusted
/// certificate material for a public key.
///
/// The authority assigns the subject key id and the ring count; the
/// returned material is unsigned and the requesting keyholder applies the
/// self-signature via [`Certificate::into_signed`].
#[async_trait]
pub trait CertificateAuthority: Send + Sync + 'static {
	async fn issue(
		&self,
		public_key: &[u8],
		locality: &Locality,
	) -> Result<Certificate, Error>;
}

/// A full local identity: keypair plus matching certificate.
///
/// Implements both [`IdentityProvider`] and [`Signer`], so a single
/// instance covers the certificate and crypto capabilities of a node.
pub struct Identity {
	id: PeerId,
	signing_key: SigningKey,
	certificate: Certificate,
}

impl Identity {
	/// Generates a fresh keypair and a self-signed certificate.
	///
	/// The subject key id is derived as SHA3-256 of the SEC1-encoded public
	/// key, which keeps ids unique and stable per keypair.
	pub fn self_signed(rings: u32, locality: Locality) -> Result<Self, Error> {
		if locality.service.is_empty() {
			return Err(Error::MissingServiceAddr);
		}

		let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
		let public_key = signing_key
			.verifying_key()
			.to_encoded_point(false)
			.as_bytes()
			.to_vec();

		let subject: [u8; 32] = Sha3_256::digest(&public_key).into();
		let certificate = Certificate::signed(
			subject.to_vec(),
			public_key,
			locality,
			rings,
			&signing_key,
		);

		Ok(Self {
			id: PeerId::from(subject),
			signing_key,
			certificate,
		})
	}

	/// Wraps an already-issued certificate and its matching key, e.g. the
	/// result of a [`CertificateAuthority::issue`] round.
	///
	/// Fails when the certificate's subject key id is malformed.
	pub fn new(
		signing_key: SigningKey,
		certificate: Certificate,
	) -> Result<Self, Error> {
		let id = certificate.id().ok_or(Error::InvalidPublicKey)?;
		Ok(Self {
			id,
			signing_key,
			certificate,
		})
	}

	pub const fn certificate(&self) -> &Certificate {
		&self.certificate
	}

	pub const fn id(&self) -> &PeerId {
		&self.id
	}
}

impl Signer for Identity {
	fn sign(&self, message: &[u8]) -> Vec<u8> {
		sign_with(&self.signing_key, message)
	}
}

impl IdentityProvider for Identity {
	fn certificate(&self) -> Certificate {
		self.certificate.clone()
	}
}

impl Signer for SigningKey {
	fn sign(&self, message: &[u8]) -> Vec<u8> {
		sign_with(self, message)
	}
}

fn sign_with(key: &SigningKey, message: &[u8]) -> Vec<u8> {
	let signature: Signature = p256::ecdsa::signature::Signer::sign(key, message);
	signature.to_bytes().to_vec()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn locality() -> Locality {
		Locality::new("127.0.0.1:8000", "127.0.0.1:8001", "127.0.0.1:8002")
	}

	#[test]
	fn self_signed_certificate_verifies() {
		let identity = Identity::self_signed(32, locality()).unwrap();
		assert!(identity.certificate().verify());
		assert_eq!(identity.certificate().rings(), 32);
		assert_eq!(identity.certificate().id(), Some(*identity.id()));
	}

	#[test]
	fn tampered_certificate_fails_verification() {
		let identity = Identity::self_signed(32, locality()).unwrap();
		let mut cert = identity.certificate().clone();
		cert.rings = 16;
		assert!(!cert.verify());
	}

	#[test]
	fn malformed_subject_key_id_has_no_peer_id() {
		let identity = Identity::self_signed(32, locality()).unwrap();
		let cert = identity.certificate();
		let invalid = Certificate::signed(
			b"Invalid id".to_vec(),
			cert.public_key().to_vec(),
			locality(),
			32,
			&identity,
		);
		assert!(invalid.id().is_none());
		assert!(invalid.verify());
	}

	#[test]
	fn certificate_wire_round_trip_is_byte_identical() {
		let identity = Identity::self_signed(8, locality()).unwrap();
		let bytes = identity.certificate().to_bytes();
		let decoded = Certificate::from_bytes(&bytes).unwrap();
		assert_eq!(&decoded, identity.certificate());
		assert_eq!(decoded.to_bytes(), bytes);
		assert!(decoded.verify());
	}

	#[test]
	fn ring_extension_is_little_endian() {
		let identity = Identity::self_signed(32, locality()).unwrap();
		assert_eq!(identity.certificate().ring_extension(), [32, 0, 0, 0]);
	}

	#[test]
	fn missing_service_addr_is_rejected() {
		let result = Identity::self_signed(4, Locality::new("", "ping", "http"));
		assert!(matches!(result, Err(Error::MissingServiceAddr)));
	}
}

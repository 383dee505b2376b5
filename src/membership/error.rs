/// Validation errors of the membership protocol.
///
/// All of these are terminal for the artifact that triggered them and
/// recoverable at the protocol level: the artifact is dropped and the
/// gossip stream carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("artifact signature is invalid")]
	InvalidSignature,

	#[error("certificate is missing")]
	NilCert,

	#[error("certificate names the local node")]
	SelfCert,

	#[error("certificate subject key id has an invalid length")]
	InvalidId,

	#[error("note refers to an unknown peer")]
	NoPeer,

	#[error("note epoch is not newer than the current note")]
	OldNote,

	#[error("note ring mask is empty")]
	InvalidMask,

	#[error("accuser is not the ring predecessor of the accused")]
	InvalidAccuser,

	#[error("accusation epoch does not match the accused's note epoch")]
	InvalidEpoch,

	#[error("accusation claims an epoch the local node never declared")]
	InvalidSelfAccusation,

	#[error("an accusation for this peer and ring already exists")]
	AccAlreadyExists,
}

use crate::{identity, membership, node, transport};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("identity error: {0}")]
	Identity(#[from] identity::Error),

	#[error("membership error: {0}")]
	Membership(#[from] membership::Error),

	#[error("node error: {0}")]
	Node(#[from] node::Error),

	#[error("transport error: {0}")]
	Transport(#[from] transport::Error),

	#[error("config error: {0}")]
	Config(#[from] crate::config::ConfigBuilderError),

	#[error("a certificate authority capability is required when ca is set")]
	MissingAuthority,
}

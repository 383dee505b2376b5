use {
	core::time::Duration,
	derive_builder::Builder,
	serde::{Deserialize, Serialize},
};

/// Configuration options for a node.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(pattern = "owned", setter(prefix = "with"), derive(Debug, Clone))]
#[builder_struct_attr(doc(hidden))]
pub struct Config {
	/// If true, obtain the certificate from the external certificate
	/// authority at [`Config::ca_addr`]; otherwise self-sign.
	#[builder(default = "false")]
	pub ca: bool,

	/// Certificate authority endpoint.
	#[builder(default = "String::new()")]
	pub ca_addr: String,

	/// Bootstrap peers contacted on startup. Empty means the node operates
	/// alone until someone contacts it.
	#[builder(default = "Vec::new()", setter(custom))]
	pub entry_addrs: Vec<String>,

	/// Ring count used when self-signing. Certificates issued by a CA carry
	/// this in their ring extension instead.
	#[builder(default = "32")]
	pub num_rings: u32,

	/// The interval between outbound gossip rounds.
	#[builder(default = "Duration::from_secs(10)")]
	pub gossip_interval: Duration,

	/// The interval between failure-detector rounds.
	#[builder(default = "Duration::from_secs(10)")]
	pub monitor_interval: Duration,

	/// Upper bound on pings issued per monitor round across all rings.
	#[builder(default = "16")]
	pub ping_limit: usize,

	/// How long an accused peer has to rebut before it is considered dead.
	#[builder(default = "Duration::from_secs(60)")]
	pub accusation_timeout: Duration,

	/// How often the deadline-timer table is swept for expired entries.
	#[builder(default = "Duration::from_secs(1)")]
	pub timer_sweep_interval: Duration,

	/// Upper bound on concurrently served inbound transport streams; the
	/// embedding transport enforces this.
	#[builder(default = "32")]
	pub max_concurrent_streams: u32,

	/// Advertised service address.
	#[builder(default = "String::from(\"127.0.0.1:8000\")")]
	pub service_addr: String,

	/// Advertised failure-detector ping address.
	#[builder(default = "String::from(\"127.0.0.1:8001\")")]
	pub ping_addr: String,

	/// Advertised http diagnostics address.
	#[builder(default = "String::from(\"127.0.0.1:8002\")")]
	pub http_addr: String,
}

impl Config {
	/// Creates a new config builder with default values.
	pub fn builder() -> ConfigBuilder {
		ConfigBuilder::default()
	}
}

impl Default for Config {
	fn default() -> Self {
		Self::builder().build().expect("all options have defaults")
	}
}

impl ConfigBuilder {
	/// Adds bootstrap entry address(es).
	#[must_use]
	pub fn with_entry_addrs<I, S>(mut self, addrs: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let addrs = addrs.into_iter().map(Into::into);
		if let Some(existing) = &mut self.entry_addrs {
			existing.extend(addrs);
		} else {
			self.entry_addrs = Some(addrs.collect());
		}
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_build() {
		let config = Config::default();
		assert!(!config.ca);
		assert_eq!(config.num_rings, 32);
		assert!(config.entry_addrs.is_empty());
	}

	#[test]
	fn entry_addrs_accumulate() {
		let config = Config::builder()
			.with_entry_addrs(["10.0.0.1:8000"])
			.with_entry_addrs(["10.0.0.2:8000"])
			.build()
			.unwrap();
		assert_eq!(config.entry_addrs.len(), 2);
	}
}

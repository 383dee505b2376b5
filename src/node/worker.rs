use {
	super::Node,
	crate::membership::Accusation,
	tokio::time::{MissedTickBehavior, interval},
	tracing::{debug, info, warn},
};

/// Outbound gossip loop: contacts the bootstrap peers once, then runs one
/// gossip round per tick. A rebuttal kicks an extra round immediately.
pub(super) async fn run_gossip(node: Node) {
	node.bootstrap().await;

	let mut tick = interval(node.0.config.gossip_interval);
	tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			() = node.0.cancel.cancelled() => {
				info!(id = %node.id(), "gossip loop terminated");
				return;
			}
			() = node.0.kick.notified() => node.gossip_round().await,
			_ = tick.tick() => node.gossip_round().await,
		}
	}
}

/// Failure-detector loop: pings ring successors every monitor tick and
/// sweeps the accusation deadline table on its own cadence.
pub(super) async fn run_monitor(node: Node) {
	let mut monitor = interval(node.0.config.monitor_interval);
	monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
	let mut sweep = interval(node.0.config.timer_sweep_interval);
	sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

	loop {
		tokio::select! {
			() = node.0.cancel.cancelled() => {
				info!(id = %node.id(), "monitor loop terminated");
				return;
			}
			_ = monitor.tick() => node.monitor_round().await,
			_ = sweep.tick() => node.expire_timers(),
		}
	}
}

impl Node {
	/// Contacts every configured entry address with the local state; the
	/// remote side treats this node as an unknown caller and seeds it with
	/// the certificates and notes of its future neighbours.
	async fn bootstrap(&self) {
		for addr in &self.0.config.entry_addrs {
			if self.0.cancel.is_cancelled() {
				return;
			}

			match self.0.comm.spread(addr, self.local_state()).await {
				Ok(response) => {
					info!(addr = %addr, "joined network through entry peer");
					self.merge_response(response);
				}
				Err(e) => {
					warn!(addr = %addr, error = %e, "entry peer unreachable");
				}
			}
		}
	}

	/// One outbound gossip round: a `Spread` to the ring successor on each
	/// ring this node is active on.
	async fn gossip_round(&self) {
		let Some(own_note) = self.0.view.peer(self.id()).and_then(|p| p.note())
		else {
			return;
		};

		for ring in 1..=self.0.view.num_rings() {
			if self.0.cancel.is_cancelled() {
				return;
			}
			if !own_note.ring_active(ring) {
				continue;
			}

			let Some((succ, _)) = self.0.view.my_ring_neighbours(ring) else {
				continue;
			};

			let addr = succ.service_addr().to_string();
			match self.0.comm.spread(&addr, self.local_state()).await {
				Ok(response) => self.merge_response(response),
				Err(e) => {
					debug!(peer = %succ.id(), ring, error = %e, "spread failed");
				}
			}
		}
	}

	/// One failure-detector round: pings the ring successor on each active
	/// ring, bounded by the configured ping budget, and turns failed
	/// probes into accusations that enter the gossip stream.
	async fn monitor_round(&self) {
		let Some(own_note) = self.0.view.peer(self.id()).and_then(|p| p.note())
		else {
			return;
		};

		let mut budget = self.0.config.ping_limit;
		for ring in 1..=self.0.view.num_rings() {
			if self.0.cancel.is_cancelled() {
				return;
			}
			if budget == 0 {
				debug!("ping budget exhausted for this monitor round");
				return;
			}
			if !own_note.ring_active(ring) {
				continue;
			}

			let Some((succ, _)) = self.0.view.my_ring_neighbours(ring) else {
				continue;
			};

			budget -= 1;
			let addr = succ.ping_addr().to_string();
			if let Err(e) = self.0.prober.ping(&addr).await {
				warn!(peer = %succ.id(), ring, error = %e, "probe failed, accusing");
				self.accuse(ring, &succ);
			}
		}
	}

	/// Signs an accusation against a failed monitoring target and feeds it
	/// through the local evaluation path; gossip picks it up from there.
	fn accuse(&self, ring: u32, target: &crate::membership::Peer) {
		let Some(note) = target.note() else {
			return;
		};

		let accusation = Accusation::new(
			*target.id(),
			*self.id(),
			note.epoch(),
			ring,
			self.0.signer.as_ref(),
		);

		if let Err(e) = self.eval_accusation(&accusation) {
			debug!(accused = %target.id(), ring, error = %e, "accusation dropped");
		}
	}

	/// Expires overdue accusation deadlines, evicting peers that never
	/// rebutted.
	fn expire_timers(&self) {
		for id in self.0.view.sweep_timers(self.0.config.accusation_timeout) {
			warn!(peer = %id, "accusation deadline expired, peer marked dead");
		}
	}
}

//! Multi-node convergence scenarios over an in-memory authenticated wire.

use {
	core::time::Duration,
	ifrit::test_utils::{Router, StubProber, router_node},
	std::sync::Arc,
	tokio::time::sleep,
};

const RINGS: u32 = 8;

#[tokio::test]
async fn nodes_converge_on_membership_through_an_entry_peer() {
	let router = Arc::new(Router::default());
	let prober = Arc::new(StubProber::default());

	let (a, _) = router_node(&router, &prober, RINGS, 0, vec![]);
	let (b, _) = router_node(&router, &prober, RINGS, 1, vec![a.addr()]);
	let (c, _) = router_node(&router, &prober, RINGS, 2, vec![a.addr()]);

	a.start();
	b.start();
	c.start();

	sleep(Duration::from_millis(400)).await;

	for node in [&a, &b, &c] {
		let members = node.members();
		assert_eq!(
			members.len(),
			3,
			"node {} sees {} members",
			node.id(),
			members.len()
		);
		for other in [&a, &b, &c] {
			assert!(members.contains(other.id()));
		}
	}

	a.stop();
	b.stop();
	c.stop();
}

#[tokio::test]
async fn a_dead_peer_is_accused_and_evicted() {
	let router = Arc::new(Router::default());
	let prober = Arc::new(StubProber::default());

	let (a, _) = router_node(&router, &prober, RINGS, 10, vec![]);
	let (b, _) = router_node(&router, &prober, RINGS, 11, vec![a.addr()]);
	let (c, _) = router_node(&router, &prober, RINGS, 12, vec![a.addr()]);

	a.start();
	b.start();
	c.start();
	sleep(Duration::from_millis(300)).await;
	assert_eq!(a.members().len(), 3);

	// kill c: handlers stay, but the wire and the probes go silent
	c.stop();
	router.unregister(&c.addr());
	prober.fail(c.certificate().locality().ping.clone());

	sleep(Duration::from_millis(500)).await;

	for node in [&a, &b] {
		let members = node.members();
		assert!(
			!members.contains(c.id()),
			"node {} still considers the dead peer alive",
			node.id()
		);
		assert_eq!(members.len(), 2);
	}

	a.stop();
	b.stop();
}

#[tokio::test]
async fn an_accused_but_healthy_peer_rebuts_and_stays_alive() {
	let router = Arc::new(Router::default());
	let prober = Arc::new(StubProber::default());

	let (a, _) = router_node(&router, &prober, RINGS, 20, vec![]);
	let (b, _) = router_node(&router, &prober, RINGS, 21, vec![a.addr()]);
	let (c, _) = router_node(&router, &prober, RINGS, 22, vec![a.addr()]);

	a.start();
	b.start();
	c.start();
	sleep(Duration::from_millis(300)).await;

	// c answers gossip but its probe endpoint misbehaves: monitors accuse
	// it, and it must keep rebutting through the gossip stream
	prober.fail(c.certificate().locality().ping.clone());
	sleep(Duration::from_millis(500)).await;

	let epoch = c
		.view()
		.peer(c.id())
		.and_then(|peer| peer.note())
		.map(|note| note.epoch())
		.unwrap_or_default();
	assert!(epoch > 1, "rebuttals must have bumped the local epoch");
	assert!(
		c.view().is_alive(c.id()),
		"a rebutting peer never loses liveness in its own view"
	);

	a.stop();
	b.stop();
	c.stop();
}

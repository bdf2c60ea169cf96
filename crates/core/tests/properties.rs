//! Invariants checked over generated, interleaved synchronization sequences.

use std::collections::BTreeSet;
use std::rc::Rc;

use pollbind::testing::ScriptedService;
use pollbind::{BinderConfig, KeyFingerprint, MultiSessionBinder};
use proptest::prelude::*;
use tokio::task::LocalSet;

type Scripted = ScriptedService<&'static str>;

const UNIVERSE: [&str; 5] = ["a", "b", "c", "d", "e"];

/// Key outside [`UNIVERSE`], added at the end to force one more pass.
const EXTRA: &str = "z";

// ============================================================================
// Strategies
// ============================================================================

/// Something that happens between two passes.
#[derive(Debug, Clone, Copy)]
enum Action {
	Resolve(&'static str),
	Reject(&'static str),
	Yield,
}

#[derive(Debug, Clone)]
struct Round {
	keys: Vec<&'static str>,
	enabled: bool,
	actions: Vec<Action>,
}

fn arb_action() -> impl Strategy<Value = Action> {
	prop_oneof![
		3 => proptest::sample::select(UNIVERSE.to_vec()).prop_map(Action::Resolve),
		1 => proptest::sample::select(UNIVERSE.to_vec()).prop_map(Action::Reject),
		1 => Just(Action::Yield),
	]
}

/// A key subset in arbitrary order, an enabled flag, and what the service does next.
fn arb_round() -> impl Strategy<Value = Round> {
	(
		proptest::sample::subsequence(UNIVERSE.to_vec(), 0..=UNIVERSE.len()).prop_shuffle(),
		proptest::bool::weighted(0.85),
		proptest::collection::vec(arb_action(), 0..8),
	)
		.prop_map(|(keys, enabled, actions)| Round { keys, enabled, actions })
}

fn arb_drain_order() -> impl Strategy<Value = Vec<&'static str>> {
	Just(UNIVERSE.to_vec()).prop_shuffle()
}

// ============================================================================
// Harness
// ============================================================================

#[derive(Debug)]
struct Observed {
	max_in_flight: usize,
	/// Active keys after draining, and the keys the last round wanted.
	drained: (BTreeSet<KeyFingerprint>, BTreeSet<KeyFingerprint>),
	/// Active keys after one more pass, and the keys that pass wanted.
	retried: (BTreeSet<KeyFingerprint>, BTreeSet<KeyFingerprint>),
	live_tokens: usize,
	/// How often each issued token was stopped once the binder shut down.
	stop_counts: Vec<usize>,
}

fn fingerprints(keys: &[&'static str]) -> BTreeSet<KeyFingerprint> {
	keys.iter().map(|key| KeyFingerprint::of(key).unwrap()).collect()
}

fn active(binder: &MultiSessionBinder<Scripted>) -> BTreeSet<KeyFingerprint> {
	binder.active_keys().into_iter().collect()
}

async fn drain(service: &Scripted, order: &[&'static str]) {
	while service.parked_count() > 0 {
		for key in order.iter().chain([&EXTRA]) {
			service.resolve(key);
		}
		tokio::task::yield_now().await;
	}
}

fn run(rounds: Vec<Round>, order: Vec<&'static str>) -> Observed {
	let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
	LocalSet::new().block_on(&runtime, async move {
		let service = Rc::new(Scripted::manual());
		let mut binder = MultiSessionBinder::new(BinderConfig::new(), Rc::clone(&service));
		let mut last = (Vec::new(), true);

		for round in rounds {
			binder.synchronize(&service, round.keys.clone(), round.enabled).unwrap();
			for action in round.actions {
				match action {
					Action::Resolve(key) => {
						service.resolve(&key);
					}
					Action::Reject(key) => {
						service.reject(&key, "refused");
					}
					Action::Yield => tokio::task::yield_now().await,
				}
			}
			tokio::task::yield_now().await;
			last = (round.keys, round.enabled);
		}

		drain(&service, &order).await;
		binder.settle().await;
		let (keys, enabled) = last;
		let wanted = if enabled { fingerprints(&keys) } else { BTreeSet::new() };
		let drained = (active(&binder), wanted);

		// A rejected key stays absent until a pass that wants it runs.
		let mut extended = keys;
		extended.push(EXTRA);
		binder.synchronize(&service, extended.clone(), enabled).unwrap();
		drain(&service, &order).await;
		binder.settle().await;
		let wanted = if enabled { fingerprints(&extended) } else { BTreeSet::new() };
		let retried = (active(&binder), wanted);
		let live_tokens = service.live_tokens().len();

		binder.shutdown().await;
		Observed {
			max_in_flight: service.max_in_flight(),
			drained,
			retried,
			live_tokens,
			stop_counts: service.issued().iter().map(|token| service.stop_count(token)).collect(),
		}
	})
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
	#![proptest_config(ProptestConfig::with_cases(128))]

	/// Arbitrary passes and completion orders never overlap starts for a key,
	/// converge once a pass runs, and stop every token exactly once.
	#[test]
	fn interleaved_passes_converge_and_stop_every_token_once(
		rounds in proptest::collection::vec(arb_round(), 1..24),
		order in arb_drain_order(),
	) {
		let observed = run(rounds, order);

		prop_assert!(observed.max_in_flight <= 1, "overlapping starts: {observed:?}");

		let (drained, wanted) = &observed.drained;
		prop_assert!(drained.is_subset(wanted), "unwanted key left active: {observed:?}");

		let (retried, wanted) = &observed.retried;
		prop_assert_eq!(retried, wanted);
		prop_assert_eq!(observed.live_tokens, wanted.len());

		for (index, stops) in observed.stop_counts.iter().enumerate() {
			prop_assert_eq!(*stops, 1, "token #{} stopped {} times", index, stops);
		}
	}
}

#[tokio::test(flavor = "current_thread")]
async fn equal_collections_never_issue_calls() {
	LocalSet::new()
		.run_until(async {
			let service = Rc::new(Scripted::immediate());
			let mut binder = MultiSessionBinder::new(BinderConfig::new(), Rc::clone(&service));

			binder.synchronize(&service, vec!["a", "b", "c"], true).unwrap();
			binder.settle().await;
			let starts = service.total_starts();

			for _ in 0..10 {
				let fresh: Vec<&'static str> = ["a", "b", "c"].to_vec();
				let outcome = binder.synchronize(&service, fresh, true).unwrap();
				assert!(outcome.skipped);
			}
			binder.settle().await;

			assert_eq!(service.total_starts(), starts);
			assert!(service.stops().is_empty());
		})
		.await;
}

#[tokio::test(flavor = "current_thread")]
async fn failed_keys_are_retried_on_the_next_pass_that_wants_them() {
	LocalSet::new()
		.run_until(async {
			let service = Rc::new(Scripted::manual());
			let mut binder = MultiSessionBinder::new(BinderConfig::new(), Rc::clone(&service));

			binder.synchronize(&service, vec!["a", "b"], true).unwrap();
			assert!(service.reject(&"a", "timeout"));
			assert!(service.resolve(&"b"));
			binder.settle().await;
			assert!(!binder.is_active(&"a").unwrap());

			// Any pass that runs with "a" still desired retries it.
			binder.synchronize(&service, vec!["a", "b", "c"], true).unwrap();
			assert_eq!(service.start_count(&"a"), 2);
			assert_eq!(service.start_count(&"b"), 1);

			drain(&service, &UNIVERSE).await;
			binder.settle().await;
			assert_eq!(binder.active_keys().len(), 3);
		})
		.await;
}

//! One session per key for a dynamic, ordered key set.
//!
//! [`MultiSessionBinder::synchronize`] diffs the desired keys against the
//! binder's registry and fires `start`/`stop` calls; each `start` gets a
//! continuation spawned on the current `LocalSet` that writes the result
//! back. The registry is the only shared state and is never touched
//! concurrently, so it lives in a `RefCell`.
//!
//! Per-key lifecycle:
//!
//! ```text
//! Absent ──desired──▶ Pending ──resolved──▶ Active ──undesired──▶ stop, Absent
//!                        │  ▲
//!              undesired │  │ desired again
//!                        ▼  │
//!                     Pending(retiring) ──resolved──▶ stop, Absent
//!
//! Pending / Pending(retiring) ──rejected──▶ Absent
//! ```


mod registry;

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use futures_util::FutureExt;
use tracing::{debug, warn};

use self::registry::{Entry, Registry, Resolution};
use crate::error::{Error, Result, ServiceError};
use crate::key::{KeyFingerprint, canonicalize};
use crate::protocol::{BinderConfig, BinderStats, SyncOutcome};
use crate::service::SessionService;
use crate::stable::StableValue;
use crate::tasks::{Dispatch, TaskSet};

/// State shared between the binder and its continuations.
struct Shared<S: SessionService> {
	label: String,
	state: RefCell<State<S>>,
	tasks: TaskSet,
}

struct State<S: SessionService> {
	/// Most recent service handed to `synchronize`.
	service: Rc<S>,
	registry: Registry<S::Token>,
	stats: BinderStats,
	torn_down: bool,
}

/// Keeps one session open per desired key.
///
/// Must be used from inside a tokio `LocalSet`. Dropping a binder that was
/// not torn down tears it down without spawning, so a binder may outlive
/// the `LocalSet` it ran on.
pub struct MultiSessionBinder<S: SessionService> {
	shared: Rc<Shared<S>>,
	keys: StableValue<Vec<KeyFingerprint>>,
	/// Stable key list and `enabled` flag of the last pass that ran.
	applied: Option<(Rc<Vec<KeyFingerprint>>, bool)>,
}

impl<S: SessionService> MultiSessionBinder<S> {
	/// Creates a binder with an empty registry.
	pub fn new(config: BinderConfig, service: Rc<S>) -> Self {
		let shared = Rc::new(Shared {
			label: config.label,
			state: RefCell::new(State {
				service,
				registry: Registry::default(),
				stats: BinderStats::default(),
				torn_down: false,
			}),
			tasks: TaskSet::default(),
		});
		Self {
			shared,
			keys: StableValue::new(),
			applied: None,
		}
	}

	/// Reconciles open sessions with `keys` and `enabled`.
	///
	/// `service` replaces the one used for later stops, but a new service alone
	/// never triggers a pass: only a change in key content or `enabled` does.
	/// Keys are canonicalized up front, so a key that fails to serialize
	/// leaves the registry untouched.
	pub fn synchronize<I>(&mut self, service: &Rc<S>, keys: I, enabled: bool) -> Result<SyncOutcome>
	where
		I: IntoIterator<Item = S::Key>,
	{
		if self.shared.state.borrow().torn_down {
			return Err(Error::TornDown {
				label: self.shared.label.clone(),
			});
		}

		let keys = canonicalize(keys)?;
		self.shared.state.borrow_mut().service = Rc::clone(service);

		let stable = self.keys.stabilize(keys.iter().map(|(fingerprint, _)| fingerprint.clone()).collect());
		if let Some((applied, was_enabled)) = &self.applied {
			if Rc::ptr_eq(applied, &stable) && *was_enabled == enabled {
				return Ok(SyncOutcome::unchanged());
			}
		}
		self.applied = Some((stable, enabled));

		let desired = if enabled { keys } else { Vec::new() };
		let outcome = self.shared.reconcile(desired, Dispatch::Spawn);
		debug!(
			target = "pollbind.multi",
			binder = %self.shared.label,
			enabled,
			started = outcome.started,
			stopped = outcome.stopped,
			retired = outcome.retired,
			revived = outcome.revived,
			"synchronized"
		);
		Ok(outcome)
	}

	/// Stops every open session and marks every pending one for
	/// stop-on-arrival. Later `synchronize` calls fail with
	/// [`Error::TornDown`]. Calling it twice is harmless.
	pub fn teardown(&mut self) {
		self.teardown_with(Dispatch::Spawn);
	}

	fn teardown_with(&mut self, dispatch: Dispatch) {
		if self.shared.state.borrow().torn_down {
			return;
		}
		let outcome = self.shared.reconcile(Vec::new(), dispatch);
		self.shared.state.borrow_mut().torn_down = true;
		debug!(
			target = "pollbind.multi",
			binder = %self.shared.label,
			stopped = outcome.stopped,
			retired = outcome.retired,
			"torn down"
		);
	}

	/// Tears down and waits for every outstanding start and stop to finish.
	pub async fn shutdown(mut self) -> BinderStats {
		self.teardown();
		self.settle().await;
		self.stats()
	}

	/// Waits until no continuation or stop spawned by this binder is running.
	pub async fn settle(&self) {
		self.shared.tasks.idle().await;
	}

	/// Keys with an open session, in the order they were first desired.
	pub fn active_keys(&self) -> Vec<KeyFingerprint> {
		self.shared.state.borrow().registry.active_keys().cloned().collect()
	}

	/// Returns true if `key` has an open session.
	pub fn is_active(&self, key: &S::Key) -> Result<bool> {
		let fingerprint = KeyFingerprint::of(key)?;
		Ok(self.shared.state.borrow().registry.is_active(&fingerprint))
	}

	/// Number of starts that have not resolved yet, retiring ones included.
	pub fn pending_count(&self) -> usize {
		self.shared.state.borrow().registry.pending_count()
	}

	pub fn stats(&self) -> BinderStats {
		self.shared.state.borrow().stats
	}

	pub fn is_torn_down(&self) -> bool {
		self.shared.state.borrow().torn_down
	}
}

/// Tears the binder down if nobody did. Each stop future is polled once in
/// place instead of being spawned; one that is not ready by then is dropped
/// with a warning, so use [`MultiSessionBinder::shutdown`] with services
/// whose stops complete later.
impl<S: SessionService> Drop for MultiSessionBinder<S> {
	fn drop(&mut self) {
		if !std::thread::panicking() {
			self.teardown_with(Dispatch::Inline);
		}
	}
}

impl<S: SessionService> Shared<S> {
	/// Runs one diff of `desired` against the registry and issues calls.
	///
	/// Starts are always spawned, so `dispatch` only matters for passes that
	/// start nothing, such as teardown.
	fn reconcile(self: &Rc<Self>, desired: Vec<(KeyFingerprint, S::Key)>, dispatch: Dispatch) -> SyncOutcome {
		let mut outcome = SyncOutcome::default();
		let wanted: HashSet<&KeyFingerprint> = desired.iter().map(|(fingerprint, _)| fingerprint).collect();

		let (service, stopping, starting) = {
			let mut guard = self.state.borrow_mut();
			let state = &mut *guard;
			let (stopping, retired) = state.registry.retire_unless(|key| wanted.contains(key));
			outcome.retired = retired;

			let mut starting = Vec::new();
			for (fingerprint, key) in &desired {
				match state.registry.get_mut(fingerprint) {
					None => {
						let generation = state.registry.begin(fingerprint.clone());
						starting.push((fingerprint.clone(), key, generation));
					}
					Some(Entry::Pending { retiring, .. }) if *retiring => {
						*retiring = false;
						outcome.revived += 1;
					}
					Some(_) => {}
				}
			}

			outcome.started = starting.len();
			outcome.stopped = stopping.len();
			state.stats.starts += starting.len() as u64;
			(Rc::clone(&state.service), stopping, starting)
		};

		for (fingerprint, token) in stopping {
			debug!(target = "pollbind.multi", binder = %self.label, key = %fingerprint, ?token, "stopping session");
			self.stop(&service, token, dispatch);
		}
		for (fingerprint, key, generation) in starting {
			debug!(target = "pollbind.multi", binder = %self.label, key = %fingerprint, generation, "starting session");
			let pending = service.start(key);
			let shared = Rc::clone(self);
			self.tasks.spawn(async move {
				let result = pending.await;
				shared.on_started(fingerprint, generation, result);
			});
		}
		outcome
	}

	/// Writes a start result back into the registry.
	fn on_started(self: &Rc<Self>, fingerprint: KeyFingerprint, generation: u64, result: std::result::Result<S::Token, ServiceError>) {
		let stale = {
			let mut state = self.state.borrow_mut();
			match result {
				Ok(token) => match state.registry.resolve(&fingerprint, generation, token) {
					Resolution::Stored => {
						debug!(target = "pollbind.multi", binder = %self.label, key = %fingerprint, "session active");
						None
					}
					Resolution::Stale(token) => {
						state.stats.stale_resolutions += 1;
						Some((Rc::clone(&state.service), token))
					}
				},
				Err(err) => {
					state.stats.start_failures += 1;
					let removed = state.registry.reject(&fingerprint, generation);
					warn!(
						target = "pollbind.multi",
						binder = %self.label,
						key = %fingerprint,
						removed,
						error = %err,
						"session start failed"
					);
					None
				}
			}
		};

		if let Some((service, token)) = stale {
			debug!(
				target = "pollbind.multi",
				binder = %self.label,
				key = %fingerprint,
				?token,
				"key no longer desired; stopping late session"
			);
			self.stop(&service, token, Dispatch::Spawn);
		}
	}

	/// Issues `stop(token)` and records a failure without surfacing it.
	fn stop(self: &Rc<Self>, service: &Rc<S>, token: S::Token, dispatch: Dispatch) {
		self.state.borrow_mut().stats.stops += 1;
		let stopping = service.stop(token);
		match dispatch {
			Dispatch::Spawn => {
				let shared = Rc::clone(self);
				self.tasks.spawn(async move {
					shared.stopped(stopping.await);
				});
			}
			Dispatch::Inline => match stopping.now_or_never() {
				Some(result) => self.stopped(result),
				None => warn!(target = "pollbind.multi", binder = %self.label, "stop still in flight while dropping binder; not awaited"),
			},
		}
	}

	fn stopped(&self, result: std::result::Result<(), ServiceError>) {
		if let Err(err) = result {
			self.state.borrow_mut().stats.stop_failures += 1;
			warn!(target = "pollbind.multi", binder = %self.label, error = %err, "session stop failed");
		}
	}
}

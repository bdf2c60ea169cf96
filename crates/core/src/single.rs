//! One session for one key, switched by an enabled flag.
//!
//! The binder remembers the binding it was last synchronized with (key and
//! flag) and the keys whose start has not resolved yet, at most one start
//! per key. Every binding change stops the held token on the spot. Moving
//! back to a key whose start is still in flight adopts that start instead
//! of issuing another one. A continuation stores its token only if its key
//! is the current, enabled binding when it resolves, and stops it
//! otherwise.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use futures_util::FutureExt;
use tracing::{debug, warn};

use crate::error::{Error, Result, ServiceError};
use crate::key::KeyFingerprint;
use crate::protocol::{BinderConfig, BinderStats, SyncOutcome};
use crate::service::SessionService;
use crate::tasks::{Dispatch, TaskSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
	key: KeyFingerprint,
	enabled: bool,
}

impl Binding {
	fn wants(&self, key: &KeyFingerprint) -> bool {
		self.enabled && &self.key == key
	}
}

struct State<S: SessionService> {
	service: Rc<S>,
	binding: Option<Binding>,
	/// Keys with a start that has not resolved yet.
	pending: HashSet<KeyFingerprint>,
	token: Option<S::Token>,
	stats: BinderStats,
	torn_down: bool,
}

impl<S: SessionService> State<S> {
	fn wants(&self, key: &KeyFingerprint) -> bool {
		!self.torn_down && self.binding.as_ref().is_some_and(|binding| binding.wants(key))
	}
}

struct Shared<S: SessionService> {
	label: String,
	state: RefCell<State<S>>,
	tasks: TaskSet,
}

/// Keeps at most one session open for the key it was last synchronized with.
///
/// Must be used from inside a tokio `LocalSet`. Dropping it tears it down
/// without spawning, like [`MultiSessionBinder`](crate::MultiSessionBinder).
pub struct SessionBinder<S: SessionService> {
	shared: Rc<Shared<S>>,
}

impl<S: SessionService> SessionBinder<S> {
	pub fn new(config: BinderConfig, service: Rc<S>) -> Self {
		let shared = Rc::new(Shared {
			label: config.label,
			state: RefCell::new(State {
				service,
				binding: None,
				pending: HashSet::new(),
				token: None,
				stats: BinderStats::default(),
				torn_down: false,
			}),
			tasks: TaskSet::default(),
		});
		Self { shared }
	}

	/// Applies `key` and `enabled`.
	///
	/// A changed binding stops the held token during this call and, when
	/// enabled, starts a session for the new key unless a start for that key
	/// is still in flight. An unchanged binding is a no-op, so a rejected
	/// start is only retried once the key or the flag changes.
	pub fn synchronize(&mut self, service: &Rc<S>, key: &S::Key, enabled: bool) -> Result<SyncOutcome> {
		let fingerprint = KeyFingerprint::of(key)?;
		let binding = Binding {
			key: fingerprint.clone(),
			enabled,
		};

		let mut outcome = SyncOutcome::default();
		let (service, stopping, start) = {
			let mut state = self.shared.state.borrow_mut();
			if state.torn_down {
				return Err(Error::TornDown {
					label: self.shared.label.clone(),
				});
			}
			state.service = Rc::clone(service);
			if state.binding.as_ref() == Some(&binding) {
				return Ok(SyncOutcome::unchanged());
			}

			if let Some(previous) = &state.binding {
				if previous.enabled && state.pending.contains(&previous.key) && !binding.wants(&previous.key) {
					outcome.retired = 1;
				}
			}
			let in_flight = state.pending.contains(&fingerprint);
			let start = enabled && !in_flight;
			if enabled && in_flight {
				outcome.revived = 1;
			}
			if start {
				state.pending.insert(fingerprint.clone());
				state.stats.starts += 1;
			}
			state.binding = Some(binding);
			(Rc::clone(&state.service), state.token.take(), start)
		};

		if let Some(token) = stopping {
			debug!(target = "pollbind.single", binder = %self.shared.label, ?token, "binding changed; stopping session");
			self.shared.stop(&service, token, Dispatch::Spawn);
			outcome.stopped = 1;
		}
		if start {
			debug!(target = "pollbind.single", binder = %self.shared.label, key = %fingerprint, "starting session");
			let pending = service.start(key);
			let shared = Rc::clone(&self.shared);
			self.shared.tasks.spawn(async move {
				let result = pending.await;
				shared.on_started(fingerprint, result);
			});
			outcome.started = 1;
		} else if outcome.revived == 1 {
			debug!(target = "pollbind.single", binder = %self.shared.label, key = %fingerprint, "start still in flight; adopting it");
		}
		Ok(outcome)
	}

	/// Stops the held token. A start still in flight is stopped when it
	/// resolves. Calling it twice is harmless.
	pub fn teardown(&mut self) {
		self.teardown_with(Dispatch::Spawn);
	}

	fn teardown_with(&mut self, dispatch: Dispatch) {
		let (service, stopping) = {
			let mut state = self.shared.state.borrow_mut();
			if state.torn_down {
				return;
			}
			state.torn_down = true;
			state.binding = None;
			(Rc::clone(&state.service), state.token.take())
		};
		if let Some(token) = stopping {
			self.shared.stop(&service, token, dispatch);
		}
		debug!(target = "pollbind.single", binder = %self.shared.label, "torn down");
	}

	/// Tears down and waits for outstanding work to finish.
	pub async fn shutdown(mut self) -> BinderStats {
		self.teardown();
		self.settle().await;
		self.stats()
	}

	/// Waits until no continuation or stop spawned by this binder is running.
	pub async fn settle(&self) {
		self.shared.tasks.idle().await;
	}

	/// Returns true if a token is held for the current binding.
	pub fn is_active(&self) -> bool {
		self.shared.state.borrow().token.is_some()
	}

	/// Returns true if the current binding's start has not resolved yet.
	pub fn is_pending(&self) -> bool {
		let state = self.shared.state.borrow();
		state
			.binding
			.as_ref()
			.is_some_and(|binding| binding.enabled && state.pending.contains(&binding.key))
	}

	/// Key of the current binding, if any.
	pub fn key(&self) -> Option<KeyFingerprint> {
		self.shared.state.borrow().binding.as_ref().map(|binding| binding.key.clone())
	}

	pub fn stats(&self) -> BinderStats {
		self.shared.state.borrow().stats
	}

	pub fn is_torn_down(&self) -> bool {
		self.shared.state.borrow().torn_down
	}
}

/// Tears the binder down if nobody did, polling the stop once in place.
impl<S: SessionService> Drop for SessionBinder<S> {
	fn drop(&mut self) {
		if !std::thread::panicking() {
			self.teardown_with(Dispatch::Inline);
		}
	}
}

impl<S: SessionService> Shared<S> {
	fn on_started(self: &Rc<Self>, key: KeyFingerprint, result: std::result::Result<S::Token, ServiceError>) {
		let stale = {
			let mut state = self.state.borrow_mut();
			state.pending.remove(&key);
			match result {
				Ok(token) if state.wants(&key) && state.token.is_none() => {
					debug!(target = "pollbind.single", binder = %self.label, key = %key, "session active");
					state.token = Some(token);
					None
				}
				Ok(token) => {
					state.stats.stale_resolutions += 1;
					Some((Rc::clone(&state.service), token))
				}
				Err(err) => {
					state.stats.start_failures += 1;
					warn!(target = "pollbind.single", binder = %self.label, key = %key, error = %err, "session start failed");
					None
				}
			}
		};

		if let Some((service, token)) = stale {
			debug!(target = "pollbind.single", binder = %self.label, key = %key, ?token, "binding moved on; stopping late session");
			self.stop(&service, token, Dispatch::Spawn);
		}
	}

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
				None => warn!(target = "pollbind.single", binder = %self.label, "stop still in flight while dropping binder; not awaited"),
			},
		}
	}

	fn stopped(&self, result: std::result::Result<(), ServiceError>) {
		if let Err(err) = result {
			self.state.borrow_mut().stats.stop_failures += 1;
			warn!(target = "pollbind.single", binder = %self.label, error = %err, "session stop failed");
		}
	}
}

//! Test doubles for session services.
//!
//! [`ScriptedService`] records every call and lets a test decide when and how
//! each `start` resolves:
//!
//! ```ignore
//! use pollbind::testing::ScriptedService;
//!
//! let service = Rc::new(ScriptedService::<&str>::manual());
//! binder.synchronize(&service, ["foo"], true)?;
//! assert_eq!(service.start_count(&"foo"), 1);
//!
//! service.resolve(&"foo");
//! binder.settle().await;
//! assert!(binder.is_active(&"foo")?);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::rc::Rc;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::ServiceError;
use crate::key::KeyFingerprint;
use crate::service::{SessionService, StartFuture, StopFuture};

/// Token handed out by [`ScriptedService`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptedToken {
	/// Issue order, starting at 1.
	pub id: u64,
	/// Key the token was issued for.
	pub key: KeyFingerprint,
}

/// How a [`ScriptedService`] resolves starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
	/// Starts resolve as soon as they are polled.
	Immediate,
	/// Starts wait for [`ScriptedService::resolve`] or [`ScriptedService::reject`].
	Manual,
}

type Reply = oneshot::Sender<Result<(), ServiceError>>;

#[derive(Default)]
struct Script {
	next_id: u64,
	starts: Vec<KeyFingerprint>,
	stops: Vec<ScriptedToken>,
	issued: Vec<ScriptedToken>,
	parked: HashMap<KeyFingerprint, VecDeque<Reply>>,
	in_flight: HashMap<KeyFingerprint, usize>,
	max_in_flight: usize,
	failing_keys: HashSet<KeyFingerprint>,
	fail_stops: bool,
}

impl Script {
	fn issue(&mut self, key: KeyFingerprint) -> ScriptedToken {
		self.next_id += 1;
		let token = ScriptedToken { id: self.next_id, key };
		self.issued.push(token.clone());
		token
	}

	fn finish(&mut self, key: &KeyFingerprint) {
		if let Some(count) = self.in_flight.get_mut(key) {
			*count = count.saturating_sub(1);
		}
	}
}

/// Recording session service with scripted start outcomes.
pub struct ScriptedService<K> {
	mode: StartMode,
	script: Rc<RefCell<Script>>,
	_key: PhantomData<fn(K)>,
}

impl<K> ScriptedService<K> {
	/// Service whose starts resolve right away.
	pub fn immediate() -> Self {
		Self::with_mode(StartMode::Immediate)
	}

	/// Service whose starts wait to be resolved by the test.
	pub fn manual() -> Self {
		Self::with_mode(StartMode::Manual)
	}

	fn with_mode(mode: StartMode) -> Self {
		Self {
			mode,
			script: Rc::new(RefCell::new(Script::default())),
			_key: PhantomData,
		}
	}

	/// Makes every later `stop` reject.
	pub fn fail_stops(&self, fail: bool) {
		self.script.borrow_mut().fail_stops = fail;
	}

	/// Every `stop` call so far, in order.
	pub fn stops(&self) -> Vec<ScriptedToken> {
		self.script.borrow().stops.clone()
	}

	/// Every token issued so far, in order.
	pub fn issued(&self) -> Vec<ScriptedToken> {
		self.script.borrow().issued.clone()
	}

	/// Number of times `token` was stopped.
	pub fn stop_count(&self, token: &ScriptedToken) -> usize {
		self.script.borrow().stops.iter().filter(|stopped| *stopped == token).count()
	}

	/// Issued tokens that were never stopped.
	pub fn live_tokens(&self) -> Vec<ScriptedToken> {
		let script = self.script.borrow();
		script.issued.iter().filter(|token| !script.stops.contains(token)).cloned().collect()
	}

	/// Total number of `start` calls.
	pub fn total_starts(&self) -> usize {
		self.script.borrow().starts.len()
	}

	/// Highest number of unresolved starts ever seen for a single key.
	pub fn max_in_flight(&self) -> usize {
		self.script.borrow().max_in_flight
	}

	/// Starts waiting for a manual resolution.
	pub fn parked_count(&self) -> usize {
		self.script.borrow().parked.values().map(VecDeque::len).sum()
	}
}

impl<K: Serialize + Debug> ScriptedService<K> {
	/// Makes every later `start(key)` reject (immediate mode).
	pub fn fail_key(&self, key: &K) {
		let fingerprint = fingerprint(key);
		self.script.borrow_mut().failing_keys.insert(fingerprint);
	}

	/// Number of `start(key)` calls so far.
	pub fn start_count(&self, key: &K) -> usize {
		let fingerprint = fingerprint(key);
		self.script.borrow().starts.iter().filter(|started| **started == fingerprint).count()
	}

	/// Tokens issued for `key`, in order.
	pub fn tokens_for(&self, key: &K) -> Vec<ScriptedToken> {
		let fingerprint = fingerprint(key);
		self.script.borrow().issued.iter().filter(|token| token.key == fingerprint).cloned().collect()
	}

	/// Resolves the oldest parked `start(key)` with a fresh token.
	/// Returns false if none was parked.
	pub fn resolve(&self, key: &K) -> bool {
		self.reply(key, Ok(()))
	}

	/// Rejects the oldest parked `start(key)`. Returns false if none was parked.
	pub fn reject(&self, key: &K, reason: &str) -> bool {
		self.reply(key, Err(ServiceError::new(reason)))
	}

	fn reply(&self, key: &K, outcome: Result<(), ServiceError>) -> bool {
		let fingerprint = fingerprint(key);
		let reply = self.script.borrow_mut().parked.get_mut(&fingerprint).and_then(VecDeque::pop_front);
		match reply {
			Some(reply) => reply.send(outcome).is_ok(),
			None => false,
		}
	}
}

fn fingerprint<K: Serialize + Debug>(key: &K) -> KeyFingerprint {
	KeyFingerprint::of(key).unwrap_or_else(|err| panic!("test key must serialize: {err}"))
}

impl<K> SessionService for ScriptedService<K>
where
	K: Serialize + Debug + 'static,
{
	type Key = K;
	type Token = ScriptedToken;

	fn start(&self, key: &K) -> StartFuture<ScriptedToken> {
		let fingerprint = fingerprint(key);
		let mut script = self.script.borrow_mut();
		script.starts.push(fingerprint.clone());
		let in_flight = script.in_flight.entry(fingerprint.clone()).or_insert(0);
		*in_flight += 1;
		let in_flight = *in_flight;
		script.max_in_flight = script.max_in_flight.max(in_flight);

		match self.mode {
			StartMode::Immediate => {
				script.finish(&fingerprint);
				let outcome = if script.failing_keys.contains(&fingerprint) {
					Err(ServiceError::new(format!("start rejected for {fingerprint}")))
				} else {
					Ok(script.issue(fingerprint))
				};
				futures_util::future::ready(outcome).boxed_local()
			}
			StartMode::Manual => {
				let (tx, rx) = oneshot::channel();
				script.parked.entry(fingerprint.clone()).or_default().push_back(tx);
				let shared = Rc::clone(&self.script);
				async move {
					let outcome = rx.await.unwrap_or_else(|_| Err(ServiceError::new("scripted start abandoned")));
					let mut script = shared.borrow_mut();
					script.finish(&fingerprint);
					outcome.map(|()| script.issue(fingerprint))
				}
				.boxed_local()
			}
		}
	}

	fn stop(&self, token: ScriptedToken) -> StopFuture {
		let mut script = self.script.borrow_mut();
		let fail = script.fail_stops;
		script.stops.push(token.clone());
		let outcome = if fail {
			Err(ServiceError::new(format!("stop rejected for token {}", token.id)))
		} else {
			Ok(())
		};
		futures_util::future::ready(outcome).boxed_local()
	}
}

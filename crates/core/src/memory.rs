//! In-memory session service.
//!
//! Many polling tokens share one subscription per key: the first token for a
//! key subscribes, later ones join it, and stopping the last one
//! unsubscribes. Every call is logged as a [`CallRecord`] so a replay can
//! report exactly what a binder asked for.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Result, ServiceError};
use crate::key::KeyFingerprint;
use crate::protocol::{CallRecord, ServiceSettings};
use crate::service::{SessionService, StartFuture, StopFuture};

struct Subscription {
	key: Value,
	tokens: Vec<String>,
}

#[derive(Default)]
struct Book {
	next_token: u64,
	subscriptions: IndexMap<KeyFingerprint, Subscription>,
	owners: HashMap<String, KeyFingerprint>,
	calls: Vec<CallRecord>,
}

impl Book {
	fn subscribe(&mut self, fingerprint: KeyFingerprint, key: &Value) -> String {
		self.next_token += 1;
		let token = self.next_token.to_string();
		let subscription = self.subscriptions.entry(fingerprint.clone()).or_insert_with(|| {
			debug!(target = "pollbind.memory", key = %fingerprint, "subscribed");
			Subscription {
				key: key.clone(),
				tokens: Vec::new(),
			}
		});
		subscription.tokens.push(token.clone());
		self.owners.insert(token.clone(), fingerprint);
		token
	}

	fn unsubscribe(&mut self, token: &str) -> bool {
		let Some(fingerprint) = self.owners.remove(token) else {
			return false;
		};
		if let Some(subscription) = self.subscriptions.get_mut(&fingerprint) {
			subscription.tokens.retain(|held| held != token);
			if subscription.tokens.is_empty() {
				self.subscriptions.shift_remove(&fingerprint);
				debug!(target = "pollbind.memory", key = %fingerprint, "unsubscribed");
			}
		}
		true
	}
}

/// Reference-counted in-memory implementation of [`SessionService`].
///
/// Tokens are decimal strings issued from a counter starting at `"1"`.
#[derive(Clone, Default)]
pub struct MemoryService {
	latency: Duration,
	key_latency: HashMap<KeyFingerprint, Duration>,
	failing_keys: HashSet<KeyFingerprint>,
	book: Rc<RefCell<Book>>,
}

impl MemoryService {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a service from scenario settings.
	pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
		let mut service = Self::new().latency(Duration::from_millis(settings.latency_ms));
		for entry in &settings.key_latency {
			service = service.key_latency(&entry.key, Duration::from_millis(entry.latency_ms))?;
		}
		for key in &settings.failing_keys {
			service = service.failing_key(key)?;
		}
		Ok(service)
	}

	/// Delay before every `start` resolves.
	pub fn latency(mut self, latency: Duration) -> Self {
		self.latency = latency;
		self
	}

	/// Delay before `start(key)` resolves, overriding [`latency`](Self::latency).
	pub fn key_latency(mut self, key: &Value, latency: Duration) -> Result<Self> {
		self.key_latency.insert(KeyFingerprint::of(key)?, latency);
		Ok(self)
	}

	/// Makes every `start(key)` reject.
	pub fn failing_key(mut self, key: &Value) -> Result<Self> {
		self.failing_keys.insert(KeyFingerprint::of(key)?);
		Ok(self)
	}

	/// Keys with a live subscription, in subscription order.
	pub fn active_keys(&self) -> Vec<Value> {
		self.book.borrow().subscriptions.values().map(|subscription| subscription.key.clone()).collect()
	}

	/// Tokens currently joined to `key`'s subscription.
	pub fn subscribers(&self, key: &Value) -> Result<usize> {
		let fingerprint = KeyFingerprint::of(key)?;
		Ok(self.book.borrow().subscriptions.get(&fingerprint).map_or(0, |subscription| subscription.tokens.len()))
	}

	/// Every call observed so far.
	pub fn calls(&self) -> Vec<CallRecord> {
		self.book.borrow().calls.clone()
	}

	/// Stops every outstanding token and returns how many there were.
	pub fn stop_all(&self) -> usize {
		let mut book = self.book.borrow_mut();
		let tokens: Vec<String> = book.subscriptions.values().flat_map(|subscription| subscription.tokens.iter().cloned()).collect();
		for token in &tokens {
			book.unsubscribe(token);
			book.calls.push(CallRecord::Stop {
				token: token.clone(),
				known: true,
			});
		}
		debug!(target = "pollbind.memory", stopped = tokens.len(), "stopped all polling");
		tokens.len()
	}

	fn latency_for(&self, fingerprint: &KeyFingerprint) -> Duration {
		self.key_latency.get(fingerprint).copied().unwrap_or(self.latency)
	}
}

impl SessionService for MemoryService {
	type Key = Value;
	type Token = String;

	fn start(&self, key: &Value) -> StartFuture<String> {
		self.book.borrow_mut().calls.push(CallRecord::Start { key: key.clone() });
		let fingerprint = match KeyFingerprint::of(key) {
			Ok(fingerprint) => fingerprint,
			Err(err) => return futures_util::future::ready(Err(ServiceError::with_source("invalid key", err))).boxed_local(),
		};

		let latency = self.latency_for(&fingerprint);
		let failing = self.failing_keys.contains(&fingerprint);
		let book = Rc::clone(&self.book);
		let key = key.clone();
		async move {
			if !latency.is_zero() {
				tokio::time::sleep(latency).await;
			}
			let mut book = book.borrow_mut();
			if failing {
				let reason = format!("no polling source for {fingerprint}");
				book.calls.push(CallRecord::StartFailed {
					key,
					reason: reason.clone(),
				});
				return Err(ServiceError::new(reason));
			}
			let token = book.subscribe(fingerprint, &key);
			book.calls.push(CallRecord::Started { key, token: token.clone() });
			Ok(token)
		}
		.boxed_local()
	}

	fn stop(&self, token: String) -> StopFuture {
		let mut book = self.book.borrow_mut();
		let known = book.unsubscribe(&token);
		if !known {
			trace!(target = "pollbind.memory", %token, "stop for unknown token");
		}
		book.calls.push(CallRecord::Stop { token, known });
		futures_util::future::ready(Ok(())).boxed_local()
	}
}

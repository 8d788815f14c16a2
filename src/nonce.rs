//! The outstanding-nonce store.
//!
//! Every issued [`PaymentDescriptor`] is recorded here under its nonce until
//! it is either consumed by an accepted proof or expires. The store is the
//! one piece of shared mutable state in the gate; it is created by the host
//! process and injected into the middleware, so lifetime and test isolation
//! stay explicit.
//!
//! # Thread Safety
//!
//! Entries live in a [`DashMap`] shared across clones via `Arc` at the call
//! sites. Issuance is lock-free (every issuance creates a fresh nonce).
//! Consumption mutates the entry under its shard lock, so the
//! Outstanding→Consumed transition is exclusive: of any number of concurrent
//! [`consume`](InMemoryNonceStore::consume) calls for the same nonce, exactly
//! one succeeds. Callers must not hold results of `lookup` as authoritative
//! across an await point; `consume` re-checks state and expiry.

use dashmap::DashMap;

use crate::proto::{Nonce, PaymentDescriptor};
use crate::timestamp::UnixTimestamp;

/// Lifecycle state of an issued nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NonceState {
    /// Issued and payable.
    Outstanding,
    /// A proof against this nonce was accepted; it never validates again.
    Consumed,
}

#[derive(Debug, Clone)]
struct NonceEntry {
    descriptor: PaymentDescriptor,
    state: NonceState,
}

/// Result of a non-consuming store lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum NonceLookup {
    /// The nonce is outstanding; the issued descriptor is returned.
    Outstanding(PaymentDescriptor),
    /// The nonce was already consumed by an accepted proof.
    Consumed,
    /// The descriptor passed its deadline; the entry has been evicted.
    Expired,
    /// The nonce was never issued here (or was evicted after expiry).
    Unknown,
}

/// In-memory concurrent store of issued descriptor nonces.
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    entries: DashMap<Nonce, NonceEntry>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Records a freshly issued descriptor as outstanding.
    ///
    /// Descriptors are immutable once issued; issuing twice under the same
    /// nonce would be a bug on the caller's side, so the first record wins.
    pub fn issue(&self, descriptor: PaymentDescriptor) {
        self.entries
            .entry(descriptor.nonce)
            .or_insert(NonceEntry {
                descriptor,
                state: NonceState::Outstanding,
            });
    }

    /// Snapshot of a nonce's state, lazily evicting it when expired.
    pub fn lookup(&self, nonce: &Nonce, now: UnixTimestamp) -> NonceLookup {
        match self.entries.get(nonce) {
            None => return NonceLookup::Unknown,
            Some(entry) => {
                if !entry.descriptor.expires_at.is_past(now) {
                    return match entry.state {
                        NonceState::Outstanding => {
                            NonceLookup::Outstanding(entry.descriptor.clone())
                        }
                        NonceState::Consumed => NonceLookup::Consumed,
                    };
                }
            }
        }
        // Deadline passed. The read guard is dropped, so evict lazily.
        self.entries.remove(nonce);
        NonceLookup::Expired
    }

    /// Atomically transitions a nonce from outstanding to consumed.
    ///
    /// Exactly one of any set of concurrent calls for the same nonce
    /// succeeds; the rest observe the consumed (or expired) state. Returns
    /// the issued descriptor on success so the caller can act on the exact
    /// terms that were paid for.
    pub fn consume(&self, nonce: &Nonce, now: UnixTimestamp) -> Result<PaymentDescriptor, NonceLookup> {
        match self.entries.get_mut(nonce) {
            None => Err(NonceLookup::Unknown),
            Some(mut entry) => {
                if entry.descriptor.expires_at.is_past(now) {
                    return Err(NonceLookup::Expired);
                }
                match entry.state {
                    NonceState::Consumed => Err(NonceLookup::Consumed),
                    NonceState::Outstanding => {
                        entry.state = NonceState::Consumed;
                        Ok(entry.descriptor.clone())
                    }
                }
            }
        }
    }

    /// Evicts every entry past its deadline. Returns the number evicted.
    ///
    /// Consumed entries are retained until expiry so replays keep reporting
    /// `Consumed` rather than `Unknown` while the descriptor window is open.
    pub fn evict_expired(&self, now: UnixTimestamp) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.descriptor.expires_at.is_past(now));
        before - self.entries.len()
    }

    /// Number of tracked nonces (outstanding and consumed).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::proto::TokenAmount;
    use std::sync::Arc;

    fn descriptor(expires_at: u64) -> PaymentDescriptor {
        PaymentDescriptor {
            resource: "http://localhost/protected".to_string(),
            description: "".to_string(),
            mime_type: "application/json".to_string(),
            amount: TokenAmount(10000),
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string(),
            network: Network::BaseSepolia,
            pay_to: "0xBAc675C310721717Cd4A37F6cbeA1F081b1C2a07".to_string(),
            expires_at: UnixTimestamp::from_secs(expires_at),
            nonce: Nonce::random(),
        }
    }

    #[test]
    fn test_issue_then_lookup_outstanding() {
        let store = InMemoryNonceStore::new();
        let d = descriptor(1000);
        store.issue(d.clone());
        let now = UnixTimestamp::from_secs(500);
        assert_eq!(store.lookup(&d.nonce, now), NonceLookup::Outstanding(d));
    }

    #[test]
    fn test_unknown_nonce() {
        let store = InMemoryNonceStore::new();
        let now = UnixTimestamp::from_secs(0);
        assert_eq!(store.lookup(&Nonce::random(), now), NonceLookup::Unknown);
    }

    #[test]
    fn test_consume_exactly_once() {
        let store = InMemoryNonceStore::new();
        let d = descriptor(1000);
        store.issue(d.clone());
        let now = UnixTimestamp::from_secs(500);
        assert!(store.consume(&d.nonce, now).is_ok());
        assert_eq!(store.consume(&d.nonce, now), Err(NonceLookup::Consumed));
        assert_eq!(store.lookup(&d.nonce, now), NonceLookup::Consumed);
    }

    #[test]
    fn test_expired_lookup_evicts() {
        let store = InMemoryNonceStore::new();
        let d = descriptor(100);
        store.issue(d.clone());
        let later = UnixTimestamp::from_secs(101);
        assert_eq!(store.lookup(&d.nonce, later), NonceLookup::Expired);
        // Entry is gone after lazy eviction.
        assert_eq!(store.lookup(&d.nonce, later), NonceLookup::Unknown);
    }

    #[test]
    fn test_expired_consume_rejected() {
        let store = InMemoryNonceStore::new();
        let d = descriptor(100);
        store.issue(d.clone());
        let later = UnixTimestamp::from_secs(200);
        assert_eq!(store.consume(&d.nonce, later), Err(NonceLookup::Expired));
    }

    #[test]
    fn test_evict_expired_sweep() {
        let store = InMemoryNonceStore::new();
        let d1 = descriptor(100);
        let d2 = descriptor(1000);
        store.issue(d1);
        store.issue(d2.clone());
        let evicted = store.evict_expired(UnixTimestamp::from_secs(500));
        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.lookup(&d2.nonce, UnixTimestamp::from_secs(500)),
            NonceLookup::Outstanding(_)
        ));
    }

    #[test]
    fn test_concurrent_consume_single_winner() {
        let store = Arc::new(InMemoryNonceStore::new());
        let d = descriptor(1000);
        store.issue(d.clone());
        let now = UnixTimestamp::from_secs(500);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let nonce = d.nonce;
            handles.push(std::thread::spawn(move || {
                store.consume(&nonce, now).is_ok()
            }));
        }
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}

//! Pending-request table correlating responses to their callers.
//!
//! Every request waiting for a response owns one slot keyed by its message
//! id. All resolution paths (response, timeout, connection failure) go
//! through [`PendingTable::take`], so whichever path removes the slot first
//! is the only one that ever sees its continuation.

use std::{
    num::NonZeroUsize,
    sync::{
        Mutex,
        PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{sync::oneshot, time::Instant};

use super::hooks::ResponseCallback;
use crate::{chunk::MessageId, error::Error, request::Request, response::Response};

/// How a caller wants to be told about its request's outcome.
pub(super) enum Continuation {
    /// A task or thread parked on the receiving half.
    Waiter(oneshot::Sender<Result<Response, Error>>),
    /// A callback run on the connection's reader task.
    ///
    /// The mutex keeps the table entry `Sync` for closures that are only
    /// `Send`.
    Callback {
        request: Request,
        callback: Mutex<ResponseCallback>,
    },
}

impl Continuation {
    pub(super) fn callback(request: Request, callback: ResponseCallback) -> Self {
        Self::Callback {
            request,
            callback: Mutex::new(callback),
        }
    }

    /// Hand `outcome` to the caller, consuming the continuation.
    pub(super) fn resolve(self, outcome: Result<Response, Error>) {
        if let Err(error) = &outcome {
            crate::metrics::inc_errors(error.kind());
        }
        match self {
            Self::Waiter(tx) => {
                // A dropped receiver means the caller stopped waiting.
                let _ = tx.send(outcome);
            }
            Self::Callback { request, callback } => {
                let callback = callback.into_inner().unwrap_or_else(PoisonError::into_inner);
                callback(outcome, request);
            }
        }
    }
}

/// One outstanding request.
pub(super) struct PendingRequest {
    pub(super) continuation: Continuation,
    pub(super) submitted_at: Instant,
    pub(super) deadline: Option<Instant>,
}

impl PendingRequest {
    pub(super) fn new(continuation: Continuation, deadline: Option<Instant>) -> Self {
        Self {
            continuation,
            submitted_at: Instant::now(),
            deadline,
        }
    }

    pub(super) fn resolve(self, outcome: Result<Response, Error>) { self.continuation.resolve(outcome); }
}

/// Concurrent map from message id to pending request.
pub(super) struct PendingTable {
    entries: DashMap<MessageId, PendingRequest>,
    in_flight: AtomicUsize,
    cap: Option<NonZeroUsize>,
}

impl PendingTable {
    pub(super) fn new(cap: Option<NonZeroUsize>) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            cap,
        }
    }

    /// Store `pending` under a fresh id drawn from `next_id`.
    ///
    /// Ids that are zero or still occupied are skipped, so an id is never
    /// shared by two in-flight requests. Returns the request unchanged when
    /// the in-flight cap is reached.
    pub(super) fn insert(
        &self,
        next_id: &AtomicU64,
        pending: PendingRequest,
    ) -> Result<MessageId, PendingRequest> {
        if !self.reserve() {
            return Err(pending);
        }
        loop {
            let raw = next_id.fetch_add(1, Ordering::Relaxed);
            if raw == 0 {
                continue;
            }
            let id = MessageId::new(raw);
            if let Entry::Vacant(slot) = self.entries.entry(id) {
                slot.insert(pending);
                return Ok(id);
            }
        }
    }

    fn reserve(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| match self.cap {
                Some(cap) if current >= cap.get() => None,
                _ => Some(current + 1),
            })
            .is_ok()
    }

    /// Remove and return the request stored under `id`.
    pub(super) fn take(&self, id: MessageId) -> Option<PendingRequest> {
        let (_, pending) = self.entries.remove(&id)?;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Some(pending)
    }

    /// Remove every request whose deadline is at or before `now`.
    pub(super) fn take_expired(&self, now: Instant) -> Vec<(MessageId, PendingRequest)> {
        let expired: Vec<MessageId> = self
            .entries
            .iter()
            .filter(|entry| entry.deadline.is_some_and(|deadline| deadline <= now))
            .map(|entry| *entry.key())
            .collect();
        self.take_all(expired)
    }

    /// Remove every request.
    pub(super) fn drain(&self) -> Vec<(MessageId, PendingRequest)> {
        let ids: Vec<MessageId> = self.entries.iter().map(|entry| *entry.key()).collect();
        self.take_all(ids)
    }

    fn take_all(&self, ids: Vec<MessageId>) -> Vec<(MessageId, PendingRequest)> {
        ids.into_iter()
            .filter_map(|id| self.take(id).map(|pending| (id, pending)))
            .collect()
    }

    /// Requests currently awaiting a response.
    pub(super) fn len(&self) -> usize { self.in_flight.load(Ordering::SeqCst) }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use rstest::rstest;
    use tokio::{sync::oneshot, time::Instant};

    use super::{Continuation, PendingRequest, PendingTable};
    use crate::{chunk::MessageId, error::Error};

    fn waiter(deadline: Option<Instant>) -> PendingRequest {
        let (tx, _rx) = oneshot::channel();
        PendingRequest::new(Continuation::Waiter(tx), deadline)
    }

    #[test]
    fn ids_skip_zero_and_occupied_slots() {
        let table = PendingTable::new(None);
        let next_id = AtomicU64::new(u64::MAX);

        let first = table.insert(&next_id, waiter(None)).ok().expect("inserted");
        assert_eq!(first, MessageId::new(u64::MAX));
        let second = table.insert(&next_id, waiter(None)).ok().expect("inserted");
        assert_eq!(second, MessageId::new(1), "zero is never issued");

        next_id.store(1, Ordering::Relaxed);
        let third = table.insert(&next_id, waiter(None)).ok().expect("inserted");
        assert_eq!(third, MessageId::new(2), "occupied id 1 is skipped");
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn take_resolves_a_request_once() {
        let table = PendingTable::new(None);
        let next_id = AtomicU64::new(1);
        let id = table.insert(&next_id, waiter(None)).ok().expect("inserted");

        assert!(table.take(id).is_some());
        assert!(table.take(id).is_none());
        assert_eq!(table.len(), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    fn cap_rejects_excess_requests(#[case] cap: usize) {
        let table = PendingTable::new(NonZeroUsize::new(cap));
        let next_id = AtomicU64::new(1);
        for _ in 0..cap {
            assert!(table.insert(&next_id, waiter(None)).is_ok());
        }
        assert!(table.insert(&next_id, waiter(None)).is_err());
        assert_eq!(table.len(), cap);

        let id = MessageId::new(1);
        assert!(table.take(id).is_some());
        assert!(table.insert(&next_id, waiter(None)).is_ok(), "slot freed");
    }

    #[tokio::test(start_paused = true)]
    async fn only_expired_requests_are_taken() {
        let table = PendingTable::new(None);
        let next_id = AtomicU64::new(1);
        let now = Instant::now();
        let soon = table
            .insert(&next_id, waiter(Some(now + Duration::from_secs(1))))
            .ok()
            .expect("inserted");
        let later = table
            .insert(&next_id, waiter(Some(now + Duration::from_secs(10))))
            .ok()
            .expect("inserted");
        let never = table.insert(&next_id, waiter(None)).ok().expect("inserted");

        let expired = table.take_expired(now + Duration::from_secs(5));
        let ids: Vec<_> = expired.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![soon]);

        let drained: Vec<_> = table.drain().into_iter().map(|(id, _)| id).collect();
        assert_eq!(drained.len(), 2);
        assert!(drained.contains(&later) && drained.contains(&never));
    }

    #[test]
    fn callback_receives_the_request_back() {
        let (tx, rx) = std::sync::mpsc::channel();
        let request = crate::create_request(crate::RestVerb::Get, "/_api/version");
        let continuation = Continuation::callback(
            request.clone(),
            Box::new(move |outcome, request| {
                tx.send((outcome, request)).expect("send");
            }),
        );
        continuation.resolve(Err(Error::Timeout));

        let (outcome, returned) = rx.recv().expect("callback ran");
        assert_eq!(outcome, Err(Error::Timeout));
        assert_eq!(returned, request);
    }

    #[test]
    fn table_holding_a_callback_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>(_: &T) {}

        // `Cell` is `Send` but not `Sync`, so the closure is not `Sync` either.
        let hits = std::cell::Cell::new(0_u32);
        let (tx, rx) = std::sync::mpsc::channel();
        let table = PendingTable::new(None);
        let next_id = AtomicU64::new(1);
        let request = crate::create_request(crate::RestVerb::Get, "/cell");
        let id = table
            .insert(
                &next_id,
                PendingRequest::new(
                    Continuation::callback(
                        request,
                        Box::new(move |outcome, _| {
                            hits.set(hits.get() + 1);
                            tx.send((hits.get(), outcome)).expect("send");
                        }),
                    ),
                    None,
                ),
            )
            .ok()
            .expect("inserted");
        assert_send_sync(&table);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                table.take(id).expect("pending").resolve(Err(Error::Canceled));
            });
        });
        assert_eq!(rx.recv().expect("callback ran"), (1, Err(Error::Canceled)));
    }
}

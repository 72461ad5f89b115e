//! Per-conversation turn serialization.
//!
//! A turn holds its conversation's lock from the user-message write to the
//! final touch, so two turns on one conversation never interleave their
//! history reads and writes. Turns on different conversations never wait on
//! each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use emberchat_core::ConversationId;
use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
pub struct ConversationLocks {
    slots: Mutex<HashMap<ConversationId, Slot>>,
}

/// Held for the duration of one turn. Dropping it releases the lock and
/// forgets the map entry when nobody else is waiting.
pub struct TurnGuard<'a> {
    locks: &'a ConversationLocks,
    id: ConversationId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: ConversationId) -> TurnGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            slots.entry(id).or_default().clone()
        };
        let mut waiting = Waiting {
            locks: self,
            id,
            slot: Some(slot.clone()),
        };
        let guard = slot.lock_owned().await;
        waiting.slot = None;
        TurnGuard {
            locks: self,
            id,
            guard: Some(guard),
        }
    }

    /// Forget `id` when only the map still references its slot.
    fn prune(&self, id: ConversationId) {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        if slots
            .get(&id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&id);
        }
    }

    /// Number of conversations with a live lock entry.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(self.id);
    }
}

/// Pins a queued waiter's reference to its slot. If `acquire` is dropped
/// before the lock is granted, this prunes the entry the holder kept for it.
struct Waiting<'a> {
    locks: &'a ConversationLocks,
    id: ConversationId,
    slot: Option<Slot>,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            drop(slot);
            self.locks.prune(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Poll;
    use std::time::Duration;

    #[tokio::test]
    async fn entries_are_released() {
        let locks = ConversationLocks::new();
        {
            let _a = locks.acquire(ConversationId(1)).await;
            let _b = locks.acquire(ConversationId(2)).await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn same_conversation_is_serialized() {
        let locks = Arc::new(ConversationLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (locks, inside, max_inside) = (locks.clone(), inside.clone(), max_inside.clone());
            handles.push(tokio::spawn(async move {
                let _turn = locks.acquire(ConversationId(9)).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire(ConversationId(1)).await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire(ConversationId(2))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_entry() {
        let locks = ConversationLocks::new();
        let holder = locks.acquire(ConversationId(5)).await;

        let mut waiter = Box::pin(locks.acquire(ConversationId(5)));
        let pending =
            std::future::poll_fn(|cx| Poll::Ready(waiter.as_mut().poll(cx).is_pending())).await;
        assert!(pending);

        drop(holder);
        assert_eq!(locks.len(), 1);
        drop(waiter);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_cancelled_while_held_is_pruned_with_holder() {
        let locks = ConversationLocks::new();
        let holder = locks.acquire(ConversationId(6)).await;

        let waited =
            tokio::time::timeout(Duration::from_millis(10), locks.acquire(ConversationId(6))).await;
        assert!(waited.is_err());
        assert_eq!(locks.len(), 1);

        drop(holder);
        assert!(locks.is_empty());
    }
}

/*
 * The inter-context message queue: two independent directions, each a
 * single 32-bit-word-deep slot with blocking push and pop, modeled on
 * the mailbox FIFO that links the two cores of dual-core parts. The
 * queue operations are the only synchronization points between the two
 * sides; no other shared-memory visibility is assumed.
 *
 * `push` and `pop` block by suspending the calling task. There are no
 * timeouts anywhere: a context that pops with nothing inbound stalls
 * until the peer pushes. That is a deliberate property of the design
 * this reproduces, not an oversight.
 */

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::waitqueue::WakerRegistration;

struct Slot<T> {
    word: Option<T>,
    push_waker: WakerRegistration,
    pop_waker: WakerRegistration,
}

/// One direction of the queue: a single slot, one writer side, one
/// reader side.
pub struct Fifo<M: RawMutex, T> {
    slot: Mutex<M, RefCell<Slot<T>>>,
}

impl<M: RawMutex, T> Fifo<M, T> {
    pub const fn new() -> Self {
        Fifo {
            slot: Mutex::new(RefCell::new(Slot {
                word: None,
                push_waker: WakerRegistration::new(),
                pop_waker: WakerRegistration::new(),
            })),
        }
    }

    /// Enqueue without waiting; a full slot hands the word back.
    pub fn try_push(&self, word: T) -> Result<(), T> {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.word.is_some() {
                Err(word)
            } else {
                slot.word = Some(word);
                slot.pop_waker.wake();
                Ok(())
            }
        })
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            let word = slot.word.take();
            if word.is_some() {
                slot.push_waker.wake();
            }
            word
        })
    }

    /// Enqueue, waiting until the slot is free.
    pub async fn push(&self, word: T) {
        let mut word = Some(word);
        poll_fn(|cx| {
            self.slot.lock(|slot| {
                let mut slot = slot.borrow_mut();
                if slot.word.is_none() {
                    slot.word = word.take();
                    slot.pop_waker.wake();
                    Poll::Ready(())
                } else {
                    slot.push_waker.register(cx.waker());
                    Poll::Pending
                }
            })
        })
        .await
    }

    /// Dequeue, waiting until a word arrives.
    pub async fn pop(&self) -> T {
        poll_fn(|cx| {
            self.slot.lock(|slot| {
                let mut slot = slot.borrow_mut();
                match slot.word.take() {
                    Some(word) => {
                        slot.push_waker.wake();
                        Poll::Ready(word)
                    }
                    None => {
                        slot.pop_waker.register(cx.waker());
                        Poll::Pending
                    }
                }
            })
        })
        .await
    }
}

/// Both directions, bundled the way the hardware exposes them. Each
/// context takes one [`Endpoint`]; pushes come out of the peer's pops
/// in order, exactly once.
pub struct FifoPair<M: RawMutex, T> {
    a_to_b: Fifo<M, T>,
    b_to_a: Fifo<M, T>,
}

impl<M: RawMutex, T> FifoPair<M, T> {
    pub const fn new() -> Self {
        FifoPair {
            a_to_b: Fifo::new(),
            b_to_a: Fifo::new(),
        }
    }

    pub fn endpoints(&self) -> (Endpoint<'_, M, T>, Endpoint<'_, M, T>) {
        (
            Endpoint {
                tx: &self.a_to_b,
                rx: &self.b_to_a,
            },
            Endpoint {
                tx: &self.b_to_a,
                rx: &self.a_to_b,
            },
        )
    }
}

/// One context's view of the pair. Not clonable: each direction has a
/// single writer and a single reader.
pub struct Endpoint<'a, M: RawMutex, T> {
    tx: &'a Fifo<M, T>,
    rx: &'a Fifo<M, T>,
}

impl<M: RawMutex, T> Endpoint<'_, M, T> {
    pub async fn push(&self, word: T) {
        self.tx.push(word).await;
    }

    pub async fn pop(&self) -> T {
        self.rx.pop().await
    }

    pub fn try_push(&self, word: T) -> Result<(), T> {
        self.tx.try_push(word)
    }

    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_pop()
    }
}

/// Protocol tokens for the advisory crossing lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Token {
    /// "I am using the crossing."
    Lock,
    /// "Done; the crossing is free."
    Free,
}

impl Token {
    // Any 32-bit values work; these two survive from the wire protocol
    // this reproduces.
    pub const fn word(self) -> u32 {
        match self {
            Token::Lock => 0xA5,
            Token::Free => 0x5A,
        }
    }

    pub const fn from_word(word: u32) -> Option<Token> {
        match word {
            0xA5 => Some(Token::Lock),
            0x5A => Some(Token::Free),
            _ => None,
        }
    }
}

/// Advisory mutual exclusion over a [`FifoPair`] endpoint: each side
/// mirrors the peer's state in `remote_busy` from the tokens it has
/// drained, and may enter the shared section only when neither side is
/// busy. Entering announces [`Token::Lock`]; leaving announces
/// [`Token::Free`].
///
/// The protocol is a convention, not an enforcement. A side that skips
/// `sync_remote` can enter concurrently with its peer, and a side that
/// claims and never releases locks the peer out permanently: there is
/// no timeout, heartbeat, or recovery. Known weakness, kept as-is.
///
/// With a one-deep slot per direction, tokens must also be drained
/// promptly: an undrained announcement from the peer would block the
/// peer's next push. `claim` drains before deciding; contexts that
/// sleep between claims keep `watch_remote` pending meanwhile.
pub struct AdvisoryLock<'a, M: RawMutex> {
    port: Endpoint<'a, M, u32>,
    local_busy: bool,
    remote_busy: bool,
}

impl<'a, M: RawMutex> AdvisoryLock<'a, M> {
    pub fn new(port: Endpoint<'a, M, u32>) -> Self {
        AdvisoryLock {
            port,
            local_busy: false,
            remote_busy: false,
        }
    }

    fn fold(&mut self, word: u32) {
        match Token::from_word(word) {
            Some(Token::Lock) => self.remote_busy = true,
            Some(Token::Free) => self.remote_busy = false,
            None => {}
        }
    }

    /// Fold every inbound token into `remote_busy`. Words that are not
    /// tokens are ignored.
    pub fn sync_remote(&mut self) {
        while let Some(word) = self.port.try_pop() {
            self.fold(word);
        }
    }

    /// Wait for the next inbound token and fold it. A context that
    /// sleeps between claims keeps this pending so the peer's
    /// announcements stay drained; with a one-deep slot, an undrained
    /// announcement would block the peer's next `release`.
    pub async fn watch_remote(&mut self) {
        let word = self.port.pop().await;
        self.fold(word);
    }

    pub fn is_free(&self) -> bool {
        !self.local_busy && !self.remote_busy
    }

    pub fn local_busy(&self) -> bool {
        self.local_busy
    }

    pub fn remote_busy(&self) -> bool {
        self.remote_busy
    }

    /// Try to enter the shared section: drain inbound tokens, and if
    /// neither side is busy, mark this side busy and announce it.
    /// Returns whether entry was granted; a refusal is not an error,
    /// the caller retries on its next pass.
    pub async fn claim(&mut self) -> bool {
        self.sync_remote();
        if !self.is_free() {
            return false;
        }

        self.local_busy = true;
        self.port.push(Token::Lock.word()).await;
        true
    }

    /// Leave the shared section and announce it. Calling without a
    /// prior successful `claim` does nothing.
    pub async fn release(&mut self) {
        if !self.local_busy {
            return;
        }

        self.port.push(Token::Free.word()).await;
        self.local_busy = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::future::Future;
    use core::pin::pin;
    use core::task::{Context, Waker};
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn slot_holds_exactly_one_word() {
        let fifo: Fifo<NoopRawMutex, u32> = Fifo::new();

        assert_eq!(fifo.try_push(1), Ok(()));
        assert_eq!(fifo.try_push(2), Err(2));
        assert_eq!(fifo.try_pop(), Some(1));
        assert_eq!(fifo.try_pop(), None);
    }

    #[test]
    fn words_arrive_in_push_order() {
        let pair: FifoPair<NoopRawMutex, u32> = FifoPair::new();
        let (a, b) = pair.endpoints();

        block_on(join(
            async {
                for word in [1, 2, 3] {
                    a.push(word).await;
                }
            },
            async {
                for word in [1, 2, 3] {
                    assert_eq!(b.pop().await, word);
                }
            },
        ));
    }

    #[test]
    fn pop_blocks_until_the_push_happens() {
        let fifo: Fifo<NoopRawMutex, u32> = Fifo::new();
        let mut cx = Context::from_waker(Waker::noop());

        let mut pop = pin!(fifo.pop());
        assert!(pop.as_mut().poll(&mut cx).is_pending());
        assert!(pop.as_mut().poll(&mut cx).is_pending());

        fifo.try_push(5).unwrap();
        assert_eq!(pop.as_mut().poll(&mut cx), Poll::Ready(5));
    }

    #[test]
    fn push_blocks_while_the_slot_is_full() {
        let fifo: Fifo<NoopRawMutex, u32> = Fifo::new();
        let mut cx = Context::from_waker(Waker::noop());

        fifo.try_push(1).unwrap();
        let mut push = pin!(fifo.push(2));
        assert!(push.as_mut().poll(&mut cx).is_pending());

        assert_eq!(fifo.try_pop(), Some(1));
        assert_eq!(push.as_mut().poll(&mut cx), Poll::Ready(()));
        assert_eq!(fifo.try_pop(), Some(2));
    }

    #[test]
    fn tokens_round_trip_their_wire_words() {
        assert_eq!(Token::from_word(Token::Lock.word()), Some(Token::Lock));
        assert_eq!(Token::from_word(Token::Free.word()), Some(Token::Free));
        assert_eq!(Token::from_word(0xDEAD_BEEF), None);
    }

    #[test]
    fn claims_alternate_without_overlap() {
        let pair: FifoPair<NoopRawMutex, u32> = FifoPair::new();
        let (port_a, port_b) = pair.endpoints();
        let mut a = AdvisoryLock::new(port_a);
        let mut b = AdvisoryLock::new(port_b);

        block_on(async {
            assert!(a.claim().await);
            assert!(a.local_busy());

            // The peer, once synchronized, refuses to enter.
            b.sync_remote();
            assert!(b.remote_busy());
            assert!(!b.claim().await);
            assert!(!b.local_busy());

            a.release().await;
            assert!(b.claim().await);

            // Now the roles are swapped.
            a.sync_remote();
            assert!(a.remote_busy());
            assert!(!a.claim().await);

            b.release().await;
            assert!(a.claim().await);

            // The peer must drain the announcement before this side's
            // next release can fit in the one-deep slot.
            b.sync_remote();
            assert!(b.remote_busy());
            a.release().await;
        });
    }

    #[test]
    fn missing_free_locks_the_peer_out_permanently() {
        let pair: FifoPair<NoopRawMutex, u32> = FifoPair::new();
        let (port_a, port_b) = pair.endpoints();
        let mut a = AdvisoryLock::new(port_a);
        let mut b = AdvisoryLock::new(port_b);

        block_on(async {
            // Side A enters and "crashes": the FREE token never comes.
            assert!(a.claim().await);

            // No retry ever succeeds; the protocol has no recovery.
            for _ in 0..3 {
                assert!(!b.claim().await);
            }
        });
    }

    #[test]
    fn watch_folds_tokens_as_they_arrive() {
        let pair: FifoPair<NoopRawMutex, u32> = FifoPair::new();
        let (port_a, port_b) = pair.endpoints();
        let mut b = AdvisoryLock::new(port_b);

        port_a.try_push(Token::Lock.word()).unwrap();
        block_on(b.watch_remote());
        assert!(b.remote_busy());

        port_a.try_push(Token::Free.word()).unwrap();
        block_on(b.watch_remote());
        assert!(!b.remote_busy());
    }

    #[test]
    fn non_token_words_do_not_disturb_the_lock() {
        let pair: FifoPair<NoopRawMutex, u32> = FifoPair::new();
        let (port_a, port_b) = pair.endpoints();
        let mut b = AdvisoryLock::new(port_b);

        port_a.try_push(0x1234).unwrap();
        b.sync_remote();
        assert!(b.is_free());
    }
}

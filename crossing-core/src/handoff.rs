/*
 * Handoff cells between an asynchronous producer context and a polling
 * consumer on the same core: an interrupt handler, an EXTI-driven I/O
 * task, any code that must finish in bounded time and cannot talk to
 * the outside world directly.
 *
 * The producer side of each cell is a handful of instructions and never
 * blocks. The consumer drains on its own schedule. Three shapes cover
 * what the handlers here need:
 *
 *  - `EventFlag`: zero-or-one pending notification, last write wins.
 *    Two signals before a drain collapse into one; that is the
 *    contract, not a lost-update bug.
 *  - `EventCounter`: a shared event count the handler bumps and the
 *    loop reads or takes.
 *  - `EventQueue`: a bounded ring for when each event matters; a full
 *    ring hands the rejected element back instead of overwriting.
 */

use core::cell::{Cell, RefCell};
use core::future::poll_fn;
use core::sync::atomic::{AtomicU32, Ordering};
use core::task::Poll;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Deque;

enum FlagState<T> {
    Empty,
    Pending(T),
    Waiting(core::task::Waker),
}

/// A single-slot notification from one producer to one consumer.
///
/// The pending slot is logically owned by the consumer: only `drain`
/// and `wait` clear it. The producer only ever sets it, overwriting an
/// unread payload.
pub struct EventFlag<M: RawMutex, T> {
    state: Mutex<M, Cell<FlagState<T>>>,
}

impl<M: RawMutex, T> EventFlag<M, T> {
    pub const fn new() -> Self {
        EventFlag {
            state: Mutex::new(Cell::new(FlagState::Empty)),
        }
    }

    /// Set the flag, replacing any unread payload. Bounded time, no
    /// blocking; safe to call where a handler must not stall.
    pub fn signal(&self, payload: T) {
        let previous = self
            .state
            .lock(|cell| cell.replace(FlagState::Pending(payload)));
        if let FlagState::Waiting(waker) = previous {
            waker.wake();
        }
    }

    /// Take the pending payload, if any. Non-blocking; meant to be
    /// polled from a loop.
    pub fn drain(&self) -> Option<T> {
        self.state.lock(|cell| match cell.replace(FlagState::Empty) {
            FlagState::Pending(payload) => Some(payload),
            FlagState::Waiting(waker) => {
                cell.set(FlagState::Waiting(waker));
                None
            }
            FlagState::Empty => None,
        })
    }

    /// Wait until the flag is set, then take the payload. For
    /// executor-driven consumers; polling consumers use `drain`.
    pub async fn wait(&self) -> T {
        poll_fn(|cx| {
            let mut displaced = None;
            let result = self.state.lock(|cell| {
                match cell.replace(FlagState::Empty) {
                    FlagState::Pending(payload) => Poll::Ready(payload),
                    FlagState::Waiting(waker) if waker.will_wake(cx.waker()) => {
                        cell.set(FlagState::Waiting(waker));
                        Poll::Pending
                    }
                    FlagState::Waiting(waker) => {
                        // A second consumer showed up; hand the slot to
                        // the most recent one and let the other retry.
                        displaced = Some(waker);
                        cell.set(FlagState::Waiting(cx.waker().clone()));
                        Poll::Pending
                    }
                    FlagState::Empty => {
                        cell.set(FlagState::Waiting(cx.waker().clone()));
                        Poll::Pending
                    }
                }
            });
            if let Some(waker) = displaced {
                waker.wake();
            }
            result
        })
        .await
    }
}

/// A shared event count with the handoff orderings made explicit:
/// increments publish with `Release`, reads observe with `Acquire`.
pub struct EventCounter {
    count: AtomicU32,
}

impl EventCounter {
    pub const fn new() -> Self {
        EventCounter {
            count: AtomicU32::new(0),
        }
    }

    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::Release);
    }

    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Read and reset in one step, so no event is counted twice or
    /// lost between a read and a clear.
    pub fn take(&self) -> u32 {
        self.count.swap(0, Ordering::Acquire)
    }
}

/// A bounded producer/consumer ring. Both ends are non-blocking; a
/// full ring is reported to the producer, which keeps the element and
/// decides what to do with it.
pub struct EventQueue<M: RawMutex, T, const N: usize> {
    items: Mutex<M, RefCell<Deque<T, N>>>,
}

impl<M: RawMutex, T, const N: usize> EventQueue<M, T, N> {
    pub const fn new() -> Self {
        EventQueue {
            items: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Enqueue, or hand the element back when the ring is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.items.lock(|items| items.borrow_mut().push_back(item))
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock(|items| items.borrow_mut().pop_front())
    }

    pub fn len(&self) -> usize {
        self.items.lock(|items| items.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

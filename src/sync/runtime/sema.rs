/*!
 * Semaphore Table
 *
 * Address-keyed counting semaphores for parking mutex waiters.
 *
 * # Design
 *
 * Follows the futex layout: a fixed table of cache-line aligned slots,
 * indexed by hashing the semaphore's address. Several addresses may share a
 * slot; each waiter node remembers its key so a release only ever wakes a
 * waiter of the same semaphore.
 *
 * - The counter itself lives with the caller (`&AtomicU32`), the table only
 *   holds the wait lists.
 * - `nwait` is bumped before the count is re-checked under the slot lock, so
 *   a release that sees `nwait == 0` is guaranteed the acquirer will see its
 *   increment. Releases with no waiters never touch the slot lock.
 * - Each blocked thread parks on its own node address through
 *   `parking_lot_core`, so a wake targets exactly one thread.
 */

use crate::sync::config::SEMA_TABLE_SIZE;
use parking_lot::Mutex;
use parking_lot_core::{park, unpark_one, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use std::collections::VecDeque;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

const NODE_WAITING: u8 = 0;
const NODE_WOKEN: u8 = 1;
/// Woken with the count already transferred; the waiter must not decrement it
const NODE_HANDED_OFF: u8 = 2;

/// One blocked `acquire` call
struct WaitNode {
    key: usize,
    state: AtomicU8,
}

impl WaitNode {
    fn new(key: usize) -> Self {
        Self {
            key,
            state: AtomicU8::new(NODE_WAITING),
        }
    }

    #[inline]
    fn addr(&self) -> usize {
        self as *const WaitNode as usize
    }

    /// Block until a release picks this node
    fn wait(&self) -> u8 {
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state != NODE_WAITING {
                return state;
            }

            // SAFETY: the key is the address of a node we keep alive for the
            // whole call, and the callbacks do not call back into parking_lot.
            unsafe {
                park(
                    self.addr(),
                    || self.state.load(Ordering::Acquire) == NODE_WAITING,
                    || {},
                    |_, _| {},
                    DEFAULT_PARK_TOKEN,
                    None,
                );
            }
        }
    }

    fn wake(&self, state: u8) {
        self.state.store(state, Ordering::Release);
        // SAFETY: same key as `wait`; the releaser holds an Arc to the node.
        unsafe {
            unpark_one(self.addr(), |_| DEFAULT_UNPARK_TOKEN);
        }
    }
}

/// A single table slot with its wait list
#[repr(C, align(64))]
struct SemaSlot {
    nwait: AtomicUsize,
    queue: Mutex<VecDeque<Arc<WaitNode>>>,
}

impl SemaSlot {
    fn new() -> Self {
        Self {
            nwait: AtomicUsize::new(0),
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

/// Process-wide table of semaphore wait lists
pub(crate) struct SemaTable {
    slots: Box<[SemaSlot]>,
    hasher: ahash::RandomState,
}

static TABLE: OnceLock<SemaTable> = OnceLock::new();

/// The table shared by every [`OsRuntime`](super::OsRuntime)
pub(crate) fn table() -> &'static SemaTable {
    TABLE.get_or_init(|| SemaTable::new(SEMA_TABLE_SIZE))
}

#[inline]
fn key_of(sema: &AtomicU32) -> usize {
    sema as *const AtomicU32 as usize
}

/// Decrement the count if it is positive
#[inline]
fn try_acquire(sema: &AtomicU32) -> bool {
    let mut count = sema.load(Ordering::SeqCst);
    while count > 0 {
        match sema.compare_exchange_weak(count, count - 1, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return true,
            Err(actual) => count = actual,
        }
    }
    false
}

impl SemaTable {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            slots: (0..size.max(1)).map(|_| SemaSlot::new()).collect(),
            hasher: ahash::RandomState::new(),
        }
    }

    #[inline]
    fn slot(&self, key: usize) -> &SemaSlot {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        &self.slots[(hasher.finish() as usize) % self.slots.len()]
    }

    /// Wait until `sema` is positive, then decrement it
    ///
    /// `lifo` queues the caller ahead of every waiter already blocked on the
    /// same semaphore.
    pub(crate) fn acquire(&self, sema: &AtomicU32, lifo: bool) {
        if try_acquire(sema) {
            return;
        }

        let key = key_of(sema);
        let slot = self.slot(key);
        let node = Arc::new(WaitNode::new(key));

        loop {
            {
                let mut queue = slot.queue.lock();
                slot.nwait.fetch_add(1, Ordering::SeqCst);
                if try_acquire(sema) {
                    slot.nwait.fetch_sub(1, Ordering::SeqCst);
                    return;
                }

                node.state.store(NODE_WAITING, Ordering::Relaxed);
                if lifo {
                    queue.push_front(Arc::clone(&node));
                } else {
                    queue.push_back(Arc::clone(&node));
                }
            }

            if node.wait() == NODE_HANDED_OFF || try_acquire(sema) {
                return;
            }
        }
    }

    /// Increment `sema` and wake the head waiter, if any
    ///
    /// With `handoff` the increment is consumed on the woken waiter's behalf
    /// before it runs, so a thread that was never queued cannot take it.
    pub(crate) fn release(&self, sema: &AtomicU32, handoff: bool) {
        let key = key_of(sema);
        let slot = self.slot(key);

        sema.fetch_add(1, Ordering::SeqCst);
        if slot.nwait.load(Ordering::SeqCst) == 0 {
            return;
        }

        let (node, state) = {
            let mut queue = slot.queue.lock();
            if slot.nwait.load(Ordering::SeqCst) == 0 {
                return;
            }
            let Some(pos) = queue.iter().position(|n| n.key == key) else {
                return;
            };
            let Some(node) = queue.remove(pos) else {
                return;
            };
            slot.nwait.fetch_sub(1, Ordering::SeqCst);

            let state = if handoff && try_acquire(sema) {
                NODE_HANDED_OFF
            } else {
                NODE_WOKEN
            };
            (node, state)
        };

        node.wake(state);
    }

    /// Number of threads currently queued on `sema`
    #[cfg(test)]
    pub(crate) fn waiters(&self, sema: &AtomicU32) -> usize {
        let key = key_of(sema);
        self.slot(key)
            .queue
            .lock()
            .iter()
            .filter(|n| n.key == key)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for_waiters(table: &SemaTable, sema: &AtomicU32, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while table.waiters(sema) < n {
            assert!(Instant::now() < deadline, "waiters never queued");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_acquire_consumes_available_count() {
        let table = SemaTable::new(7);
        let sema = AtomicU32::new(2);

        table.acquire(&sema, false);
        table.acquire(&sema, false);
        assert_eq!(sema.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_release_without_waiters_banks_count() {
        let table = SemaTable::new(7);
        let sema = AtomicU32::new(0);

        table.release(&sema, false);
        table.release(&sema, true);
        assert_eq!(sema.load(Ordering::SeqCst), 2);
        assert_eq!(table.waiters(&sema), 0);
    }

    #[test]
    fn test_release_wakes_blocked_acquirer() {
        let table = Arc::new(SemaTable::new(7));
        let sema = Arc::new(AtomicU32::new(0));

        let handle = {
            let (table, sema) = (table.clone(), sema.clone());
            thread::spawn(move || table.acquire(&sema, false))
        };

        wait_for_waiters(&table, &sema, 1);
        table.release(&sema, false);

        handle.join().unwrap();
        assert_eq!(sema.load(Ordering::SeqCst), 0);
        assert_eq!(table.waiters(&sema), 0);
    }

    #[test]
    fn test_handoff_transfers_count_directly() {
        let table = Arc::new(SemaTable::new(7));
        let sema = Arc::new(AtomicU32::new(0));

        let handle = {
            let (table, sema) = (table.clone(), sema.clone());
            thread::spawn(move || table.acquire(&sema, false))
        };

        wait_for_waiters(&table, &sema, 1);
        table.release(&sema, true);
        // The count never becomes visible to a would-be thief
        assert_eq!(sema.load(Ordering::SeqCst), 0);

        handle.join().unwrap();
        assert_eq!(sema.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lifo_waiter_jumps_the_queue() {
        let table = Arc::new(SemaTable::new(7));
        let sema = Arc::new(AtomicU32::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let spawn = |id: u32, lifo: bool| {
            let (table, sema, order) = (table.clone(), sema.clone(), order.clone());
            thread::spawn(move || {
                table.acquire(&sema, lifo);
                order.lock().push(id);
            })
        };

        let first = spawn(1, false);
        wait_for_waiters(&table, &sema, 1);
        let second = spawn(2, false);
        wait_for_waiters(&table, &sema, 2);
        let third = spawn(3, true);
        wait_for_waiters(&table, &sema, 3);

        for _ in 0..3 {
            table.release(&sema, true);
            let woken = order.lock().len();
            let deadline = Instant::now() + Duration::from_secs(5);
            while order.lock().len() == woken {
                assert!(Instant::now() < deadline, "handoff did not wake anyone");
                thread::sleep(Duration::from_millis(1));
            }
        }

        for handle in [first, second, third] {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![3, 1, 2]);
    }

    #[test]
    fn test_shared_slot_wakes_matching_key_only() {
        // A single slot forces both semaphores into the same wait list
        let table = Arc::new(SemaTable::new(1));
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));

        let waiter_a = {
            let (table, a) = (table.clone(), a.clone());
            thread::spawn(move || table.acquire(&a, false))
        };
        wait_for_waiters(&table, &a, 1);

        table.release(&b, false);
        assert_eq!(table.waiters(&a), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);

        table.release(&a, false);
        waiter_a.join().unwrap();
    }
}

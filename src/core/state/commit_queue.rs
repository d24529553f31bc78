//=========================================================================
// Commit Queue
//=========================================================================
//
// FIFO gate that serializes stack mutations across navigation calls.
//
// Each call takes a numbered ticket when it starts. The ticket's turn
// comes once every lower number has finished (turn dropped) or been
// abandoned (ticket dropped). Work done before waiting for the turn, such
// as bundle loading, overlaps freely with earlier calls.
//
//   enqueue() ──> CommitTicket ──turn().await──> CommitTurn ──drop──> next ticket
//
// Only the ticket being served is woken; finished numbers are skipped in
// a loop.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

//=== QueueState ==========================================================

#[derive(Default)]
struct QueueState {
    /// Number handed to the next ticket.
    next: u64,

    /// Number whose turn it is.
    serving: u64,

    /// Numbers already done but not yet reached by `serving`.
    finished: BTreeSet<u64>,

    /// Tickets parked in `turn()`, keyed by number.
    waiters: HashMap<u64, oneshot::Sender<()>>,

    pending: usize,
}

impl QueueState {
    fn advance(&mut self) {
        while self.finished.remove(&self.serving) {
            self.serving += 1;
        }

        if let Some(waiter) = self.waiters.remove(&self.serving) {
            let _ = waiter.send(());
        }
    }
}

/// One number in the queue; marks it finished when dropped.
struct Place {
    number: u64,
    state: Arc<Mutex<QueueState>>,
}

impl Drop for Place {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        state.waiters.remove(&self.number);
        state.finished.insert(self.number);
        state.advance();
    }
}

//=== CommitQueue =========================================================

/// Hands out tickets that get their turn in the order they were taken.
pub(crate) struct CommitQueue {
    state: Arc<Mutex<QueueState>>,
}

impl CommitQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// Takes the next ticket in line.
    pub(crate) fn enqueue(&self) -> CommitTicket {
        let mut state = self.state.lock();
        self.push_ticket(&mut state)
    }

    /// Takes a ticket only if no other ticket is outstanding.
    pub(crate) fn enqueue_if_idle(&self) -> Option<CommitTicket> {
        let mut state = self.state.lock();
        if state.pending > 0 {
            return None;
        }
        Some(self.push_ticket(&mut state))
    }

    /// Tickets taken but not yet finished or abandoned.
    pub(crate) fn pending(&self) -> usize {
        self.state.lock().pending
    }

    fn push_ticket(&self, state: &mut QueueState) -> CommitTicket {
        let number = state.next;
        state.next += 1;
        state.pending += 1;

        CommitTicket {
            place: Place {
                number,
                state: Arc::clone(&self.state),
            },
        }
    }
}

//=== CommitTicket ========================================================

/// A place in the commit queue.
///
/// Dropping the ticket without taking the turn gives up the place
/// without blocking later tickets.
pub(crate) struct CommitTicket {
    place: Place,
}

impl CommitTicket {
    /// Waits until every earlier ticket is finished.
    pub(crate) async fn turn(self) -> CommitTurn {
        let place = self.place;

        loop {
            let wake = {
                let mut state = place.state.lock();
                if state.serving == place.number {
                    None
                } else {
                    let (waiter, wake) = oneshot::channel();
                    state.waiters.insert(place.number, waiter);
                    Some(wake)
                }
            };

            match wake {
                None => return CommitTurn { _place: place },
                Some(wake) => {
                    let _ = wake.await;
                }
            }
        }
    }
}

//=== CommitTurn ==========================================================

/// Exclusive right to mutate the stack; released on drop.
pub(crate) struct CommitTurn {
    _place: Place,
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_ticket_gets_turn_immediately() {
        let queue = CommitQueue::new();
        let ticket = queue.enqueue();
        let _turn = ticket.turn().await;
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn turns_follow_ticket_order() {
        let queue = Arc::new(CommitQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = queue.enqueue();
        let second = queue.enqueue();
        let third = queue.enqueue();

        let spawn = |ticket: CommitTicket, label: u32, hold: u64| {
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _turn = ticket.turn().await;
                order.lock().push(label);
                tokio::time::sleep(Duration::from_millis(hold)).await;
            })
        };

        // Spawned in reverse so scheduling order cannot explain the result
        let c = spawn(third, 3, 1);
        let b = spawn(second, 2, 5);
        let a = spawn(first, 1, 10);

        for task in [a, b, c] {
            task.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![1, 2, 3]);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn abandoned_ticket_does_not_block_later_ones() {
        let queue = CommitQueue::new();

        let abandoned = queue.enqueue();
        let next = queue.enqueue();
        drop(abandoned);

        let _turn = next.turn().await;
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_ticket_still_waits_for_earlier_turn() {
        let queue = CommitQueue::new();

        let holder = queue.enqueue().turn().await;
        let abandoned = queue.enqueue();
        let waiting = queue.enqueue();
        drop(abandoned);

        let blocked = tokio::time::timeout(Duration::from_millis(10), waiting.turn()).await;
        assert!(blocked.is_err());
        drop(holder);

        // A fresh ticket lands after everything above has settled
        let _turn = queue.enqueue().turn().await;
    }

    #[test]
    fn enqueue_if_idle_refuses_while_pending() {
        let queue = CommitQueue::new();
        let ticket = queue.enqueue_if_idle();
        assert!(ticket.is_some());
        assert!(queue.enqueue_if_idle().is_none());

        drop(ticket);
        assert!(queue.enqueue_if_idle().is_some());
    }

    #[tokio::test]
    async fn long_queue_is_served_in_order() {
        const TICKETS: u32 = 10_000;

        let queue = CommitQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let holder = queue.enqueue().turn().await;

        let tasks: Vec<_> = (0..TICKETS)
            .map(|label| {
                let ticket = queue.enqueue();
                let order = Arc::clone(&order);
                tokio::spawn(async move {
                    let _turn = ticket.turn().await;
                    order.lock().push(label);
                })
            })
            .collect();

        tokio::task::yield_now().await;
        drop(holder);

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*order.lock(), (0..TICKETS).collect::<Vec<_>>());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn long_run_of_abandoned_tickets_is_skipped() {
        let queue = CommitQueue::new();
        let holder = queue.enqueue().turn().await;

        let abandoned: Vec<_> = (0..10_000).map(|_| queue.enqueue()).collect();
        let last = queue.enqueue();
        drop(abandoned);
        drop(holder);

        let _turn = last.turn().await;
        assert_eq!(queue.pending(), 1);
    }
}

use crate::event::Message;
use std::{cmp::Ordering, collections::BinaryHeap};

/// Min-ordered queue over `(time, -priority, seq)`.
///
/// Earlier times pop first; at equal times higher priority pops first; at equal
/// priority the earlier sequence wins (FIFO). `push` and `pop` are both O(log n).
#[derive(Debug, Default)]
pub struct PriorityMessageQueue {
    heap: BinaryHeap<QueuedMessage>,
}

impl PriorityMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.heap.push(QueuedMessage(message));
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.heap.pop().map(|queued| queued.0)
    }

    pub fn peek(&self) -> Option<&Message> {
        self.heap.peek().map(|queued| &queued.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Wrapper inverting [`BinaryHeap`]'s max-ordering into the queue's dispatch order.
#[derive(Debug)]
struct QueuedMessage(Message);

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap max is the earliest (time, -priority, seq) key
        let this = (self.0.time, std::cmp::Reverse(self.0.priority), self.0.seq);
        let that = (
            other.0.time,
            std::cmp::Reverse(other.0.priority),
            other.0.seq,
        );
        that.cmp(&this)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Sequence};
    use chrono::NaiveDate;

    fn at(minute: u32, priority: u8, seq: u64) -> Message {
        let time = NaiveDate::from_ymd_opt(2024, 6, 12)
            .unwrap()
            .and_hms_opt(9, minute, 0)
            .unwrap();
        Message::new(time, priority, Sequence(seq), Event::EveryMinute { time })
    }

    #[test]
    fn test_orders_by_time_then_priority_then_seq() {
        let mut queue = PriorityMessageQueue::new();
        queue.push(at(31, 10, 3));
        queue.push(at(30, 0, 2));
        queue.push(at(30, 30, 1));
        queue.push(at(30, 30, 0));

        let popped: Vec<(u32, u8, u64)> = std::iter::from_fn(|| queue.pop())
            .map(|message| {
                (
                    chrono::Timelike::minute(&message.time),
                    message.priority,
                    message.seq.value(),
                )
            })
            .collect();

        assert_eq!(popped, vec![(30, 30, 0), (30, 30, 1), (30, 0, 2), (31, 10, 3)]);
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = PriorityMessageQueue::new();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
        queue.push(at(30, 0, 0));
        assert_eq!(queue.len(), 1);
        assert!(queue.peek().is_some());
    }
}

//! Outbound send queue: FIFO order, structural deduplication.

use crate::replication::types::Message;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct SendQueue {
    order: VecDeque<Message>,
    members: HashSet<Message>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message unless an identical one is already waiting.
    pub fn push(&mut self, msg: Message) -> bool {
        if !self.members.insert(msg.clone()) {
            return false;
        }
        self.order.push_back(msg);
        true
    }

    /// Withdraw a waiting message. Returns whether it was queued.
    pub fn remove(&mut self, msg: &Message) -> bool {
        if !self.members.remove(msg) {
            return false;
        }
        if let Some(idx) = self.order.iter().position(|queued| queued == msg) {
            self.order.remove(idx);
        }
        true
    }

    /// Take the oldest waiting message.
    pub fn pop_front(&mut self) -> Option<Message> {
        let msg = self.order.pop_front()?;
        self.members.remove(&msg);
        Some(msg)
    }

    pub fn contains(&self, msg: &Message) -> bool {
        self.members.contains(msg)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Snapshot of waiting messages, oldest first.
    pub fn to_vec(&self) -> Vec<Message> {
        self.order.iter().cloned().collect()
    }
}

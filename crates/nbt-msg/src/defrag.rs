//! Reassembly pool for fragmented NBT Datagram Service messages.
//!
//! This is the only stateful subsystem in the library: every other
//! codec is a pure function of its input bytes. Fragments that share
//! message type, Sending Node Type, datagram ID, source address/port
//! and calling/called names are grouped into a set; a set completes
//! (and is removed from the pool) once its fragments cover the payload
//! from offset zero to a fragment with no further continuation.
//!
//! Idle sets are evicted lazily: each call to [`Defrag::add_fragment`]
//! checks up to `check_count` of the least-recently-used sets and
//! drops any that have been idle longer than `timeout`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::dgram::{Datagram, DirectKind, Fragment, SendingNodeType};

const DEFAULT_TIMEOUT_MS: u64 = 5000;
const MIN_TIMEOUT_MS: u64 = 250;
const MAX_TIMEOUT_MS: u64 = 0xFFFF;
const DEFAULT_CHECK_COUNT: usize = 2;

/// One ordered, non-overlapping span of payload bytes contributed by
/// one or more merged fragments: `(offset, next_offset, bytes)`.
/// `next_offset == 0` marks the span as the terminal one (no `More`
/// flag was set on the fragment that produced it).
type FragSpan = (u16, u16, Vec<u8>);

struct FragSet {
    key: Key,
    kind: DirectKind,
    snt: SendingNodeType,
    dgm_id: u16,
    src_ip: std::net::Ipv4Addr,
    src_port: u16,
    src_name: Vec<u8>,
    dst_name: Vec<u8>,
    spans: Vec<FragSpan>,
    touched: Instant,
}

enum AddOutcome {
    Pending,
    Collision,
    Complete(Datagram),
}

impl FragSet {
    fn add(&mut self, frag: Fragment) -> AddOutcome {
        if frag.payload.is_empty() {
            return AddOutcome::Pending;
        }
        let next = if frag.more { frag.pkt_offset + frag.payload.len() as u16 } else { 0 };
        let mut span: FragSpan = (frag.pkt_offset, next, frag.payload);

        let i = self.spans.partition_point(|s| s.0 < span.0);

        if i < self.spans.len() {
            if span.1 == self.spans[i].0 {
                let right = self.spans.remove(i);
                span = (span.0, right.1, [span.2, right.2].concat());
            } else if span.1 == 0 || span.1 > self.spans[i].0 {
                return AddOutcome::Collision;
            }
        }

        if i > 0 {
            let left_next = self.spans[i - 1].1;
            if left_next == span.0 {
                let left = self.spans.remove(i - 1);
                span = (left.0, span.1, [left.2, span.2].concat());
            } else if left_next == 0 || left_next > span.0 {
                return AddOutcome::Collision;
            }
        }

        if span.0 == 0 && span.1 == 0 {
            return AddOutcome::Complete(Datagram {
                kind: self.kind,
                snt: self.snt,
                dgm_id: self.dgm_id,
                src_ip: self.src_ip,
                src_port: self.src_port,
                src_name: self.src_name.clone(),
                dst_name: self.dst_name.clone(),
                payload: span.2,
            });
        }

        let pos = self.spans.partition_point(|s| s.0 < span.0);
        self.spans.insert(pos, span);
        self.touched = Instant::now();
        AddOutcome::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    msg_type: u8,
    snt: u8,
    dgm_id: u16,
    src_ip: std::net::Ipv4Addr,
    src_port: u16,
    src_name: Vec<u8>,
    dst_name: Vec<u8>,
}

impl Key {
    fn of(frag: &Fragment) -> Self {
        Self {
            msg_type: match frag.kind {
                DirectKind::Unique => 0x10,
                DirectKind::Group => 0x11,
                DirectKind::Broadcast => 0x12,
            },
            snt: frag.snt as u8,
            dgm_id: frag.dgm_id,
            src_ip: frag.src_ip,
            src_port: frag.src_port,
            src_name: frag.src_name.clone(),
            dst_name: frag.dst_name.clone(),
        }
    }
}

struct Slot {
    set: FragSet,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fragment reassembly pool, keyed on matching message metadata and
/// ordered least- to most-recently-used via an intrusive slab list (no
/// `Rc<RefCell<_>>` needed: slots are addressed by index).
pub struct Defrag {
    timeout: Duration,
    check_count: usize,
    index: HashMap<Key, usize>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Default for Defrag {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS, DEFAULT_CHECK_COUNT)
    }
}

impl Defrag {
    /// `timeout_ms` is clamped to `250..=65535`.
    pub fn new(timeout_ms: u64, check_count: usize) -> Self {
        let clamped = timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        Self {
            timeout: Duration::from_millis(clamped),
            check_count,
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    /// Add a received fragment to the pool. Returns the reassembled
    /// message if this fragment completed it; the completed set is
    /// then removed from the pool. Returns `None` if the fragment was
    /// stored (or silently discarded for being an invalid/colliding
    /// addition to its set, which evicts the whole set).
    pub fn add_fragment(&mut self, frag: Fragment) -> Option<Datagram> {
        let key = Key::of(&frag);
        let result = if let Some(&slot_idx) = self.index.get(&key) {
            self.unlink(slot_idx);
            let set = &mut self.slots[slot_idx].as_mut().unwrap().set;
            match set.add(frag) {
                AddOutcome::Pending => {
                    self.push_front(slot_idx);
                    None
                }
                AddOutcome::Collision => {
                    self.index.remove(&key);
                    self.release(slot_idx);
                    None
                }
                AddOutcome::Complete(msg) => {
                    self.index.remove(&key);
                    self.release(slot_idx);
                    Some(msg)
                }
            }
        } else {
            let mut set = FragSet {
                key: key.clone(),
                kind: frag.kind,
                snt: frag.snt,
                dgm_id: frag.dgm_id,
                src_ip: frag.src_ip,
                src_port: frag.src_port,
                src_name: frag.src_name.clone(),
                dst_name: frag.dst_name.clone(),
                spans: Vec::new(),
                touched: Instant::now(),
            };
            match set.add(frag) {
                AddOutcome::Complete(msg) => Some(msg),
                _ => {
                    let slot_idx = self.alloc(set);
                    self.index.insert(key, slot_idx);
                    self.push_front(slot_idx);
                    None
                }
            }
        };

        let mut checks = self.check_count;
        while checks > 0 && self.check_timeout() {
            checks -= 1;
        }
        result
    }

    /// Check the least-recently-used set and evict it if it has been
    /// idle longer than `timeout`. Returns whether a set was evicted.
    pub fn check_timeout(&mut self) -> bool {
        let Some(tail_idx) = self.tail else { return false };
        let expired = self.slots[tail_idx]
            .as_ref()
            .is_some_and(|slot| slot.set.touched.elapsed() > self.timeout);
        if expired {
            let key = self.slots[tail_idx].as_ref().unwrap().set.key.clone();
            self.index.remove(&key);
            self.unlink(tail_idx);
            self.release(tail_idx);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn alloc(&mut self, set: FragSet) -> usize {
        let slot = Slot { set, prev: None, next: None };
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    fn release(&mut self, idx: usize) {
        self.slots[idx] = None;
        self.free.push(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = self.slots[idx].as_ref().unwrap();
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        let slot = self.slots[idx].as_mut().unwrap();
        slot.prev = None;
        slot.next = None;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(h) = old_head {
            self.slots[h].as_mut().unwrap().prev = Some(idx);
        }
        let slot = self.slots[idx].as_mut().unwrap();
        slot.next = old_head;
        slot.prev = None;
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dgram::{DirectKind, SendingNodeType};
    use std::net::Ipv4Addr;

    fn frag(offset: u16, more: bool, data: &[u8]) -> Fragment {
        Fragment {
            kind: DirectKind::Group,
            snt: SendingNodeType::B,
            dgm_id: 26,
            src_ip: Ipv4Addr::new(172, 18, 0, 1),
            src_port: 138,
            first: offset == 0,
            more,
            pkt_offset: offset,
            src_name: b"srcname".to_vec(),
            dst_name: b"dstname".to_vec(),
            payload: data.to_vec(),
        }
    }

    #[test]
    fn two_in_order_fragments_complete_the_message() {
        let mut pool = Defrag::default();
        assert!(pool.add_fragment(frag(0, true, b"hello ")).is_none());
        let msg = pool.add_fragment(frag(6, false, b"world")).unwrap();
        assert_eq!(msg.payload, b"hello world");
        assert!(pool.is_empty());
    }

    #[test]
    fn out_of_order_fragments_still_complete() {
        let mut pool = Defrag::default();
        assert!(pool.add_fragment(frag(6, false, b"world")).is_none());
        let msg = pool.add_fragment(frag(0, true, b"hello ")).unwrap();
        assert_eq!(msg.payload, b"hello world");
    }

    #[test]
    fn three_fragments_reassemble_out_of_order() {
        let mut pool = Defrag::default();
        assert!(pool.add_fragment(frag(0, true, b"abc")).is_none());
        assert!(pool.add_fragment(frag(6, false, b"ghi")).is_none());
        let msg = pool.add_fragment(frag(3, true, b"def")).unwrap();
        assert_eq!(msg.payload, b"abcdefghi");
    }

    #[test]
    fn unrelated_fragment_sets_stay_independent() {
        let mut pool = Defrag::default();
        let mut other = frag(0, true, b"x");
        other.dgm_id = 99;
        pool.add_fragment(other);
        pool.add_fragment(frag(0, true, b"y"));
        assert_eq!(pool.len(), 2);
    }
}

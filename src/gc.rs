// ABOUTME: Mark-and-sweep garbage collector over an open-addressed allocation set

use crate::heap::{HeapObj, RuntimeMap};
use crate::value::{
    Value, LIST_BITS, MAP_BITS, PAYLOAD_MASK, PROC_BITS, STRING_BITS, VECTOR_BITS,
};

/// Collection triggers once live allocations exceed this. A prime, so
/// it also serves as the initial capacity of the allocation set.
pub const GC_INITIAL_THRESHOLD: usize = 1069;

const FLAG_MARKED: u8 = 1 << 0;
/// Pinned objects are never swept: interned strings, compile-time
/// data literals and procedure objects referenced from bytecode.
const FLAG_PINNED: u8 = 1 << 1;

#[derive(Debug, Clone)]
struct GcObj {
    bits: u64,
    flags: u8,
    obj: HeapObj,
}

/// Every live allocation, keyed by the boxed bit pattern of the value
/// that points at it. Linear probing, doubling at 70% load.
#[derive(Debug)]
pub struct Gc {
    slots: Vec<Option<GcObj>>,
    len: usize,
    next_handle: u64,
    threshold: usize,
}

impl Default for Gc {
    fn default() -> Self {
        Self::new()
    }
}

impl Gc {
    pub fn new() -> Self {
        Self::with_threshold(GC_INITIAL_THRESHOLD)
    }

    pub fn with_threshold(threshold: usize) -> Self {
        Gc {
            slots: new_slots(GC_INITIAL_THRESHOLD),
            len: 0,
            next_handle: 0,
            threshold,
        }
    }

    /// Number of live allocations (pinned included).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn should_collect(&self) -> bool {
        self.len > self.threshold
    }

    pub fn alloc(&mut self, obj: HeapObj) -> Value {
        self.alloc_flags(obj, 0)
    }

    pub fn alloc_pinned(&mut self, obj: HeapObj) -> Value {
        self.alloc_flags(obj, FLAG_PINNED)
    }

    fn alloc_flags(&mut self, obj: HeapObj, flags: u8) -> Value {
        let tag_bits = match obj {
            HeapObj::Str(_) => STRING_BITS,
            HeapObj::Vector(_) => VECTOR_BITS,
            HeapObj::List(_) => LIST_BITS,
            HeapObj::Map(_) => MAP_BITS,
            HeapObj::Proc(_) => PROC_BITS,
        };
        self.next_handle += 1;
        let bits = tag_bits | (self.next_handle & PAYLOAD_MASK);
        self.insert(GcObj { bits, flags, obj });
        Value::from_bits(bits)
    }

    pub fn get(&self, value: Value) -> Option<&HeapObj> {
        self.find_index(value.bits())
            .and_then(|i| self.slots[i].as_ref())
            .map(|o| &o.obj)
    }

    pub fn get_mut(&mut self, value: Value) -> Option<&mut HeapObj> {
        let idx = self.find_index(value.bits())?;
        self.slots[idx].as_mut().map(|o| &mut o.obj)
    }

    /// Move the map out of the set so callers can hash keys against
    /// the rest of the heap while mutating it; `put_map` restores it.
    pub fn take_map(&mut self, value: Value) -> Option<RuntimeMap> {
        match self.get_mut(value) {
            Some(HeapObj::Map(map)) => Some(std::mem::take(map)),
            _ => None,
        }
    }

    pub fn put_map(&mut self, value: Value, map: RuntimeMap) {
        if let Some(HeapObj::Map(slot)) = self.get_mut(value) {
            *slot = map;
        }
    }

    /// Mark everything reachable from the roots (plus the pinned
    /// set), then sweep the rest. Marks are cleared for the next
    /// cycle. The object graph is acyclic by construction, but marks
    /// already stop re-traversal of shared subtrees.
    pub fn collect<I>(&mut self, roots: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let mut worklist: Vec<Value> = roots.into_iter().filter(|v| v.is_heap()).collect();
        for slot in &self.slots {
            if let Some(obj) = slot {
                if obj.flags & FLAG_PINNED != 0 {
                    worklist.push(Value::from_bits(obj.bits));
                }
            }
        }

        while let Some(value) = worklist.pop() {
            let Some(idx) = self.find_index(value.bits()) else {
                continue;
            };
            let Some(obj) = self.slots[idx].as_mut() else {
                continue;
            };
            if obj.flags & FLAG_MARKED != 0 {
                continue;
            }
            obj.flags |= FLAG_MARKED;

            match &obj.obj {
                HeapObj::Vector(items) | HeapObj::List(items) => {
                    worklist.extend(items.iter().copied().filter(|v| v.is_heap()));
                }
                HeapObj::Map(map) => {
                    for (k, v) in map.iter() {
                        if k.is_heap() {
                            worklist.push(k);
                        }
                        if v.is_heap() {
                            worklist.push(v);
                        }
                    }
                }
                // Strings are terminal; a procedure's parameters are
                // interned (pinned) strings.
                HeapObj::Str(_) | HeapObj::Proc(_) => {}
            }
        }

        self.sweep();
    }

    fn sweep(&mut self) {
        let cap = self.slots.len();
        let old = std::mem::replace(&mut self.slots, new_slots(cap));
        self.len = 0;
        for slot in old {
            if let Some(mut obj) = slot {
                if obj.flags & (FLAG_MARKED | FLAG_PINNED) != 0 {
                    obj.flags &= !FLAG_MARKED;
                    self.insert(obj);
                }
            }
        }
    }

    fn insert(&mut self, obj: GcObj) {
        if (self.len + 1) * 100 >= self.slots.len() * 70 {
            self.grow();
        }

        let cap = self.slots.len() as u64;
        let mut idx = (obj.bits % cap) as usize;
        while self.slots[idx].is_some() {
            idx = (idx + 1) % cap as usize;
        }
        self.slots[idx] = Some(obj);
        self.len += 1;
    }

    fn grow(&mut self) {
        let new_len = self.slots.len() * 2;
        let old = std::mem::replace(&mut self.slots, new_slots(new_len));
        self.len = 0;
        for slot in old.into_iter().flatten() {
            self.insert(slot);
        }
    }

    fn find_index(&self, bits: u64) -> Option<usize> {
        let cap = self.slots.len() as u64;
        let mut idx = (bits % cap) as usize;
        loop {
            match &self.slots[idx] {
                Some(obj) if obj.bits == bits => return Some(idx),
                Some(_) => idx = (idx + 1) % cap as usize,
                None => return None,
            }
        }
    }
}

fn new_slots(cap: usize) -> Vec<Option<GcObj>> {
    (0..cap.max(8)).map(|_| None).collect()
}

// ABOUTME: Heap-resident runtime objects plus the language-level equality, hashing and printing over them

use crate::bytecode::Code;
use crate::error::RuntimeError;
use crate::gc::Gc;
use crate::value::Value;
use crate::vm::Vm;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

/// Signature of a native procedure: it pops its own arguments from
/// the VM's current frame and returns the value to push.
pub type NativeFn = fn(&mut Vm, u16) -> Result<Value, RuntimeError>;

/// Formal parameters of a compiled procedure or macro. The names are
/// interned strings. The variadic flag is carried through but nothing
/// sets it yet.
#[derive(Debug, Clone)]
pub struct Params {
    pub names: Vec<Value>,
    pub variadic: bool,
}

impl Params {
    pub fn new(names: Vec<Value>) -> Self {
        Params {
            names,
            variadic: false,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A callable: either bytecode living in the shared procedure buffer
/// (entered at `label`), or a native function.
#[derive(Clone)]
pub enum Proc {
    Bytecode {
        params: Params,
        code: Rc<RefCell<Code>>,
        label: usize,
    },
    Native {
        name: &'static str,
        func: NativeFn,
    },
}

impl std::fmt::Debug for Proc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Proc::Bytecode { params, label, .. } => f
                .debug_struct("Bytecode")
                .field("params", &params.len())
                .field("label", label)
                .finish(),
            Proc::Native { name, .. } => f.debug_struct("Native").field("name", name).finish(),
        }
    }
}

/// Hash table from Value to Value using the language's own equality
/// and hashing. Iteration order is bucket order, which is what the
/// printer exposes.
#[derive(Debug, Clone)]
pub struct RuntimeMap {
    buckets: Vec<Vec<(Value, Value)>>,
    len: usize,
}

impl Default for RuntimeMap {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl RuntimeMap {
    pub fn with_capacity(pairs: usize) -> Self {
        RuntimeMap {
            buckets: vec![Vec::new(); pairs.max(4)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.buckets.iter().flatten().copied()
    }
}

/// Every GC-managed object. Strings own their byte buffer; lists are
/// fixed after construction while vectors may grow.
#[derive(Debug, Clone)]
pub enum HeapObj {
    Str(String),
    Vector(Vec<Value>),
    List(Vec<Value>),
    Map(RuntimeMap),
    Proc(Proc),
}

// ============================================================================
// Map operations
// ============================================================================
//
// The map lives inside the GC while hashing its keys needs to read
// other heap objects, so the map is taken out for the duration of the
// operation and put back afterwards.

pub fn map_insert(gc: &mut Gc, map_value: Value, key: Value, value: Value) {
    let Some(mut map) = gc.take_map(map_value) else {
        return;
    };

    if map.len + 1 > map.buckets.len() * 3 / 4 {
        let new_cap = map.buckets.len() * 2;
        map = rehash(gc, map, new_cap);
    }

    let idx = (value_hash(gc, key) % map.buckets.len() as u64) as usize;
    let bucket = &mut map.buckets[idx];
    let mut replaced = false;
    for entry in bucket.iter_mut() {
        if value_eq(gc, entry.0, key) {
            entry.1 = value;
            replaced = true;
            break;
        }
    }
    if !replaced {
        bucket.push((key, value));
        map.len += 1;
    }

    gc.put_map(map_value, map);
}

pub fn map_find(gc: &Gc, map_value: Value, key: Value) -> Option<Value> {
    let Some(HeapObj::Map(map)) = gc.get(map_value) else {
        return None;
    };
    let idx = (value_hash(gc, key) % map.buckets.len() as u64) as usize;
    map.buckets[idx]
        .iter()
        .find(|(k, _)| value_eq(gc, *k, key))
        .map(|(_, v)| *v)
}

fn rehash(gc: &Gc, map: RuntimeMap, new_cap: usize) -> RuntimeMap {
    let mut grown = RuntimeMap {
        buckets: vec![Vec::new(); new_cap.max(4)],
        len: map.len,
    };
    for (k, v) in map.iter() {
        let idx = (value_hash(gc, k) % grown.buckets.len() as u64) as usize;
        grown.buckets[idx].push((k, v));
    }
    grown
}

// ============================================================================
// Structural equality and hashing
// ============================================================================

/// Structural equality: numbers compare as doubles (NaN equals NaN),
/// strings by bytes, vectors and lists pairwise, maps and procs by
/// identity.
pub fn value_eq(gc: &Gc, a: Value, b: Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x == y || (x.is_nan() && y.is_nan());
    }
    if a.as_number().is_some() != b.as_number().is_some() {
        return false;
    }
    if a.tag() != b.tag() {
        return false;
    }

    match (gc.get(a), gc.get(b)) {
        (Some(HeapObj::Str(x)), Some(HeapObj::Str(y))) => x == y,
        (Some(HeapObj::Vector(x)), Some(HeapObj::Vector(y)))
        | (Some(HeapObj::List(x)), Some(HeapObj::List(y))) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| value_eq(gc, *l, *r))
        }
        // Maps and procedures compare by identity; so do the singletons.
        _ => a.bits() == b.bits(),
    }
}

pub fn hash_djb2(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &byte in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(u64::from(byte));
    }
    hash
}

/// Hash consistent with `value_eq`: strings use djb2 over their
/// bytes, numbers their bit pattern, sequences the sum of their
/// element hashes, maps the sum over occupied buckets.
pub fn value_hash(gc: &Gc, value: Value) -> u64 {
    match gc.get(value) {
        Some(HeapObj::Str(s)) => hash_djb2(s.as_bytes()),
        Some(HeapObj::Vector(items)) | Some(HeapObj::List(items)) => items
            .iter()
            .fold(0u64, |acc, v| acc.wrapping_add(value_hash(gc, *v))),
        Some(HeapObj::Map(map)) => map.iter().fold(0u64, |acc, (k, v)| {
            acc.wrapping_add(value_hash(gc, k))
                .wrapping_add(value_hash(gc, v))
        }),
        _ => value.bits(),
    }
}

// ============================================================================
// Printing
// ============================================================================

/// Render a value the way `print` and the REPL echo show it.
pub fn value_to_string(gc: &Gc, value: Value) -> String {
    let mut out = String::new();
    write_value(gc, &mut out, value);
    out
}

pub fn write_value(gc: &Gc, out: &mut String, value: Value) {
    if value.is_true() {
        out.push_str("true");
        return;
    }
    if value.is_false() {
        out.push_str("false");
        return;
    }
    if value.is_nil() {
        out.push_str("nil");
        return;
    }
    if value.is_int() {
        let _ = write!(out, "{}", value.as_int());
        return;
    }
    if value.is_double() {
        let x = value.as_f64();
        // Whole doubles print without a decimal part.
        if x.fract() == 0.0 && x.is_finite() {
            let _ = write!(out, "{}", x as i64);
        } else {
            let _ = write!(out, "{}", x);
        }
        return;
    }

    match gc.get(value) {
        Some(HeapObj::Str(s)) => {
            let _ = write!(out, "\"{}\"", s);
        }
        Some(HeapObj::Vector(items)) => write_seq(gc, out, items, "[", "]"),
        Some(HeapObj::List(items)) => write_seq(gc, out, items, "(", ")"),
        Some(HeapObj::Map(map)) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(gc, out, k);
                out.push(' ');
                write_value(gc, out, v);
            }
            out.push('}');
        }
        Some(HeapObj::Proc(Proc::Bytecode { label, .. })) => {
            let _ = write!(out, "<proc at ip {}>", label);
        }
        Some(HeapObj::Proc(Proc::Native { name, .. })) => {
            let _ = write!(out, "<native proc {}>", name);
        }
        None => out.push_str("<dangling>"),
    }
}

fn write_seq(gc: &Gc, out: &mut String, items: &[Value], open: &str, close: &str) {
    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_value(gc, out, *item);
    }
    out.push_str(close);
}

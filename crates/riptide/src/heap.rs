//! Reference-counted arena for all heap-allocated runtime data.
//!
//! Objects, arrays, functions, promises, generator frames, and environments
//! all live in one arena of slots addressed by [`HeapId`]. Slots carry a
//! reference count; freed slots go on a free list for reuse. Values and heap
//! records own their references explicitly: cloning a `Value::Ref` increments
//! the count via `clone_with_heap`, and containers release their children
//! when their own count reaches zero.
//!
//! Dropping children is iterative (a worklist), so deeply nested structures
//! cannot overflow the Rust stack on release. Reference cycles (prototype
//! loops, mutually capturing closures) are reclaimed wholesale when the
//! engine is dropped; the arena itself owns every slot.

use crate::{
    env::ScopeRecord,
    irvm::FrameCell,
    object::{JsArray, PropTable},
    promise::{GroupRecord, JsPromise},
    types::{date::JsDate, function::JsFunction, generator::JsGenerator, regex::JsRegex},
    value::Value,
};

/// Index of a live heap slot.
///
/// `u32` keeps `Value` small; four billion live objects is far beyond any
/// sandboxed program this engine hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct HeapId(u32);

impl HeapId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Heap-allocated runtime data.
#[derive(Debug)]
pub(crate) enum HeapData {
    /// A runtime-computed string (literals stay interned).
    Str(Box<str>),
    /// A plain object: property table + prototype link.
    Object(PropTable),
    /// An array: dense elements plus a property table.
    Array(JsArray),
    /// Any callable: script functions, engine builtins, host natives,
    /// promise resolvers.
    Function(JsFunction),
    /// A compiled `RegExp`.
    Regex(JsRegex),
    /// A `Date` instance: epoch milliseconds plus a property table.
    Date(JsDate),
    /// A promise: state, reaction lists, property table.
    Promise(JsPromise),
    /// A generator object and its resumable frame.
    Generator(JsGenerator),
    /// A parked async-function frame awaiting a promise settlement.
    Frame(FrameCell),
    /// A lexical environment record.
    Env(ScopeRecord),
    /// Bookkeeping for `Promise.all`-family combinators.
    Group(GroupRecord),
}

/// Types that own heap references and must release them on drop.
///
/// Implementations push every directly owned [`HeapId`] into `out`; the heap
/// decrements those counts iteratively.
pub(crate) trait HeapRefs {
    fn collect_refs(self, out: &mut Vec<HeapId>);
}

impl HeapRefs for Value {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        if let Self::Ref(id) = self {
            out.push(id);
        }
    }
}

impl<T: HeapRefs> HeapRefs for Option<T> {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        if let Some(inner) = self {
            inner.collect_refs(out);
        }
    }
}

impl<T: HeapRefs> HeapRefs for Vec<T> {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        for item in self {
            item.collect_refs(out);
        }
    }
}

impl HeapData {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        match self {
            Self::Str(_) => {}
            Self::Object(table) => table.collect_refs(out),
            Self::Array(array) => array.collect_refs(out),
            Self::Function(function) => function.collect_refs(out),
            Self::Regex(regex) => regex.collect_refs(out),
            Self::Date(date) => date.collect_refs(out),
            Self::Promise(promise) => promise.collect_refs(out),
            Self::Generator(generator) => generator.collect_refs(out),
            Self::Frame(frame) => frame.collect_refs(out),
            Self::Env(env) => env.collect_refs(out),
            Self::Group(group) => group.collect_refs(out),
        }
    }
}

#[derive(Debug)]
enum Slot {
    Free,
    Live { refcount: u32, data: HeapData },
}

/// The arena.
#[derive(Debug)]
pub(crate) struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    /// Total allocations over the heap's lifetime (engine statistics).
    allocations: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), live: 0, allocations: 0 }
    }

    /// Allocates a slot with a reference count of one. The returned id is
    /// owned by the caller.
    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        self.live += 1;
        self.allocations += 1;
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Slot::Live { refcount: 1, data };
            HeapId(index)
        } else {
            let index = u32::try_from(self.slots.len()).expect("heap slot overflow");
            self.slots.push(Slot::Live { refcount: 1, data });
            HeapId(index)
        }
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        match &self.slots[id.index()] {
            Slot::Live { data, .. } => data,
            Slot::Free => panic!("heap slot {} is free", id.0),
        }
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        match &mut self.slots[id.index()] {
            Slot::Live { data, .. } => data,
            Slot::Free => panic!("heap slot {} is free", id.0),
        }
    }

    pub fn inc_ref(&mut self, id: HeapId) {
        match &mut self.slots[id.index()] {
            Slot::Live { refcount, .. } => *refcount += 1,
            Slot::Free => panic!("inc_ref on free heap slot {}", id.0),
        }
    }

    /// Releases one reference; frees the slot (and, iteratively, everything
    /// it owned) when the count reaches zero.
    pub fn dec_ref(&mut self, id: HeapId) {
        let mut worklist = vec![id];
        let mut children = Vec::new();
        while let Some(id) = worklist.pop() {
            let slot = &mut self.slots[id.index()];
            match slot {
                Slot::Live { refcount, .. } => {
                    *refcount -= 1;
                    if *refcount == 0 {
                        let taken = std::mem::replace(slot, Slot::Free);
                        let Slot::Live { data, .. } = taken else { unreachable!() };
                        children.clear();
                        data.collect_refs(&mut children);
                        worklist.extend(children.drain(..));
                        self.free.push(id.0 as u32);
                        self.live -= 1;
                    }
                }
                Slot::Free => panic!("dec_ref on free heap slot {}", id.0),
            }
        }
    }

    pub fn refcount(&self, id: HeapId) -> u32 {
        match &self.slots[id.index()] {
            Slot::Live { refcount, .. } => *refcount,
            Slot::Free => 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// The engine's pending-promise registry view: every live, unsettled
    /// promise in the arena.
    pub fn pending_promise_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                matches!(
                    slot,
                    Slot::Live { data: HeapData::Promise(p), .. }
                        if matches!(p.state, crate::promise::PromiseState::Pending)
                )
            })
            .count()
    }

    // ------------------------------------------------------------------
    // Typed accessors. These panic only on engine bugs (wrong id class);
    // callers that dispatch on value shape use `table`/`as_str` instead.

    pub fn as_str(&self, id: HeapId) -> Option<&str> {
        match self.get(id) {
            HeapData::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn function(&self, id: HeapId) -> Option<&JsFunction> {
        match self.get(id) {
            HeapData::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, id: HeapId) -> Option<&mut JsFunction> {
        match self.get_mut(id) {
            HeapData::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn array(&self, id: HeapId) -> Option<&JsArray> {
        match self.get(id) {
            HeapData::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn array_mut(&mut self, id: HeapId) -> Option<&mut JsArray> {
        match self.get_mut(id) {
            HeapData::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn promise(&self, id: HeapId) -> Option<&JsPromise> {
        match self.get(id) {
            HeapData::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn promise_mut(&mut self, id: HeapId) -> Option<&mut JsPromise> {
        match self.get_mut(id) {
            HeapData::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn generator_mut(&mut self, id: HeapId) -> Option<&mut JsGenerator> {
        match self.get_mut(id) {
            HeapData::Generator(g) => Some(g),
            _ => None,
        }
    }

    pub fn regex(&self, id: HeapId) -> Option<&JsRegex> {
        match self.get(id) {
            HeapData::Regex(r) => Some(r),
            _ => None,
        }
    }

    pub fn date(&self, id: HeapId) -> Option<&JsDate> {
        match self.get(id) {
            HeapData::Date(d) => Some(d),
            _ => None,
        }
    }

    /// The environment record behind `id`. Environments are only ever
    /// addressed by ids the engine created, so a mismatch is a bug.
    pub fn env(&self, id: HeapId) -> &ScopeRecord {
        match self.get(id) {
            HeapData::Env(e) => e,
            _ => panic!("heap slot {} is not an environment", id.0),
        }
    }

    pub fn env_mut(&mut self, id: HeapId) -> &mut ScopeRecord {
        match self.get_mut(id) {
            HeapData::Env(e) => e,
            _ => panic!("heap slot {} is not an environment", id.0),
        }
    }

    pub fn group_mut(&mut self, id: HeapId) -> Option<&mut GroupRecord> {
        match self.get_mut(id) {
            HeapData::Group(g) => Some(g),
            _ => None,
        }
    }

    /// The property table embedded in any object-like heap record.
    pub fn table(&self, id: HeapId) -> Option<&PropTable> {
        match self.get(id) {
            HeapData::Object(t) => Some(t),
            HeapData::Array(a) => Some(&a.table),
            HeapData::Function(f) => Some(&f.table),
            HeapData::Regex(r) => Some(&r.table),
            HeapData::Date(d) => Some(&d.table),
            HeapData::Promise(p) => Some(&p.table),
            HeapData::Generator(g) => Some(&g.table),
            HeapData::Str(_) | HeapData::Frame(_) | HeapData::Env(_) | HeapData::Group(_) => None,
        }
    }

    pub fn table_mut(&mut self, id: HeapId) -> Option<&mut PropTable> {
        match self.get_mut(id) {
            HeapData::Object(t) => Some(t),
            HeapData::Array(a) => Some(&mut a.table),
            HeapData::Function(f) => Some(&mut f.table),
            HeapData::Regex(r) => Some(&mut r.table),
            HeapData::Date(d) => Some(&mut d.table),
            HeapData::Promise(p) => Some(&mut p.table),
            HeapData::Generator(g) => Some(&mut g.table),
            HeapData::Str(_) | HeapData::Frame(_) | HeapData::Env(_) | HeapData::Group(_) => None,
        }
    }

    /// True if the id refers to an object in the JS sense (anything with a
    /// property table).
    pub fn is_object_like(&self, id: HeapId) -> bool {
        self.table(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PropTable;

    #[test]
    fn alloc_and_release_reuses_slots() {
        let mut heap = Heap::new();
        let a = heap.alloc(HeapData::Str("hello".into()));
        assert_eq!(heap.live_count(), 1);
        assert_eq!(heap.refcount(a), 1);
        heap.inc_ref(a);
        assert_eq!(heap.refcount(a), 2);
        heap.dec_ref(a);
        heap.dec_ref(a);
        assert_eq!(heap.live_count(), 0);
        let b = heap.alloc(HeapData::Str("world".into()));
        assert_eq!(a, b, "freed slot should be reused");
        assert_eq!(heap.allocations(), 2);
    }

    #[test]
    fn nested_release_is_deep() {
        let mut heap = Heap::new();
        let inner = heap.alloc(HeapData::Str("inner".into()));
        let mut table = PropTable::new(None);
        table.insert_data_value(crate::object::PropKey::Index(0), Value::Ref(inner));
        let outer = heap.alloc(HeapData::Object(table));
        assert_eq!(heap.live_count(), 2);
        heap.dec_ref(outer);
        assert_eq!(heap.live_count(), 0);
    }
}

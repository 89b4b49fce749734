//! String and symbol interning for identifiers, property keys, and literals.
//!
//! The interner stores unique strings in a vector and hands out `StringId`
//! indices for cheap storage and comparison. Identifiers, property keys, and
//! string literals are interned during parsing; runtime code may also intern
//! computed property keys so that property tables compare keys by id alone.
//!
//! StringIds are laid out as follows:
//! * 0 to 128 - single character strings for all 128 ASCII characters
//! * 1000 to count(StaticStrings) - well-known engine names (`length`,
//!   `prototype`, `then`, ...)
//! * 10_000+ - strings interned per engine

use std::sync::LazyLock;

use ahash::AHashMap;
use strum::{EnumString, FromRepr, IntoStaticStr};

/// Index into the string interner's storage.
///
/// Uses `u32` to save space (4 bytes vs 8 bytes for `usize`). This limits us
/// to ~4 billion unique interns, which is more than sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub(crate) struct StringId(u32);

impl StringId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the StringId for an ASCII byte.
    #[must_use]
    pub fn from_ascii(byte: u8) -> Self {
        Self(u32::from(byte))
    }
}

/// StringId offsets
const STATIC_STRING_ID_OFFSET: u32 = 1000;
const INTERN_STRING_ID_OFFSET: usize = 10_000;

/// Static strings for all 128 ASCII characters, built once on first access.
///
/// Uses `LazyLock` to build the array at runtime (once), leaking the strings
/// to get `'static` lifetime. The leak is intentional and bounded (128
/// single-byte strings).
static ASCII_STRS: LazyLock<[&'static str; 128]> = LazyLock::new(|| {
    std::array::from_fn(|i| {
        let s = char::from(u8::try_from(i).expect("index out of u8 range")).to_string();
        &*Box::leak(s.into_boxed_str())
    })
});

/// Well-known names which are known at compile time and don't need to be interned.
///
/// Each variant maps to a `StringId` in the static range, so hot paths (method
/// dispatch, iterator protocol, promise adoption) compare ids without touching
/// the interner's map.
#[repr(u16)]
#[derive(Debug, Clone, Copy, FromRepr, EnumString, IntoStaticStr, PartialEq, Eq, Hash)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum StaticStrings {
    #[strum(serialize = "")]
    EmptyString,
    #[strum(serialize = "<script>")]
    Script,
    #[strum(serialize = "<anonymous>")]
    Anonymous,

    // ==========================
    // Object model
    Length,
    Prototype,
    Constructor,
    #[strum(serialize = "__proto__")]
    DunderProto,
    Name,
    Message,
    Stack,
    Arguments,
    GlobalThis,
    Undefined,

    // ==========================
    // Iterator protocol
    Next,
    Done,
    Value,
    Return,
    Throw,

    // ==========================
    // Promise protocol
    Then,
    Catch,
    Finally,
    Resolve,
    Reject,
    All,
    AllSettled,
    Any,
    Race,
    Status,
    Reason,
    Fulfilled,
    Rejected,

    // ==========================
    // Conversion protocol
    ToString,
    ValueOf,
    #[strum(serialize = "toISOString")]
    ToISOString,
    #[strum(serialize = "toJSON")]
    ToJSON,

    // ==========================
    // Error names
    #[strum(serialize = "Error")]
    Error,
    #[strum(serialize = "TypeError")]
    TypeError,
    #[strum(serialize = "RangeError")]
    RangeError,
    #[strum(serialize = "ReferenceError")]
    ReferenceError,
    #[strum(serialize = "SyntaxError")]
    SyntaxError,

    // ==========================
    // RegExp
    Source,
    Flags,
    LastIndex,
    Exec,
    Test,
    Index,
    Input,

    // ==========================
    // Well-known callables installed on the global object
    Console,
    Log,
    #[strum(serialize = "__debug")]
    DebugHook,
}

impl StaticStrings {
    /// Returns the static string for this variant.
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Returns the `StringId` in the static range for this variant.
    #[inline]
    pub fn id(self) -> StringId {
        StringId(STATIC_STRING_ID_OFFSET + self as u32)
    }
}

/// Number of `StaticStrings` variants; used to size the reverse lookup.
const STATIC_STRINGS_COUNT: u16 = StaticStrings::DebugHook as u16 + 1;

/// Interned symbol index.
///
/// Symbols are never garbage collected; an engine interns few of them (the
/// well-known symbols plus any `Symbol(desc)` calls a script makes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SymbolId(u32);

impl SymbolId {
    /// The well-known `Symbol.iterator`.
    pub const ITERATOR: Self = Self(0);
    /// The well-known `Symbol.asyncIterator`.
    pub const ASYNC_ITERATOR: Self = Self(1);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// String and symbol storage owned by an engine.
///
/// Unlike the typical compile-then-freeze interner, this one stays mutable for
/// the engine's lifetime: computed property keys and `Symbol(...)` calls
/// intern at runtime, and ids remain stable across successive `eval` calls
/// against the same engine.
#[derive(Debug)]
pub(crate) struct Interns {
    /// Dynamically interned strings, indexed by `StringId - INTERN_STRING_ID_OFFSET`.
    strings: Vec<Box<str>>,
    /// Reverse lookup for dynamic interning.
    lookup: AHashMap<Box<str>, StringId>,
    /// Reverse lookup for the static range, built once at construction.
    static_lookup: AHashMap<&'static str, StringId>,
    /// Symbol descriptions, indexed by `SymbolId`. Well-known symbols first.
    symbols: Vec<Option<Box<str>>>,
}

impl Interns {
    pub fn new() -> Self {
        let mut static_lookup = AHashMap::with_capacity(STATIC_STRINGS_COUNT as usize);
        for raw in 0..STATIC_STRINGS_COUNT {
            let s = StaticStrings::from_repr(raw).expect("static string repr in range");
            static_lookup.insert(s.as_str(), s.id());
        }
        Self {
            strings: Vec::new(),
            lookup: AHashMap::new(),
            static_lookup,
            symbols: vec![
                Some("Symbol.iterator".into()),
                Some("Symbol.asyncIterator".into()),
            ],
        }
    }

    /// Interns a string, returning its stable id.
    ///
    /// Single ASCII characters and well-known names resolve to the static
    /// ranges without touching the dynamic table.
    pub fn intern(&mut self, s: &str) -> StringId {
        if s.len() == 1 && s.as_bytes()[0] < 128 {
            return StringId::from_ascii(s.as_bytes()[0]);
        }
        if s.is_empty() {
            return StaticStrings::EmptyString.id();
        }
        if let Some(&id) = self.static_lookup.get(s) {
            return id;
        }
        if let Some(&id) = self.lookup.get(s) {
            return id;
        }
        let id = StringId(u32::try_from(INTERN_STRING_ID_OFFSET + self.strings.len()).expect("intern table overflow"));
        self.strings.push(s.into());
        self.lookup.insert(s.into(), id);
        id
    }

    /// Resolves an id back to its string.
    pub fn get(&self, id: StringId) -> &str {
        let raw = id.0;
        if raw < 128 {
            return ASCII_STRS[raw as usize];
        }
        if raw >= STATIC_STRING_ID_OFFSET && raw < STATIC_STRING_ID_OFFSET + u32::from(STATIC_STRINGS_COUNT) {
            let s = StaticStrings::from_repr((raw - STATIC_STRING_ID_OFFSET) as u16).expect("static string in range");
            return s.as_str();
        }
        &self.strings[id.index() - INTERN_STRING_ID_OFFSET]
    }

    /// Creates a fresh (non-well-known) symbol with an optional description.
    pub fn new_symbol(&mut self, description: Option<&str>) -> SymbolId {
        let id = SymbolId(u32::try_from(self.symbols.len()).expect("symbol table overflow"));
        self.symbols.push(description.map(Into::into));
        id
    }

    /// Renders a symbol the way `String(sym)` would: `Symbol(desc)`.
    pub fn symbol_to_string(&self, id: SymbolId) -> String {
        match id {
            SymbolId::ITERATOR | SymbolId::ASYNC_ITERATOR => {
                self.symbols[id.index()].as_deref().expect("well-known symbol description").to_owned()
            }
            _ => format!("Symbol({})", self.symbols[id.index()].as_deref().unwrap_or("")),
        }
    }

    /// Number of dynamically interned strings (for engine statistics).
    pub fn dynamic_count(&self) -> usize {
        self.strings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_and_static_ranges() {
        let mut interns = Interns::new();
        assert_eq!(interns.intern("a"), StringId::from_ascii(b'a'));
        assert_eq!(interns.intern("length"), StaticStrings::Length.id());
        assert_eq!(interns.get(StaticStrings::Prototype.id()), "prototype");
        assert_eq!(interns.get(StringId::from_ascii(b'z')), "z");
    }

    #[test]
    fn dynamic_interning_is_stable() {
        let mut interns = Interns::new();
        let a = interns.intern("someIdentifier");
        let b = interns.intern("someIdentifier");
        assert_eq!(a, b);
        assert_eq!(interns.get(a), "someIdentifier");
        assert_eq!(interns.dynamic_count(), 1);
    }

    #[test]
    fn symbols_are_distinct() {
        let mut interns = Interns::new();
        let s1 = interns.new_symbol(Some("tag"));
        let s2 = interns.new_symbol(Some("tag"));
        assert_ne!(s1, s2);
        assert_eq!(interns.symbol_to_string(s1), "Symbol(tag)");
        assert_eq!(interns.symbol_to_string(SymbolId::ITERATOR), "Symbol.iterator");
    }
}

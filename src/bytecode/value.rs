use std::fmt;
use std::rc::Rc;

use crate::bytecode::table::Table;

/// FNV-1a-32 (§4.8): offset basis `0x811c9dc5`, prime `0x01000193`.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

/// A heap-allocated, immutable, interned string. The hash is computed
/// once at construction and cached (§3 invariant), so every subsequent
/// comparison or table probe is a field read, not a re-hash.
pub struct StrObj {
    pub chars: String,
    pub hash: u32,
}

/// The VM's universal runtime value (§3). Per SPEC_FULL.md §1, the
/// bytecode engine's own grammar and ISA never produce a `Function`,
/// `Class`, `Instance`, or `NativeFn` — there is no `CALL` opcode and
/// `compile.rs` never emits one — so the only heap object the VM ever
/// allocates is an interned string.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Obj(Rc<StrObj>),
}

impl Value {
    pub fn string(s: Rc<StrObj>) -> Value { Value::Obj(s) }

    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Obj(_) => "string",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            // interned: pointer identity is value equality (§3)
            (Value::Obj(a), Value::Obj(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", crate::common::format::format_number(*n)),
            Value::Obj(s) => write!(f, "{}", s.chars),
        }
    }
}

/// The string intern set (§4.8): on every attempt to materialize a
/// `String` from raw bytes, probe for a byte-for-byte match; return the
/// existing object on a hit, insert and return a new one on a miss.
pub struct Interner {
    table: Table<()>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner { table: Table::new() }
    }

    pub fn intern(&mut self, raw: &str) -> Rc<StrObj> {
        let hash = fnv1a(raw.as_bytes());

        if let Some(existing) = self.table.find_key_by(hash, |k| k.hash == hash && k.chars == raw) {
            return existing;
        }

        let obj = Rc::new(StrObj { chars: raw.to_string(), hash });
        let probe_target = Rc::clone(&obj);
        self.table.set_by(hash, Rc::clone(&obj), (), move |k| Rc::ptr_eq(k, &probe_target));
        obj
    }
}

impl Default for Interner {
    fn default() -> Self { Interner::new() }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_strings_are_distinct() {
        let mut interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("world");
        assert!(!Rc::ptr_eq(&a, &b));
    }

    proptest! {
        // §8 property 5: interning the same bytes twice always yields
        // the same object, for arbitrary text, not just hand-picked cases.
        #[test]
        fn interning_any_string_twice_is_idempotent(s in ".*") {
            let mut interner = Interner::new();
            let a = interner.intern(&s);
            let b = interner.intern(&s);
            prop_assert!(Rc::ptr_eq(&a, &b));
        }

        // §8 property 3: nil and false are the only falsy values.
        #[test]
        fn truthiness_matches_nil_and_false_only(n in any::<f64>(), s in ".*", b in any::<bool>()) {
            prop_assert!(!Value::Nil.truthy());
            prop_assert_eq!(Value::Bool(b).truthy(), b);
            prop_assert!(Value::Number(n).truthy());
            let mut interner = Interner::new();
            prop_assert!(Value::Obj(interner.intern(&s)).truthy());
        }

        // §8 property 4: equality is symmetric and cross-type comparisons
        // are always false.
        #[test]
        fn equality_is_symmetric(a in any::<f64>(), b in any::<f64>()) {
            let (va, vb) = (Value::Number(a), Value::Number(b));
            prop_assert_eq!(va == vb, vb == va);
        }

        #[test]
        fn numbers_and_strings_never_compare_equal(n in any::<f64>(), s in ".*") {
            let mut interner = Interner::new();
            let string_value = Value::Obj(interner.intern(&s));
            prop_assert!(Value::Number(n) != string_value);
        }
    }
}

use lazy_static::lazy_static;
use std::sync::RwLock;
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref TAG_TABLE: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Interns an event tag and returns its stable numeric code.
///
/// Codes are assigned in first-use order and never change for the life of
/// the process, so the encoder stream can carry the number instead of text.
pub fn tag_code(tag: &str) -> usize {
    let atom = Atom::from(tag);
    if let Some(idx) = TAG_TABLE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .position(|a| *a == atom)
    {
        return idx;
    }
    let mut v = TAG_TABLE.write().unwrap_or_else(|e| e.into_inner());
    match v.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            v.push(atom);
            v.len() - 1
        }
    }
}

pub fn tag_name(code: usize) -> Option<Atom> {
    TAG_TABLE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(code)
        .cloned()
}

/// Number of distinct tags seen so far.
pub fn tag_count() -> usize {
    TAG_TABLE.read().unwrap_or_else(|e| e.into_inner()).len()
}

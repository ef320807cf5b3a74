//! Per-stitch metadata multimap (§9): `name -> ordered list of (context, value)`.
//! A context of `-1` means "no context". Values are a closed sum of string/number/bool (§3).

use std::collections::HashMap;

pub type Context = i64;
pub const NO_CONTEXT: Context = -1;

#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Str(s.to_string())
    }
}
impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Str(s)
    }
}
impl From<f64> for MetaValue {
    fn from(n: f64) -> Self {
        MetaValue::Num(n)
    }
}
impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        MetaValue::Num(n as f64)
    }
}
impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: HashMap<String, Vec<(Context, MetaValue)>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// append a value under `name` at `context` (insertion order preserved, §5 ordering guarantee iv)
    pub fn push(&mut self, name: impl Into<String>, context: Context, value: MetaValue) {
        self.entries.entry(name.into()).or_default().push((context, value));
    }

    /// all values recorded for `name`, optionally filtered to a single context
    pub fn get(&self, name: &str, context: Option<Context>) -> Vec<&MetaValue> {
        match self.entries.get(name) {
            None => Vec::new(),
            Some(pairs) => pairs
                .iter()
                .filter(|(ctx, _)| context.map_or(true, |c| c == *ctx))
                .map(|(_, v)| v)
                .collect(),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// transfer every entry of `other` into `self`, preserving insertion order of `other`'s own
    /// entries appended after `self`'s existing ones (used by `Stitch::merge`)
    pub fn absorb(&mut self, other: Metadata) {
        for (name, mut pairs) in other.entries {
            self.entries.entry(name).or_default().append(&mut pairs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_context() {
        let mut m = Metadata::new();
        m.push("gauge", NO_CONTEXT, 5.0.into());
        m.push("gauge", 3, 7.0.into());
        assert_eq!(m.get("gauge", None).len(), 2);
        assert_eq!(m.get("gauge", Some(3)), vec![&MetaValue::Num(7.0)]);
        assert_eq!(m.get("gauge", Some(NO_CONTEXT)), vec![&MetaValue::Num(5.0)]);
    }

    #[test]
    fn absorb_preserves_order_after_existing_entries() {
        let mut a = Metadata::new();
        a.push("names", NO_CONTEXT, "front".into());
        let mut b = Metadata::new();
        b.push("names", NO_CONTEXT, "back".into());
        a.absorb(b);
        let got: Vec<_> = a.get("names", None);
        assert_eq!(got, vec![&MetaValue::Str("front".into()), &MetaValue::Str("back".into())]);
    }
}

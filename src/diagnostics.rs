//! Stitch-keyed diagnostics (§4.J, §7): a process-wide, namespaced registry of errors, warnings
//! and notices accumulated during compilation. Recoverable conditions are recorded here and
//! compilation continues; fatal conditions (§7) bypass this registry entirely and panic.

use crate::{Needle, Time};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::stitch::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Notice,
}

/// the recoverable kinds from §7's table (fatal kinds are never constructed here)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Kind {
    OverlappingStitch,
    TooManyUpperWales,
    UndefinedCourseDirection,
    ReverseStitchConflict,
    InvalidCrossPair,
    ExcessiveStackedLoops,
    KnitOverMisses,
    BedWidthExceeded,
    OptimizerNonconvergence,
}

impl Kind {
    pub fn severity(self) -> Severity {
        match self {
            Kind::OverlappingStitch | Kind::TooManyUpperWales => Severity::Error,
            Kind::OptimizerNonconvergence => Severity::Notice,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub kind: Kind,
    pub time: Time,
    pub index: Needle,
    pub side: Side,
    pub message: String,
    pub group: Option<u64>,
}

impl Diagnostic {
    pub fn new(kind: Kind, time: Time, index: Needle, side: Side, message: impl Into<String>) -> Self {
        Self {
            kind,
            time,
            index,
            side,
            message: message.into(),
            group: None,
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

/// a namespaced list of diagnostics; namespaces typically key by compilation run or shape group
#[derive(Default)]
struct Registry {
    namespaces: HashMap<String, Vec<Diagnostic>>,
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry::default()))
}

pub const ROOT: &str = "root";

/// append a diagnostic under `namespace` (use [`ROOT`] for the default namespace)
pub fn push(namespace: &str, entry: Diagnostic) {
    log::warn!("[{}] {:?}: {}", namespace, entry.kind, entry.message);
    registry()
        .lock()
        .expect("diagnostics registry poisoned")
        .namespaces
        .entry(namespace.to_string())
        .or_default()
        .push(entry);
}

/// all diagnostics recorded under `namespace`, in insertion order
pub fn entries(namespace: &str) -> Vec<Diagnostic> {
    registry()
        .lock()
        .expect("diagnostics registry poisoned")
        .namespaces
        .get(namespace)
        .cloned()
        .unwrap_or_default()
}

/// clear a single namespace
pub fn clear(namespace: &str) {
    registry()
        .lock()
        .expect("diagnostics registry poisoned")
        .namespaces
        .remove(namespace);
}

/// clear every namespace; called at the start of each compilation invocation
pub fn clear_all() {
    registry()
        .lock()
        .expect("diagnostics registry poisoned")
        .namespaces
        .clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_accumulate_in_insertion_order() {
        clear("test::order");
        push(
            "test::order",
            Diagnostic::new(Kind::BedWidthExceeded, 0, 0, Side::Front, "first"),
        );
        push(
            "test::order",
            Diagnostic::new(Kind::BedWidthExceeded, 1, 0, Side::Front, "second"),
        );
        let all = entries("test::order");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "first");
        assert_eq!(all[1].message, "second");
        clear("test::order");
    }

    #[test]
    fn clear_all_empties_every_namespace() {
        push(
            "test::a",
            Diagnostic::new(Kind::OverlappingStitch, 0, 0, Side::Front, "x"),
        );
        push(
            "test::b",
            Diagnostic::new(Kind::OverlappingStitch, 0, 0, Side::Front, "y"),
        );
        clear_all();
        assert!(entries("test::a").is_empty());
        assert!(entries("test::b").is_empty());
    }

    #[test]
    fn severities_match_the_table() {
        assert_eq!(Kind::OverlappingStitch.severity(), Severity::Error);
        assert_eq!(Kind::TooManyUpperWales.severity(), Severity::Error);
        assert_eq!(Kind::OptimizerNonconvergence.severity(), Severity::Notice);
        assert_eq!(Kind::BedWidthExceeded.severity(), Severity::Warning);
    }
}

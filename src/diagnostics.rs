use std::cell::RefCell;
use std::fmt;

use rustc_hash::FxHashSet;

use crate::module::{InstrId, Module};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    /// Don't record any diagnostics.
    Off,
    /// Record only unsuccessful optimizations.
    Warn,
    /// Record all optimizations.
    Info,
}

/// A message reported by a pass against one instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub instr: InstrId,
    pub message: String,
}

/// Diagnostic reporter for optimization passes.
///
/// Messages are emitted as `tracing` events and also kept so that callers
/// can inspect why a rewrite was or was not applied.
#[derive(Debug)]
pub struct Diagnostics {
    pass: &'static str,
    level: DiagnosticLevel,

    /// Instructions against which a warning has been reported. Later
    /// warnings for the same instruction are dropped.
    warned: RefCell<FxHashSet<InstrId>>,

    records: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new(pass: &'static str) -> Self {
        Self {
            pass,
            level: DiagnosticLevel::Warn,
            warned: RefCell::new(FxHashSet::default()),
            records: RefCell::new(Vec::new()),
        }
    }

    /// Enable reporting of all messages at or above a given level.
    pub fn set_level(&mut self, level: DiagnosticLevel) {
        self.level = level;
    }

    /// Return true if diagnostic messages are enabled at a given level.
    pub fn enabled(&self, level: DiagnosticLevel) -> bool {
        self.level >= level
    }

    /// Report a successful optimization at the [`Info`](DiagnosticLevel::Info) level.
    pub fn info(&self, module: &Module, instr: InstrId, message: fmt::Arguments<'_>) {
        if !self.enabled(DiagnosticLevel::Info) {
            return;
        }
        tracing::info!(
            pass = self.pass,
            module = module.name(),
            instr = %instr,
            "{}",
            message
        );
        self.record(DiagnosticLevel::Info, instr, message);
    }

    /// Report a rejected optimization at the [`Warn`](DiagnosticLevel::Warn) level.
    pub fn warn(&self, module: &Module, instr: InstrId, message: fmt::Arguments<'_>) {
        if !self.enabled(DiagnosticLevel::Warn) || !self.warned.borrow_mut().insert(instr) {
            return;
        }
        tracing::warn!(
            pass = self.pass,
            module = module.name(),
            instr = %instr,
            "{}",
            message
        );
        self.record(DiagnosticLevel::Warn, instr, message);
    }

    fn record(&self, level: DiagnosticLevel, instr: InstrId, message: fmt::Arguments<'_>) {
        self.records.borrow_mut().push(Diagnostic {
            level,
            instr,
            message: message.to_string(),
        });
    }

    /// Return the messages recorded so far.
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }

    /// Return the messages recorded at exactly `level`.
    pub fn records_at(&self, level: DiagnosticLevel) -> Vec<Diagnostic> {
        self.records
            .borrow()
            .iter()
            .filter(|d| d.level == level)
            .cloned()
            .collect()
    }

    /// Forget recorded messages and warned instructions, before a new run of
    /// the pass.
    pub fn reset(&self) {
        self.warned.borrow_mut().clear();
        self.records.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{DiagnosticLevel, Diagnostics};
    use crate::module::{InstrId, Module};

    #[test]
    fn test_diagnostics_levels() {
        let module = Module::new("main");
        let id = InstrId::from_u32(3);

        let mut diag = Diagnostics::new("test");
        diag.info(&module, id, format_args!("applied"));
        diag.warn(&module, id, format_args!("rejected: {}", "int8"));
        diag.warn(&module, id, format_args!("rejected again"));

        let records = diag.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "rejected: int8");
        assert_eq!(records[0].level, DiagnosticLevel::Warn);

        diag.reset();
        diag.set_level(DiagnosticLevel::Info);
        diag.info(&module, id, format_args!("applied"));
        assert_eq!(diag.records_at(DiagnosticLevel::Info).len(), 1);

        diag.set_level(DiagnosticLevel::Off);
        diag.warn(&module, InstrId::from_u32(4), format_args!("hidden"));
        assert!(diag.records_at(DiagnosticLevel::Warn).is_empty());
    }
}

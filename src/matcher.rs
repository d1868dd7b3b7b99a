//! Declarative matching of instruction subgraphs.
//!
//! A [`Matcher`] is tested against an instruction in a [`Module`]. Matchers
//! are built from primitive predicates (operator names, arbitrary tests on
//! the instruction) and combinators which match the inputs of an
//! instruction, skip over pass-through operators or bind a matched
//! instruction to a key for retrieval from the [`Match`].
//!
//! ```
//! use tgraph::matcher::{name, skip};
//!
//! // A `pointwise` instruction with an input produced by a `dot`, possibly
//! // through a chain of `contiguous` instructions.
//! let dot = skip(&["contiguous"], name("dot").bind("dot"));
//! let pattern = name("pointwise").with_any_input(dot.bind("x"));
//! ```

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::module::{InstrId, Instruction, Module};

/// Tracks the instructions that binding keys in a matcher have been
/// resolved to.
#[derive(Clone, Debug, Default)]
struct SymbolMap {
    // Map of `(key, instr_id)`. This is modified only by extending and
    // truncating it.
    symbols: Vec<(&'static str, InstrId)>,

    // Stack of checkpoints. Each is the length of `symbols` at the time of
    // the checkpoint.
    checkpoints: Vec<usize>,
}

impl SymbolMap {
    /// Save the current state of the map, so it can be restored if a
    /// tentative match fails.
    fn checkpoint(&mut self) {
        self.checkpoints.push(self.symbols.len());
    }

    /// Discard symbols recorded since the last call to `checkpoint`.
    fn revert(&mut self) {
        if let Some(checkpoint) = self.checkpoints.pop() {
            self.symbols.truncate(checkpoint);
        }
    }

    /// Keep symbols recorded since the last call to `checkpoint`.
    fn commit(&mut self) {
        self.checkpoints.pop();
    }

    fn find(&self, key: &str) -> Option<InstrId> {
        self.symbols
            .iter()
            .find_map(|&(sym, id)| (sym == key).then_some(id))
    }

    /// Bind `key` to `id`. Fails if the key is already bound to a different
    /// instruction.
    fn bind(&mut self, key: &'static str, id: InstrId) -> bool {
        match self.find(key) {
            Some(bound) => bound == id,
            None => {
                self.symbols.push((key, id));
                true
            }
        }
    }
}

/// The result of a successful match.
#[derive(Clone, Debug)]
pub struct Match {
    result: InstrId,
    symbols: SymbolMap,
}

impl Match {
    /// Return the instruction the matcher was tested against.
    pub fn result(&self) -> InstrId {
        self.result
    }

    /// Return the instruction bound to `key`.
    pub fn get(&self, key: &str) -> Option<InstrId> {
        self.symbols.find(key)
    }

    /// Iterate over bindings in the order they were made.
    pub fn bindings(&self) -> impl Iterator<Item = (&'static str, InstrId)> + '_ {
        self.symbols.symbols.iter().copied()
    }
}

type PredicateFn = dyn Fn(&Module, InstrId, &Instruction) -> bool + Send + Sync;

enum MatcherKind {
    Any,
    Names(SmallVec<[&'static str; 2]>),
    Predicate {
        label: &'static str,
        test: Box<PredicateFn>,
    },
    Args {
        base: Matcher,
        args: Vec<Matcher>,
    },
    AnyInput {
        base: Matcher,
        input: Matcher,
    },
    Input {
        base: Matcher,
        index: usize,
        input: Matcher,
    },
    Skip {
        names: SmallVec<[&'static str; 2]>,
        inner: Matcher,
    },
    Bind {
        key: &'static str,
        inner: Matcher,
    },
    AnyOf(Vec<Matcher>),
    AllOf(Vec<Matcher>),
    Not(Matcher),
}

/// A composable predicate over instructions in a module.
///
/// Matchers are cheap to clone and hold no state between tests. Bindings
/// made during a test are returned in the [`Match`].
#[derive(Clone)]
pub struct Matcher(Arc<MatcherKind>);

impl Matcher {
    fn new(kind: MatcherKind) -> Matcher {
        Matcher(Arc::new(kind))
    }

    /// Require the instruction's inputs to match `args` exactly, in order.
    ///
    /// For commutative binary operators the two inputs may match either way
    /// around.
    pub fn with_args<I: Into<Vec<Matcher>>>(self, args: I) -> Matcher {
        Matcher::new(MatcherKind::Args {
            base: self,
            args: args.into(),
        })
    }

    /// Require at least one input of the instruction to match `input`. Inputs
    /// are tried in order and the first match wins.
    pub fn with_any_input(self, input: Matcher) -> Matcher {
        Matcher::new(MatcherKind::AnyInput { base: self, input })
    }

    /// Require input `index` of the instruction to match `input`.
    pub fn with_input(self, index: usize, input: Matcher) -> Matcher {
        Matcher::new(MatcherKind::Input {
            base: self,
            index,
            input,
        })
    }

    /// Bind the instruction this matcher is tested against to `key`.
    ///
    /// If `key` is bound more than once in a pattern, all bindings must
    /// resolve to the same instruction.
    pub fn bind(self, key: &'static str) -> Matcher {
        Matcher::new(MatcherKind::Bind { key, inner: self })
    }

    /// Require both this matcher and `other` to match.
    pub fn and(self, other: Matcher) -> Matcher {
        all_of([self, other])
    }

    /// Test this matcher against an instruction.
    ///
    /// Returns `None` if the instruction does not match.
    pub fn test(&self, module: &Module, id: InstrId) -> Option<Match> {
        let mut symbols = SymbolMap::default();
        self.test_impl(module, id, &mut symbols).then_some(Match {
            result: id,
            symbols,
        })
    }

    /// Test this matcher against each instruction in module order and return
    /// all matches.
    pub fn find_matches(&self, module: &Module) -> Vec<Match> {
        module
            .iter()
            .filter_map(|(id, _)| self.test(module, id))
            .collect()
    }

    fn test_impl(&self, module: &Module, id: InstrId, symbols: &mut SymbolMap) -> bool {
        let Some(instr) = module.get(id) else {
            return false;
        };

        match self.0.as_ref() {
            MatcherKind::Any => true,
            MatcherKind::Names(names) => names.iter().any(|&n| n == instr.name()),
            MatcherKind::Predicate { test, .. } => test(module, id, instr),
            MatcherKind::Args { base, args } => {
                if args.len() != instr.inputs().len() || !base.test_impl(module, id, symbols) {
                    return false;
                }
                if let (true, [arg_a, arg_b], &[input_a, input_b]) =
                    (instr.operator().is_commutative(), &args[..], instr.inputs())
                {
                    symbols.checkpoint();
                    if arg_a.test_impl(module, input_a, symbols)
                        && arg_b.test_impl(module, input_b, symbols)
                    {
                        symbols.commit();
                        return true;
                    }
                    symbols.revert();
                    arg_b.test_impl(module, input_a, symbols)
                        && arg_a.test_impl(module, input_b, symbols)
                } else {
                    args.iter()
                        .zip(instr.inputs())
                        .all(|(arg, &input)| arg.test_impl(module, input, symbols))
                }
            }
            MatcherKind::AnyInput { base, input } => {
                if !base.test_impl(module, id, symbols) {
                    return false;
                }
                instr.inputs().iter().any(|&input_id| {
                    symbols.checkpoint();
                    if input.test_impl(module, input_id, symbols) {
                        symbols.commit();
                        true
                    } else {
                        symbols.revert();
                        false
                    }
                })
            }
            MatcherKind::Input { base, index, input } => {
                base.test_impl(module, id, symbols)
                    && instr
                        .inputs()
                        .get(*index)
                        .is_some_and(|&input_id| input.test_impl(module, input_id, symbols))
            }
            MatcherKind::Skip { names, inner } => {
                let mut current = id;
                while let Some(instr) = module.get(current) {
                    match instr.inputs() {
                        [first, ..] if names.iter().any(|&n| n == instr.name()) => current = *first,
                        _ => break,
                    }
                }
                inner.test_impl(module, current, symbols)
            }
            MatcherKind::Bind { key, inner } => {
                inner.test_impl(module, id, symbols) && symbols.bind(key, id)
            }
            MatcherKind::AnyOf(matchers) => matchers.iter().any(|m| {
                symbols.checkpoint();
                if m.test_impl(module, id, symbols) {
                    symbols.commit();
                    true
                } else {
                    symbols.revert();
                    false
                }
            }),
            MatcherKind::AllOf(matchers) => {
                matchers.iter().all(|m| m.test_impl(module, id, symbols))
            }
            MatcherKind::Not(inner) => {
                symbols.checkpoint();
                let matched = inner.test_impl(module, id, symbols);
                symbols.revert();
                !matched
            }
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref() {
            MatcherKind::Any => write!(f, "any()"),
            MatcherKind::Names(names) => write!(f, "name({})", names.join("|")),
            MatcherKind::Predicate { label, .. } => write!(f, "{}()", label),
            MatcherKind::Args { base, args } => write!(f, "{:?}.args({:?})", base, args),
            MatcherKind::AnyInput { base, input } => {
                write!(f, "{:?}.any_input({:?})", base, input)
            }
            MatcherKind::Input { base, index, input } => {
                write!(f, "{:?}.input({}, {:?})", base, index, input)
            }
            MatcherKind::Skip { names, inner } => {
                write!(f, "skip({})({:?})", names.join("|"), inner)
            }
            MatcherKind::Bind { key, inner } => write!(f, "{:?}.bind({:?})", inner, key),
            MatcherKind::AnyOf(matchers) => write!(f, "any_of({:?})", matchers),
            MatcherKind::AllOf(matchers) => write!(f, "all_of({:?})", matchers),
            MatcherKind::Not(inner) => write!(f, "none_of({:?})", inner),
        }
    }
}

/// Match any instruction.
pub fn any() -> Matcher {
    Matcher::new(MatcherKind::Any)
}

/// Match instructions whose operator has the given name.
pub fn name(name: &'static str) -> Matcher {
    names(&[name])
}

/// Match instructions whose operator has any of the given names.
pub fn names(names: &[&'static str]) -> Matcher {
    Matcher::new(MatcherKind::Names(names.iter().copied().collect()))
}

/// Match instructions for which `test` returns true.
///
/// `label` is used when printing the matcher.
pub fn predicate<F>(label: &'static str, test: F) -> Matcher
where
    F: Fn(&Module, InstrId, &Instruction) -> bool + Send + Sync + 'static,
{
    Matcher::new(MatcherKind::Predicate {
        label,
        test: Box::new(test),
    })
}

/// Match instructions whose operator is applied elementwise.
pub fn pointwise() -> Matcher {
    predicate("pointwise", |_, _, instr| instr.operator().is_pointwise())
}

/// Match instructions whose output is consumed by exactly one instruction.
pub fn used_once() -> Matcher {
    predicate("used_once", |module, id, _| module.use_count(id) == 1)
}

/// Match `inner` against the instruction reached by following the first
/// input of instructions named in `names`, starting from the tested
/// instruction.
pub fn skip(names: &[&'static str], inner: Matcher) -> Matcher {
    Matcher::new(MatcherKind::Skip {
        names: names.iter().copied().collect(),
        inner,
    })
}

/// Match if any of `matchers` match. Matchers are tried in order, and only
/// the bindings of the first successful one are kept.
pub fn any_of<I: IntoIterator<Item = Matcher>>(matchers: I) -> Matcher {
    Matcher::new(MatcherKind::AnyOf(matchers.into_iter().collect()))
}

/// Match if all of `matchers` match.
pub fn all_of<I: IntoIterator<Item = Matcher>>(matchers: I) -> Matcher {
    Matcher::new(MatcherKind::AllOf(matchers.into_iter().collect()))
}

/// Match if `inner` does not match. Bindings made by `inner` are discarded.
pub fn none_of(inner: Matcher) -> Matcher {
    Matcher::new(MatcherKind::Not(inner))
}

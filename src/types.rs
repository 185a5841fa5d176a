use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A trait for newtyped integers, that can be used as index types in vectors and sets.
pub trait Idx: Copy + Eq + std::hash::Hash + Ord {
  /// Convert from `T` to `usize`
  fn into_usize(self) -> usize;
  /// Convert from `usize` to `T`
  fn from_usize(_: usize) -> Self;
}

impl Idx for usize {
  fn into_usize(self) -> usize { self }
  fn from_usize(n: usize) -> Self { n }
}
impl Idx for u32 {
  fn into_usize(self) -> usize { self as _ }
  fn from_usize(n: usize) -> Self { n as _ }
}

/// A vector indexed by a custom indexing type `I`, usually a newtyped integer.
pub struct IdxVec<I, T>(pub Vec<T>, PhantomData<I>);

impl<I, T: std::fmt::Debug> std::fmt::Debug for IdxVec<I, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
}

impl<I, T: Clone> Clone for IdxVec<I, T> {
  fn clone(&self) -> Self { Self(self.0.clone(), PhantomData) }
}

impl<I, T> IdxVec<I, T> {
  /// Construct a new empty [`IdxVec`].
  #[must_use]
  pub const fn new() -> Self { Self(vec![], PhantomData) }

  /// The number of elements in the [`IdxVec`].
  #[must_use]
  pub fn len(&self) -> usize { self.0.len() }

  /// Returns `true` if the vector contains no elements.
  #[must_use]
  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Get a value by index into the vector.
  pub fn get(&self, index: I) -> Option<&T>
  where I: Idx {
    self.0.get(I::into_usize(index))
  }

  /// Returns the value that would be returned by the next call to `push`.
  pub fn peek(&self) -> I
  where I: Idx {
    I::from_usize(self.0.len())
  }

  /// Insert a new value at the end of the vector.
  pub fn push(&mut self, val: T) -> I
  where I: Idx {
    let id = self.peek();
    self.0.push(val);
    id
  }

  /// An iterator including the indexes, like `iter().enumerate()`.
  pub fn enum_iter(&self) -> impl Iterator<Item = (I, &T)>
  where I: Idx {
    self.0.iter().enumerate().map(|(n, val)| (I::from_usize(n), val))
  }
}

impl<I, T> From<Vec<T>> for IdxVec<I, T> {
  fn from(vec: Vec<T>) -> Self { Self(vec, PhantomData) }
}

impl<I, T> Default for IdxVec<I, T> {
  fn default() -> Self { vec![].into() }
}

impl<I: Idx, T> Index<I> for IdxVec<I, T> {
  type Output = T;
  fn index(&self, index: I) -> &Self::Output { &self.0[I::into_usize(index)] }
}

impl<I: Idx, T> IndexMut<I> for IdxVec<I, T> {
  fn index_mut(&mut self, index: I) -> &mut Self::Output { &mut self.0[I::into_usize(index)] }
}

#[macro_export]
macro_rules! mk_id {
  ($($id:ident,)*) => {
    $(
      #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
      pub struct $id(pub u32);
      impl $crate::types::Idx for $id {
        fn from_usize(n: usize) -> Self { Self(n as u32) }
        fn into_usize(self) -> usize { self.0 as usize }
      }
      impl std::fmt::Debug for $id {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
      }
    )*
  };
}

mk_id! {
  HypId,
  TarId,
}

/// The sort of a variable, as far as the unifier cares: a metavariable of
/// predicate sort may only be bound to a predicate, all others only to
/// object-level expressions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sort {
  Expr,
  Pred,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QuantKind {
  Forall,
  Exists,
}

/// Deferred universe/domain/codomain queries on a metavariable, resolved
/// against the quantifier zone only once the metavariable is bound.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MacroKind {
  Universe,
  Domain,
  Codomain,
}

impl MacroKind {
  pub fn name(self) -> &'static str {
    match self {
      MacroKind::Universe => "universe",
      MacroKind::Domain => "domain",
      MacroKind::Codomain => "codomain",
    }
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
  Implies,
  Iff,
  And,
  Or,
  Eq,
  Neq,
  Lt,
  Gt,
  Leq,
  Geq,
  Elem,
  Subset,
  Subseteq,
  Union,
  Inter,
  Diff,
  Add,
  Sub,
  Mul,
  Div,
  Pow,
  /// function space arrow, only used in variable constraints
  To,
}

impl BinOp {
  /// The constant name this operator contributes to a statement's constant
  /// signature, or `None` for pure logical structure.
  pub fn constant(self) -> Option<&'static str> {
    match self {
      BinOp::Implies | BinOp::Iff | BinOp::And | BinOp::Or => None,
      BinOp::Eq => Some("="),
      BinOp::Neq => Some("≠"),
      BinOp::Lt => Some("<"),
      BinOp::Gt => Some(">"),
      BinOp::Leq => Some("≤"),
      BinOp::Geq => Some("≥"),
      BinOp::Elem => Some("∈"),
      BinOp::Subset => Some("⊂"),
      BinOp::Subseteq => Some("⊆"),
      BinOp::Union => Some("∪"),
      BinOp::Inter => Some("∩"),
      BinOp::Diff => Some("\\"),
      BinOp::Add => Some("+"),
      BinOp::Sub => Some("-"),
      BinOp::Mul => Some("*"),
      BinOp::Div => Some("/"),
      BinOp::Pow => Some("^"),
      BinOp::To => Some("→"),
    }
  }
}

/// A variable occurrence. `metavar` marks placeholders introduced by
/// quantifier removal; `binder` marks occurrences still bound by an enclosing
/// quantifier inside the same statement (the capture side-condition of the
/// unifier keys off this). `con` is the variable's constraint from its
/// binder, when known (a set term, or `dom → cod` for function variables).
#[derive(Clone, Debug)]
pub struct Var {
  pub name: String,
  pub sort: Sort,
  pub metavar: bool,
  pub binder: bool,
  pub con: Option<Box<Term>>,
}

impl Var {
  pub fn new(name: impl Into<String>) -> Self {
    Var { name: name.into(), sort: Sort::Expr, metavar: false, binder: false, con: None }
  }

  pub fn meta(name: impl Into<String>) -> Self { Var { metavar: true, ..Var::new(name) } }

  pub fn pred_meta(name: impl Into<String>) -> Self {
    Var { sort: Sort::Pred, metavar: true, ..Var::new(name) }
  }
}

#[derive(Clone, Debug)]
pub enum Term {
  Var(Var),
  Num(u64),
  Bool(bool),
  /// A named constant known to the system (∅, ℕ, ℝ, a library-defined symbol, ...)
  Sym(String),
  /// Function application. The head is a variable so it can itself be a
  /// metavariable; `skolem` blocks re-skolemization of Skolem functions.
  Apply { f: Var, args: Vec<Term>, skolem: bool },
  Macro(MacroKind, Box<Term>),
  Not(Box<Term>),
  Quant(QuantKind, Var, Box<Term>),
  Bin(BinOp, Box<Term>, Box<Term>),
}

impl Term {
  pub fn not(t: Term) -> Term {
    match t {
      Term::Not(t) => *t,
      t => Term::Not(Box::new(t)),
    }
  }

  pub fn bin(op: BinOp, l: Term, r: Term) -> Term { Term::Bin(op, Box::new(l), Box::new(r)) }

  pub fn forall(v: Var, body: Term) -> Term { Term::Quant(QuantKind::Forall, v, Box::new(body)) }

  pub fn exists(v: Var, body: Term) -> Term { Term::Quant(QuantKind::Exists, v, Box::new(body)) }

  pub fn apply(f: Var, args: Vec<Term>) -> Term { Term::Apply { f, args, skolem: false } }

  /// The metavariable head of this term, if it is one (a bare metavariable or
  /// a metavariable-headed application).
  pub fn metavar_head(&self) -> Option<&Var> {
    match self {
      Term::Var(v) if v.metavar => Some(v),
      Term::Apply { f, .. } if f.metavar => Some(f),
      _ => None,
    }
  }

  /// True for formula-shaped terms, false for object-level expressions.
  pub fn is_predicate(&self) -> bool {
    match self {
      Term::Bool(_) | Term::Not(_) | Term::Quant(..) => true,
      Term::Bin(op, ..) => !matches!(
        op,
        BinOp::Union
          | BinOp::Inter
          | BinOp::Diff
          | BinOp::Add
          | BinOp::Sub
          | BinOp::Mul
          | BinOp::Div
          | BinOp::Pow
          | BinOp::To
      ),
      _ => false,
    }
  }

  /// True if the term contains a variable occurrence still bound by an
  /// enclosing quantifier. Such a term may not be bound to a metavariable
  /// (that would move the variable outside its binder's scope).
  pub fn contains_binder(&self) -> bool {
    match self {
      Term::Var(v) => v.binder,
      Term::Apply { f, args, .. } => f.binder || args.iter().any(Term::contains_binder),
      Term::Macro(_, t) | Term::Not(t) => t.contains_binder(),
      Term::Quant(_, _, body) => body.contains_binder(),
      Term::Bin(_, l, r) => l.contains_binder() || r.contains_binder(),
      Term::Num(_) | Term::Bool(_) | Term::Sym(_) => false,
    }
  }

  /// Mark every occurrence of `name` in the term as binder-bound. Called
  /// when a quantifier over `name` is constructed around it.
  pub fn mark_binder(&mut self, name: &str) { self.set_binder(name, true) }

  /// Clear binder marks for `name`, used when the binder for `name` is
  /// stripped and its occurrences become free (or metavariables).
  pub fn clear_binder(&mut self, name: &str) { self.set_binder(name, false) }

  fn set_binder(&mut self, name: &str, on: bool) {
    match self {
      Term::Var(v) =>
        if v.name == name {
          v.binder = on
        },
      Term::Apply { f, args, .. } => {
        if f.name == name {
          f.binder = on
        }
        args.iter_mut().for_each(|t| t.set_binder(name, on))
      }
      Term::Macro(_, t) | Term::Not(t) => t.set_binder(name, on),
      Term::Quant(_, v, body) =>
        if v.name != name {
          body.set_binder(name, on)
        },
      Term::Bin(_, l, r) => {
        l.set_binder(name, on);
        r.set_binder(name, on)
      }
      Term::Num(_) | Term::Bool(_) | Term::Sym(_) => {}
    }
  }

  /// Names of all metavariables occurring in the term, each once.
  pub fn metavars(&self) -> Vec<String> {
    let mut used = vec![];
    self.metavars_into(&mut used);
    used
  }

  fn metavars_into(&self, used: &mut Vec<String>) {
    match self {
      Term::Var(v) =>
        if v.metavar && !used.iter().any(|n| *n == v.name) {
          used.push(v.name.clone())
        },
      Term::Apply { f, args, .. } => {
        if f.metavar && !used.iter().any(|n| *n == f.name) {
          used.push(f.name.clone())
        }
        args.iter().for_each(|t| t.metavars_into(used))
      }
      Term::Macro(_, t) | Term::Not(t) => t.metavars_into(used),
      Term::Quant(_, _, body) => body.metavars_into(used),
      Term::Bin(_, l, r) => {
        l.metavars_into(used);
        r.metavars_into(used)
      }
      Term::Num(_) | Term::Bool(_) | Term::Sym(_) => {}
    }
  }

  /// Names of all variable occurrences (bound, free or metavariable), each
  /// once, in rendered order.
  pub fn var_names(&self) -> Vec<String> {
    fn go(t: &Term, out: &mut Vec<String>) {
      match t {
        Term::Var(v) =>
          if !out.iter().any(|n| n == &v.name) {
            out.push(v.name.clone())
          },
        Term::Apply { args, .. } => args.iter().for_each(|a| go(a, out)),
        Term::Macro(_, t) | Term::Not(t) => go(t, out),
        Term::Quant(_, _, body) => go(body, out),
        Term::Bin(_, l, r) => {
          go(l, out);
          go(r, out)
        }
        Term::Num(_) | Term::Bool(_) | Term::Sym(_) => {}
      }
    }
    let mut out = vec![];
    go(self, &mut out);
    out
  }

  /// The complement (logical negation pushed through one level of structure):
  /// quantifiers flip, relations flip to their opposites, De Morgan over
  /// ∧/∨, and ¬¬P collapses.
  pub fn complement(&self) -> Term {
    match self {
      Term::Quant(QuantKind::Forall, v, body) =>
        Term::Quant(QuantKind::Exists, v.clone(), Box::new(body.complement())),
      Term::Quant(QuantKind::Exists, v, body) =>
        Term::Quant(QuantKind::Forall, v.clone(), Box::new(body.complement())),
      Term::Bin(BinOp::Eq, l, r) => Term::bin(BinOp::Neq, (**l).clone(), (**r).clone()),
      Term::Bin(BinOp::Neq, l, r) => Term::bin(BinOp::Eq, (**l).clone(), (**r).clone()),
      Term::Bin(BinOp::Lt, l, r) => Term::bin(BinOp::Geq, (**l).clone(), (**r).clone()),
      Term::Bin(BinOp::Gt, l, r) => Term::bin(BinOp::Leq, (**l).clone(), (**r).clone()),
      Term::Bin(BinOp::Leq, l, r) => Term::bin(BinOp::Gt, (**l).clone(), (**r).clone()),
      Term::Bin(BinOp::Geq, l, r) => Term::bin(BinOp::Lt, (**l).clone(), (**r).clone()),
      Term::Bin(BinOp::And, l, r) => Term::bin(BinOp::Or, l.complement(), r.complement()),
      Term::Bin(BinOp::Or, l, r) => Term::bin(BinOp::And, l.complement(), r.complement()),
      Term::Not(t) => (**t).clone(),
      Term::Bool(b) => Term::Bool(!b),
      t => Term::Not(Box::new(t.clone())),
    }
  }

  /// Constants used in the statement: symbol names and operator names, each
  /// once, sorted. Variables and logical structure do not contribute.
  pub fn constants(&self) -> Vec<String> {
    let mut out = vec![];
    self.constants_into(&mut out);
    out.sort();
    out
  }

  fn constants_into(&self, out: &mut Vec<String>) {
    fn add(out: &mut Vec<String>, name: &str) {
      if !out.iter().any(|n| n == name) {
        out.push(name.to_owned())
      }
    }
    match self {
      Term::Sym(name) => add(out, name),
      // skolem functions and applied variables are local, not library constants
      Term::Apply { args, .. } => args.iter().for_each(|t| t.constants_into(out)),
      Term::Macro(_, t) | Term::Not(t) => t.constants_into(out),
      Term::Quant(_, v, body) => {
        if let Some(c) = &v.con {
          c.constants_into(out)
        }
        body.constants_into(out)
      }
      Term::Bin(op, l, r) => {
        if let Some(name) = op.constant() {
          add(out, name)
        }
        l.constants_into(out);
        r.constants_into(out)
      }
      Term::Var(_) | Term::Num(_) | Term::Bool(_) => {}
    }
  }

  /// Constants of the negated reading.
  pub fn neg_constants(&self) -> Vec<String> { self.complement().constants() }
}

/// Which targets a hypothesis may contribute to. `Any` is the sentinel for
/// "all targets" (a hypothesis not derived from any particular target).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deps {
  Any,
  Tars(Vec<TarId>),
}

impl Deps {
  pub fn one(t: TarId) -> Deps { Deps::Tars(vec![t]) }
}

/// One entry of the leading quantifier zone shared by all statements of a
/// tableau. `Const` records a metavariable or Skolem constant declaration.
#[derive(Clone, Debug)]
pub enum QzItem {
  Forall(Var),
  Exists(Var),
  Const(Var),
}

impl QzItem {
  pub fn var(&self) -> &Var {
    match self {
      QzItem::Forall(v) | QzItem::Exists(v) | QzItem::Const(v) => v,
    }
  }
}

/// Per-statement constant signature cache.
#[derive(Clone, Debug, Default)]
pub struct Sig {
  pub pos: Vec<String>,
  pub neg: Vec<String>,
}

impl Sig {
  pub fn of(t: &Term) -> Sig { Sig { pos: t.constants(), neg: t.neg_constants() } }
}

/// The mutable proof state of one search branch. Hypothesis and target
/// stores are append-only; logical removal only ever toggles the active
/// sets, so indices handed out earlier stay valid. Cloning the tableau (for
/// a disjunctive case split) deep-copies the whole aggregate at once.
#[derive(Clone, Debug, Default)]
pub struct Tableau {
  pub qz: Vec<QzItem>,
  pub hyps: IdxVec<HypId, Term>,
  pub tars: IdxVec<TarId, Term>,
  pub active_hyp: BTreeSet<HypId>,
  pub active_tar: BTreeSet<TarId>,
  pub dep: HashMap<HypId, Deps>,
  /// incrementally extended caches, parallel to `hyps`/`tars`
  pub hyp_sig: IdxVec<HypId, Sig>,
  pub tar_sig: IdxVec<TarId, Sig>,
  /// (hypothesis, target) pairs where the hypothesis came from splitting
  /// that target and must not be used to reprove it
  pub twins: BTreeSet<(HypId, TarId)>,
  pub maximal: BTreeSet<String>,
  /// library records already materialized into this branch, by file offset
  pub loaded: HashMap<u64, HypId>,
  /// targets already reasoned backward from once
  pub reasoned: BTreeSet<TarId>,
  /// subscript counters for metavariable relabeling
  pub subscripts: HashMap<String, u32>,
}

impl Tableau {
  pub fn new() -> Self { Self::default() }

  pub fn append_hyp(&mut self, t: Term, dep: Deps) -> HypId {
    let i = self.hyps.push(t);
    self.active_hyp.insert(i);
    self.dep.insert(i, dep);
    i
  }

  pub fn append_tar(&mut self, t: Term) -> TarId {
    let i = self.tars.push(t);
    self.active_tar.insert(i);
    i
  }

  /// In-place rewrite of an existing statement; the index stays valid.
  pub fn replace_hyp(&mut self, i: HypId, t: Term) { self.hyps[i] = t }

  pub fn replace_tar(&mut self, i: TarId, t: Term) { self.tars[i] = t }

  pub fn dependency(&self, i: HypId) -> Deps { self.dep.get(&i).cloned().unwrap_or(Deps::Any) }

  /// Extend the signature caches to cover statements appended since the last
  /// refresh. Cached entries are never recomputed.
  pub fn refresh_signatures(&mut self) {
    while self.hyp_sig.len() < self.hyps.len() {
      let i = self.hyp_sig.peek();
      let sig = Sig::of(&self.hyps[i]);
      self.hyp_sig.push(sig);
    }
    while self.tar_sig.len() < self.tars.len() {
      let i = self.tar_sig.peek();
      let sig = Sig::of(&self.tars[i]);
      self.tar_sig.push(sig);
    }
  }

  /// All constants currently in play, pooled over active statements.
  pub fn constant_pool(&self) -> Vec<String> {
    let mut pool: Vec<String> = vec![];
    let mut add = |cs: &Vec<String>, pool: &mut Vec<String>| {
      for c in cs {
        if !pool.iter().any(|p| p == c) {
          pool.push(c.clone())
        }
      }
    };
    for (i, sig) in self.hyp_sig.enum_iter() {
      if self.active_hyp.contains(&i) {
        add(&sig.pos, &mut pool)
      }
    }
    for (i, sig) in self.tar_sig.enum_iter() {
      if self.active_tar.contains(&i) {
        add(&sig.pos, &mut pool)
      }
    }
    pool
  }

  /// Fresh subscripted name for `name`, bumping the per-tableau counter.
  pub fn fresh_name(&mut self, name: &str) -> String {
    let base = match name.rfind('_') {
      Some(i) if !name[i + 1..].is_empty() && name[i + 1..].chars().all(|c| c.is_ascii_digit()) =>
        &name[..i],
      _ => name,
    };
    let n = self.subscripts.entry(base.to_owned()).or_insert(0);
    let new = format!("{}_{}", base, n);
    *n += 1;
    new
  }
}

/// Node in the target dependency tree: proving everything in `andlist`
/// suffices to prove `num`. The root carries `num = None`.
#[derive(Clone, Debug)]
pub struct TargetNode {
  pub num: Option<TarId>,
  pub proved: bool,
  pub andlist: Vec<TargetNode>,
  pub reason: Option<Reason>,
}

/// What discharged a target: a hypothesis that unified with it, or a
/// contradictory pair of hypotheses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reason {
  Hyp(HypId),
  Contra(HypId, HypId),
}

impl TargetNode {
  pub fn new(num: TarId) -> Self {
    TargetNode { num: Some(num), proved: false, andlist: vec![], reason: None }
  }

  /// The root of a fresh attempt, with one child per initial target.
  pub fn root(tars: impl IntoIterator<Item = TarId>) -> Self {
    TargetNode {
      num: None,
      proved: false,
      andlist: tars.into_iter().map(TargetNode::new).collect(),
      reason: None,
    }
  }

  pub fn find(&self, i: TarId) -> Option<&TargetNode> {
    if self.num == Some(i) {
      return Some(self)
    }
    self.andlist.iter().find_map(|p| p.find(i))
  }

  fn find_mut(&mut self, i: TarId) -> Option<&mut TargetNode> {
    if self.num == Some(i) {
      return Some(self)
    }
    self.andlist.iter_mut().find_map(|p| p.find_mut(i))
  }

  /// Record that proving `j` alone suffices to prove `i`.
  pub fn add_descendant(&mut self, i: TarId, j: TarId) -> bool {
    match self.find_mut(i) {
      Some(node) => {
        node.andlist = vec![TargetNode::new(j)];
        true
      }
      None => false,
    }
  }

  /// Record that `j` must be proved in addition to `i` (conjunction split).
  /// Hypotheses usable for `i` become usable for `j` as well.
  pub fn add_sibling(&mut self, tl: &mut Tableau, i: TarId, j: TarId) -> bool {
    fn go(node: &mut TargetNode, i: TarId, j: TarId) -> bool {
      if node.andlist.iter().any(|p| p.num == Some(i)) {
        node.andlist.push(TargetNode::new(j));
        return true
      }
      node.andlist.iter_mut().any(|p| go(p, i, j))
    }
    if go(self, i, j) {
      for deps in tl.dep.values_mut() {
        if let Deps::Tars(ts) = deps {
          if ts.contains(&i) && !ts.contains(&j) {
            ts.push(j)
          }
        }
      }
      true
    } else {
      false
    }
  }

  pub fn mark_proved(&mut self, i: TarId, reason: Reason) -> bool {
    match self.find_mut(i) {
      Some(node) => {
        node.proved = true;
        node.reason = Some(reason);
        true
      }
      None => false,
    }
  }

  /// True if `i` is a descendant of `j` (or `i = j`): discharging `i` alone
  /// does not discharge `j`, but closing `j`'s whole subtree makes `i`
  /// irrelevant.
  pub fn target_depends(&self, i: TarId, j: TarId) -> bool {
    match self.find(j) {
      Some(root) => root.find(i).is_some(),
      None => false,
    }
  }

  /// True when the whole tree is closed, propagating provedness upward:
  /// a node is proved once all members of its andlist are.
  pub fn all_proved(&mut self) -> bool {
    if self.proved {
      return true
    }
    if !self.andlist.is_empty() {
      let mut proved = true;
      for p in &mut self.andlist {
        proved &= p.all_proved();
      }
      self.proved = proved;
    }
    self.proved
  }
}

impl Tableau {
  /// Can hypothesis `j` contribute to proving target `i`?
  pub fn deps_compatible(&self, ttree: &TargetNode, i: TarId, j: HypId) -> bool {
    match self.dependency(j) {
      Deps::Any => true,
      Deps::Tars(ds) => ds.iter().any(|&d| ttree.target_depends(i, d)),
    }
  }

  /// The deepest common targets two dependency lists may both help prove:
  /// for each cross pair, the deeper of the two targets survives when it is
  /// reachable from the other. The ANY sentinel acts as the identity.
  fn intersect(ttree: &TargetNode, a: &Deps, b: &Deps) -> Deps {
    match (a, b) {
      (Deps::Any, d) | (d, Deps::Any) => d.clone(),
      (Deps::Tars(da), Deps::Tars(db)) => {
        let mut deps = vec![];
        for &d1 in db {
          for &d2 in da {
            let (lo, hi) = if d1 < d2 { (d1, d2) } else { (d2, d1) };
            if ttree.target_depends(hi, lo) && !deps.contains(&hi) {
              deps.push(hi)
            }
          }
        }
        Deps::Tars(deps)
      }
    }
  }

  /// Intersection of the dependencies of hypotheses `i` and `j`.
  pub fn deps_intersect(&self, ttree: &TargetNode, i: HypId, j: HypId) -> Deps {
    Self::intersect(ttree, &self.dependency(i), &self.dependency(j))
  }

  /// Forward: "intersection" of `dep_list` with hypothesis `j`'s dependency.
  /// Backward: `dep_list` itself if target `j` is reachable from it, else
  /// `None` (the operands may not be combined).
  pub fn target_compatible(
    &self, ttree: &TargetNode, dep_list: &Deps, j: usize, forward: bool,
  ) -> Option<Deps> {
    if forward {
      let j = HypId::from_usize(j);
      Some(Self::intersect(ttree, dep_list, &self.dependency(j)))
    } else {
      let j = TarId::from_usize(j);
      match dep_list {
        Deps::Any => Some(Deps::Any),
        Deps::Tars(ds) =>
          if ds.iter().any(|&d| ttree.target_depends(j, d)) {
            Some(dep_list.clone())
          } else {
            None
          },
      }
    }
  }
}

/// Which statements a mover changed, for the presentation layer.
#[derive(Clone, Debug, Default)]
pub struct Diff {
  pub hyps: Vec<HypId>,
  pub tars: Vec<TarId>,
}

impl Diff {
  pub fn hyp(i: HypId) -> Diff { Diff { hyps: vec![i], tars: vec![] } }

  pub fn tar(i: TarId) -> Diff { Diff { hyps: vec![], tars: vec![i] } }

  pub fn merge(&mut self, other: Diff) {
    for i in other.hyps {
      if !self.hyps.contains(&i) {
        self.hyps.push(i)
      }
    }
    for i in other.tars {
      if !self.tars.contains(&i) {
        self.tars.push(i)
      }
    }
  }

  pub fn is_empty(&self) -> bool { self.hyps.is_empty() && self.tars.is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn complement_relations_flip() {
    let t = Term::bin(BinOp::Lt, Term::Var(Var::new("x")), Term::Num(3));
    assert!(matches!(t.complement(), Term::Bin(BinOp::Geq, ..)));
    let t = Term::bin(BinOp::Eq, Term::Var(Var::new("x")), Term::Num(3));
    assert!(matches!(t.complement(), Term::Bin(BinOp::Neq, ..)));
  }

  #[test]
  fn complement_de_morgan_and_double_negation() {
    let p = Term::bin(BinOp::Eq, Term::Var(Var::new("x")), Term::Num(0));
    let q = Term::bin(BinOp::Eq, Term::Var(Var::new("y")), Term::Num(1));
    let t = Term::bin(BinOp::And, p.clone(), q);
    let Term::Bin(BinOp::Or, l, _) = t.complement() else { panic!() };
    assert!(matches!(*l, Term::Bin(BinOp::Neq, ..)));
    assert!(matches!(Term::not(Term::not(p)), Term::Bin(BinOp::Eq, ..)));
  }

  #[test]
  fn index_stability_under_append_and_rewrite() {
    let mut tl = Tableau::new();
    let h0 = tl.append_hyp(Term::Bool(true), Deps::Any);
    let h1 = tl.append_hyp(Term::Bool(false), Deps::Any);
    tl.replace_hyp(h0, Term::Num(7));
    let h2 = tl.append_hyp(Term::Num(9), Deps::Any);
    assert!(matches!(tl.hyps[h0], Term::Num(7)));
    assert!(matches!(tl.hyps[h1], Term::Bool(false)));
    assert!(matches!(tl.hyps[h2], Term::Num(9)));
    assert_eq!(h2, HypId(2));
  }

  #[test]
  fn target_tree_descendants_and_siblings() {
    let mut tl = Tableau::new();
    let t0 = tl.append_tar(Term::Bool(true));
    let t1 = tl.append_tar(Term::Bool(true));
    let t2 = tl.append_tar(Term::Bool(true));
    let h = tl.append_hyp(Term::Bool(true), Deps::one(t1));
    let mut tree = TargetNode::root([t0]);
    assert!(tree.add_descendant(t0, t1));
    assert!(tree.add_sibling(&mut tl, t1, t2));
    assert!(tree.target_depends(t1, t0));
    assert!(tree.target_depends(t2, t0));
    assert!(!tree.target_depends(t0, t1));
    // the sibling inherits usability of hyps that proved t1
    assert_eq!(tl.dependency(h), Deps::Tars(vec![t1, t2]));
  }

  #[test]
  fn target_tree_proved_propagates() {
    let mut tree = TargetNode::root([TarId(0)]);
    tree.add_descendant(TarId(0), TarId(1));
    assert!(!tree.all_proved());
    tree.mark_proved(TarId(1), Reason::Hyp(HypId(0)));
    assert!(tree.all_proved());
  }

  #[test]
  fn signature_cache_is_incremental() {
    let mut tl = Tableau::new();
    tl.append_hyp(
      Term::bin(BinOp::Elem, Term::Var(Var::new("x")), Term::Sym("ℕ".into())),
      Deps::Any,
    );
    tl.refresh_signatures();
    // constants sort bytewise, and the named set ℕ counts as one
    assert_eq!(tl.hyp_sig[HypId(0)].pos, vec!["ℕ".to_string(), "∈".to_string()]);
    tl.append_hyp(Term::bin(BinOp::Leq, Term::Num(0), Term::Var(Var::new("x"))), Deps::Any);
    tl.refresh_signatures();
    assert_eq!(tl.hyp_sig.len(), 2);
    assert_eq!(tl.hyp_sig[HypId(1)].pos, vec!["≤".to_string()]);
  }

  #[test]
  fn deps_intersect_any_is_identity() {
    let mut tl = Tableau::new();
    let t0 = tl.append_tar(Term::Bool(true));
    let h0 = tl.append_hyp(Term::Bool(true), Deps::Any);
    let h1 = tl.append_hyp(Term::Bool(true), Deps::one(t0));
    let tree = TargetNode::root([t0]);
    assert_eq!(tl.deps_intersect(&tree, h0, h1), Deps::one(t0));
    assert_eq!(tl.deps_intersect(&tree, h1, h0), Deps::one(t0));
  }
}

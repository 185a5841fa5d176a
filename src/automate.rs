//! The waterfall search driver. One proof attempt keeps a stack of
//! tableaus (one per open disjunctive case) and, per target, runs a fixed
//! cascade of rules until the target closes or nothing fires. Failure on
//! any target fails the whole attempt; the engine is satisficing, not
//! exhaustive.

use crate::consts::GRAPH;
use crate::error::FatalError;
use crate::library::{conclusion_constants, LibraryIndex, Record, SigShape};
use crate::moves::{self, cleanup, expansion, modus_ponens, modus_tollens};
use crate::trace::Present;
use crate::types::{
  BinOp, Deps, Diff, HypId, Idx, QuantKind, Reason, Tableau, TarId, TargetNode, Term,
};
use crate::unify::{check_macros, substitute, unify, Assign};
use crate::vprintln;
use enum_map::{Enum, EnumMap};
use itertools::Itertools;

/// One open case: a tableau and its target dependency tree. Case splits
/// deep-copy the whole pair at once, so branches never alias.
#[derive(Clone, Debug)]
pub struct Branch {
  pub tableau: Tableau,
  pub ttree: TargetNode,
}

#[derive(Debug)]
pub enum Outcome {
  Proved,
  /// The branch stack as it stood when a target ran out of rules, current
  /// branch first.
  Failed(Vec<Branch>),
}

impl Outcome {
  pub fn is_proved(&self) -> bool { matches!(self, Outcome::Proved) }
}

/// The waterfall rules, in firing priority order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Enum)]
pub enum Rule {
  Completion,
  TargetDisjunction,
  HypSplit,
  BackwardMp,
  ForwardMp,
  BackwardLibrary,
  ForwardLibrary,
  TargetExpansion,
  HypExpansion,
}

/// Hard ceiling on successful rule firings per attempt; exceeding it is a
/// normal negative result. Guards against derivation cycles the statement
/// dedup cannot see (e.g. two theorems that rewrite a goal back and forth).
const MAX_STEPS: u32 = 500;

pub struct Driver<'a, P> {
  index: &'a LibraryIndex,
  present: &'a mut P,
  /// optional sort checker applied to every appended statement; a rejection
  /// is attempt-fatal
  pub sort_check: Option<fn(&Term) -> Result<(), String>>,
  pub stats: EnumMap<Rule, u32>,
  steps: u32,
}

impl<'a, P: Present> Driver<'a, P> {
  pub fn new(index: &'a LibraryIndex, present: &'a mut P) -> Self {
    Driver { index, present, sort_check: None, stats: EnumMap::default(), steps: 0 }
  }

  /// Run a whole proof attempt. The tableau's active targets become the
  /// root-level goals of a fresh dependency tree.
  pub fn automate(&mut self, mut tableau: Tableau) -> Result<Outcome, FatalError> {
    tableau.refresh_signatures();
    let roots: Vec<TarId> = tableau.active_tar.iter().copied().collect();
    let ttree = TargetNode::root(roots);
    let mut stack = vec![Branch { tableau, ttree }];
    while let Some(mut branch) = stack.pop() {
      loop {
        // newest targets first: sufficient conditions and conjunction parts
        // are discharged before the goals they serve
        let Some(tar) = branch.tableau.active_tar.iter().next_back().copied() else { break };
        if !self.waterfall(&mut branch, tar, &mut stack)? {
          let mut remaining = vec![branch];
          remaining.extend(stack.drain(..).rev());
          return Ok(Outcome::Failed(remaining))
        }
      }
    }
    Ok(Outcome::Proved)
  }

  fn waterfall(
    &mut self, b: &mut Branch, mut tar: TarId, stack: &mut Vec<Branch>,
  ) -> Result<bool, FatalError> {
    loop {
      if self.steps >= MAX_STEPS {
        vprintln!("step budget exhausted at target {tar:?}");
        return Ok(false)
      }
      // 0: normalize, then refresh caches for anything cleanup appended
      let diff = cleanup(&mut b.tableau, &mut b.ttree);
      if !diff.is_empty() {
        self.check_new(&b.tableau, &diff)?;
        self.present.present(&b.tableau, &diff);
      }
      // 1: completion
      if self.completion(b, tar) {
        self.stats[Rule::Completion] += 1;
        return Ok(true)
      }
      // 2: target disjunction becomes an implication for cleanup to split
      if matches!(b.tableau.tars[tar], Term::Bin(BinOp::Or, ..)) {
        self.target_disjunction(b, tar)?;
        continue
      }
      // 3: disjunctive hypothesis splits the tableau
      if self.hyp_split(b, tar, stack)? {
        continue
      }
      // 4: backward non-library reasoning
      if let Some(next) = self.backward_mp(b, tar)? {
        if let Some(j) = next {
          tar = j
        }
        continue
      }
      // 5: forward non-library reasoning
      if self.forward_mp(b)? {
        continue
      }
      // 6: backward library reasoning
      if let Some(next) = self.backward_library(b, tar)? {
        if let Some(j) = next {
          tar = j
        }
        continue
      }
      // 7: forward library reasoning
      if self.forward_library(b)? {
        continue
      }
      // 8: target definition expansion
      if self.expand(b, tar.into_usize(), false)? {
        continue
      }
      // 9: hypothesis definition expansion
      if self.expand_hyps(b)? {
        continue
      }
      vprintln!("no rule fires for target {tar:?}");
      return Ok(false)
    }
  }

  /// A target closes when an active, non-twinned, dependency-compatible
  /// hypothesis is literally false, unifies with it, or contradicts another
  /// such hypothesis. Unification bindings are applied to the whole
  /// tableau so sibling targets sharing a metavariable stay consistent.
  fn completion(&mut self, b: &mut Branch, tar: TarId) -> bool {
    let found = {
      let tl = &b.tableau;
      let usable: Vec<HypId> = tl
        .active_hyp
        .iter()
        .copied()
        .filter(|&h| !tl.twins.contains(&(h, tar)) && tl.deps_compatible(&b.ttree, tar, h))
        .collect();
      let target = &tl.tars[tar];
      let mut found = None;
      for &h in &usable {
        if matches!(tl.hyps[h], Term::Bool(false)) {
          found = Some((Reason::Hyp(h), vec![]));
          break
        }
        if let Some((assign, macros)) = unify(&tl.hyps[h], target, vec![]) {
          if check_macros(&macros, &assign, &tl.qz) {
            found = Some((Reason::Hyp(h), assign));
            break
          }
        }
      }
      if found.is_none() {
        for (&h1, &h2) in usable.iter().tuple_combinations() {
          let c = tl.hyps[h1].complement();
          if let Some((assign, macros)) = unify(&c, &tl.hyps[h2], vec![]) {
            if check_macros(&macros, &assign, &tl.qz) {
              found = Some((Reason::Contra(h1, h2), assign));
              break
            }
          }
        }
      }
      found
    };
    match found {
      Some((reason, assign)) => self.close(b, tar, reason, &assign),
      None => false,
    }
  }

  fn close(&mut self, b: &mut Branch, tar: TarId, reason: Reason, assign: &Assign) -> bool {
    if !assign.is_empty() {
      let mut diff = Diff::default();
      for i in b.tableau.active_hyp.clone() {
        let new = substitute(b.tableau.hyps[i].clone(), assign);
        if new.to_string() != b.tableau.hyps[i].to_string() {
          b.tableau.hyp_sig[i] = crate::types::Sig::of(&new);
          b.tableau.replace_hyp(i, new);
          diff.merge(Diff::hyp(i));
        }
      }
      for i in b.tableau.active_tar.clone() {
        let new = substitute(b.tableau.tars[i].clone(), assign);
        if new.to_string() != b.tableau.tars[i].to_string() {
          b.tableau.tar_sig[i] = crate::types::Sig::of(&new);
          b.tableau.replace_tar(i, new);
          diff.merge(Diff::tar(i));
        }
      }
      if !diff.is_empty() {
        self.present.present(&b.tableau, &diff);
      }
    }
    vprintln!("target {tar:?} closed by {reason:?}");
    b.ttree.mark_proved(tar, reason);
    b.ttree.all_proved();
    // retire every target made irrelevant by the closure
    let mut gone = vec![];
    collect_proved(&b.ttree, false, &mut gone);
    for t in gone {
      b.tableau.active_tar.remove(&t);
    }
    true
  }

  /// Move dangling variables (occurring in only one disjunct) to the left,
  /// then rewrite `P ∨ Q` to `¬P ⇒ Q`; the next cleanup pass turns the
  /// antecedent into a hypothesis.
  fn target_disjunction(&mut self, b: &mut Branch, tar: TarId) -> Result<(), FatalError> {
    let Term::Bin(BinOp::Or, l, r) = b.tableau.tars[tar].clone() else { return Ok(()) };
    let (lv, rv) = (l.var_names(), r.var_names());
    let l_dangling = lv.iter().any(|v| !rv.contains(v));
    let r_dangling = rv.iter().any(|v| !lv.contains(v));
    let (l, r) = if r_dangling && !l_dangling { (r, l) } else { (l, r) };
    b.tableau.replace_tar(tar, Term::bin(BinOp::Implies, l.complement(), *r));
    let diff = Diff::tar(tar);
    self.fired(Rule::TargetDisjunction, &b.tableau, &diff)
  }

  fn hyp_split(
    &mut self, b: &mut Branch, tar: TarId, stack: &mut Vec<Branch>,
  ) -> Result<bool, FatalError> {
    let Some(h) = b
      .tableau
      .active_hyp
      .iter()
      .copied()
      .find(|&h| matches!(b.tableau.hyps[h], Term::Bin(BinOp::Or, ..)))
    else {
      return Ok(false)
    };
    let Term::Bin(BinOp::Or, l, r) = b.tableau.hyps[h].clone() else { return Ok(false) };
    // the clone takes the complementary case; this branch keeps the target
    let mut other = b.clone();
    other.tableau.replace_hyp(h, Term::bin(BinOp::And, l.complement(), *r));
    stack.push(other);
    b.tableau.replace_hyp(h, *l);
    vprintln!("split on hypothesis {h:?} for target {tar:?}");
    let diff = Diff::hyp(h);
    self.fired(Rule::HypSplit, &b.tableau, &diff)?;
    Ok(true)
  }

  /// Step 4. Returns `Some(new_target)` when a rule fired; the waterfall
  /// switches to the appended sufficient target, if any.
  fn backward_mp(&mut self, b: &mut Branch, tar: TarId) -> Result<Option<Option<TarId>>, FatalError> {
    let imps: Vec<HypId> = b
      .tableau
      .active_hyp
      .iter()
      .copied()
      .filter(|&h| !b.tableau.twins.contains(&(h, tar)) && implication_shaped(&b.tableau.hyps[h]))
      .collect();
    for h in imps {
      for tollens in [false, true] {
        let moved = if tollens {
          modus_tollens(&mut b.tableau, &mut b.ttree, h, &[tar.into_usize()], false)
        } else {
          modus_ponens(&mut b.tableau, &mut b.ttree, h, &[tar.into_usize()], false)
        };
        if let Some(diff) = moved {
          if !self.accept_hyps(&mut b.tableau, &diff) {
            continue
          }
          self.fired(Rule::BackwardMp, &b.tableau, &diff)?;
          return Ok(Some(diff.tars.first().copied()))
        }
      }
    }
    Ok(None)
  }

  /// Step 5: every (implication, premise) pair of active hypotheses.
  fn forward_mp(&mut self, b: &mut Branch) -> Result<bool, FatalError> {
    let (imps, premises): (Vec<HypId>, Vec<HypId>) = b
      .tableau
      .active_hyp
      .iter()
      .copied()
      .partition(|&h| implication_shaped(&b.tableau.hyps[h]));
    for &h in &imps {
      for &p in &premises {
        for tollens in [false, true] {
          let moved = if tollens {
            modus_tollens(&mut b.tableau, &mut b.ttree, h, &[p.into_usize()], true)
          } else {
            modus_ponens(&mut b.tableau, &mut b.ttree, h, &[p.into_usize()], true)
          };
          if let Some(diff) = moved {
            if !self.accept_hyps(&mut b.tableau, &diff) {
              continue
            }
            self.fired(Rule::ForwardMp, &b.tableau, &diff)?;
            return Ok(true)
          }
        }
      }
    }
    Ok(false)
  }

  /// Step 6: candidate theorems gated by maximal constants, then by the
  /// ratio heuristic, then by a trial unification on a throwaway clone;
  /// only a candidate that survives all three is loaded permanently.
  fn backward_library(
    &mut self, b: &mut Branch, tar: TarId,
  ) -> Result<Option<Option<TarId>>, FatalError> {
    let index = self.index;
    let maximal: Vec<String> = b.tableau.maximal.iter().cloned().collect();
    for (ri, negate) in index.filter_theorems(&GRAPH, &maximal, false) {
      let rec = &index.records[ri];
      let sig = if negate { &rec.neg_sig } else { &rec.sig };
      let others: Vec<TarId> =
        b.tableau.active_tar.iter().copied().filter(|&j| j != tar).collect();
      if !ratio_allows(sig, others.iter().map(|&j| &b.tableau.tar_sig[j].pos)) {
        continue
      }
      let thm = rec.materialize()?;
      let mut trial = b.clone();
      let th = trial.tableau.append_hyp(thm.clone(), Deps::Any);
      moves::refresh(&mut trial.tableau);
      let trial_ok = if negate {
        modus_tollens(&mut trial.tableau, &mut trial.ttree, th, &[tar.into_usize()], false)
      } else {
        modus_ponens(&mut trial.tableau, &mut trial.ttree, th, &[tar.into_usize()], false)
      };
      let Some(trial_diff) = trial_ok else { continue };
      // judged on the trial copy, so a duplicate product leaves no trace
      // of the theorem in the real tableau
      if !hyps_fresh(&trial.tableau, &trial_diff) {
        continue
      }
      let h = self.load(&mut b.tableau, rec, thm);
      let moved = if negate {
        modus_tollens(&mut b.tableau, &mut b.ttree, h, &[tar.into_usize()], false)
      } else {
        modus_ponens(&mut b.tableau, &mut b.ttree, h, &[tar.into_usize()], false)
      };
      if let Some(diff) = moved {
        if !self.accept_hyps(&mut b.tableau, &diff) {
          continue
        }
        vprintln!("loaded '{}' backward for target {tar:?}", rec.title);
        self.fired(Rule::BackwardLibrary, &b.tableau, &diff)?;
        return Ok(Some(diff.tars.first().copied()))
      }
    }
    Ok(None)
  }

  /// Step 7: symmetric over active non-implication hypotheses.
  fn forward_library(&mut self, b: &mut Branch) -> Result<bool, FatalError> {
    let index = self.index;
    let maximal: Vec<String> = b.tableau.maximal.iter().cloned().collect();
    let premises: Vec<HypId> = b
      .tableau
      .active_hyp
      .iter()
      .copied()
      .filter(|&h| !implication_shaped(&b.tableau.hyps[h]))
      .collect();
    for (ri, negate) in index.filter_theorems(&GRAPH, &maximal, true) {
      let rec = &index.records[ri];
      let sig = if negate { &rec.neg_sig } else { &rec.sig };
      if !ratio_allows(sig, premises.iter().map(|&p| &b.tableau.hyp_sig[p].pos)) {
        continue
      }
      let thm = rec.materialize()?;
      for &p in &premises {
        let mut trial = b.clone();
        let th = trial.tableau.append_hyp(thm.clone(), Deps::Any);
        moves::refresh(&mut trial.tableau);
        let trial_ok = if negate {
          modus_tollens(&mut trial.tableau, &mut trial.ttree, th, &[p.into_usize()], true)
        } else {
          modus_ponens(&mut trial.tableau, &mut trial.ttree, th, &[p.into_usize()], true)
        };
        let Some(trial_diff) = trial_ok else { continue };
        if !hyps_fresh(&trial.tableau, &trial_diff) {
          continue
        }
        let h = self.load(&mut b.tableau, rec, thm.clone());
        let moved = if negate {
          modus_tollens(&mut b.tableau, &mut b.ttree, h, &[p.into_usize()], true)
        } else {
          modus_ponens(&mut b.tableau, &mut b.ttree, h, &[p.into_usize()], true)
        };
        if let Some(diff) = moved {
          if !self.accept_hyps(&mut b.tableau, &diff) {
            continue
          }
          vprintln!("loaded '{}' forward against {p:?}", rec.title);
          self.fired(Rule::ForwardLibrary, &b.tableau, &diff)?;
          return Ok(true)
        }
      }
    }
    Ok(false)
  }

  /// Steps 8 and 9: unfold the first applicable definition at the
  /// outermost level of the statement.
  fn expand(&mut self, b: &mut Branch, idx: usize, is_hyp: bool) -> Result<bool, FatalError> {
    let constants = if is_hyp {
      b.tableau.hyp_sig[HypId::from_usize(idx)].pos.clone()
    } else {
      b.tableau.tar_sig[TarId::from_usize(idx)].pos.clone()
    };
    let index = self.index;
    for ri in index.filter_definitions(&constants) {
      let defn = index.records[ri].materialize()?;
      if let Some(diff) = expansion(&mut b.tableau, &defn, idx, is_hyp, 0) {
        vprintln!("expanded '{}' in {} {idx}", index.records[ri].title,
          if is_hyp { "hypothesis" } else { "target" });
        let rule = if is_hyp { Rule::HypExpansion } else { Rule::TargetExpansion };
        // the statement changed in place; its cached signature is stale
        if is_hyp {
          let i = HypId::from_usize(idx);
          b.tableau.hyp_sig[i] = crate::types::Sig::of(&b.tableau.hyps[i]);
        } else {
          let i = TarId::from_usize(idx);
          b.tableau.tar_sig[i] = crate::types::Sig::of(&b.tableau.tars[i]);
        }
        self.fired(rule, &b.tableau, &diff)?;
        return Ok(true)
      }
    }
    Ok(false)
  }

  fn expand_hyps(&mut self, b: &mut Branch) -> Result<bool, FatalError> {
    let hyps: Vec<HypId> = b.tableau.active_hyp.iter().copied().collect();
    for h in hyps {
      if self.expand(b, h.into_usize(), true)? {
        return Ok(true)
      }
    }
    Ok(false)
  }

  fn load(&mut self, tl: &mut Tableau, rec: &Record, thm: Term) -> HypId {
    match tl.loaded.get(&rec.offset).copied() {
      Some(h) => h,
      None => {
        let h = tl.append_hyp(thm, Deps::Any);
        tl.loaded.insert(rec.offset, h);
        moves::refresh(tl);
        h
      }
    }
  }

  /// Reject a move whose only product duplicates an existing active
  /// hypothesis; the duplicate is deactivated (stores are append-only) and
  /// the caller moves on to the next candidate.
  fn accept_hyps(&mut self, tl: &mut Tableau, diff: &Diff) -> bool {
    if diff.hyps.is_empty() {
      return true
    }
    let mut fresh = false;
    for &h in &diff.hyps {
      let s = tl.hyps[h].to_string();
      if tl.active_hyp.iter().any(|&i| i != h && tl.hyps[i].to_string() == s) {
        tl.active_hyp.remove(&h);
      } else {
        fresh = true
      }
    }
    fresh
  }

  fn fired(&mut self, rule: Rule, tl: &Tableau, diff: &Diff) -> Result<(), FatalError> {
    self.stats[rule] += 1;
    self.steps += 1;
    self.check_new(tl, diff)?;
    self.present.present(tl, diff);
    Ok(())
  }

  fn check_new(&self, tl: &Tableau, diff: &Diff) -> Result<(), FatalError> {
    let Some(check) = self.sort_check else { return Ok(()) };
    for &h in &diff.hyps {
      check(&tl.hyps[h])
        .map_err(|msg| FatalError::SortFailure { stmt: tl.hyps[h].to_string(), msg })?;
    }
    for &t in &diff.tars {
      check(&tl.tars[t])
        .map_err(|msg| FatalError::SortFailure { stmt: tl.tars[t].to_string(), msg })?;
    }
    Ok(())
  }
}

/// Real unification is only paid for when strictly more of the measured
/// statements could syntactically match the candidate's relevant side than
/// provably cannot; with nothing to measure the check is vacuous.
fn ratio_allows<'a>(sig: &SigShape, others: impl Iterator<Item = &'a Vec<String>>) -> bool {
  let concl = conclusion_constants(sig);
  let (mut matches, mut nonmatches) = (0u32, 0u32);
  for consts in others {
    if consts.iter().all(|c| concl.contains(c)) {
      matches += 1
    } else {
      nonmatches += 1
    }
  }
  matches + nonmatches == 0 || matches > nonmatches
}

/// True when some appended hypothesis is new text among the active ones.
/// The library steps run this on their trial copy before committing to a
/// permanent load.
fn hyps_fresh(tl: &Tableau, diff: &Diff) -> bool {
  diff.hyps.is_empty()
    || diff.hyps.iter().any(|&h| {
      let s = tl.hyps[h].to_string();
      !tl.active_hyp.iter().any(|&i| i != h && tl.hyps[i].to_string() == s)
    })
}

fn implication_shaped(t: &Term) -> bool {
  let mut t = t;
  while let Term::Quant(QuantKind::Forall, _, b) = t {
    t = b
  }
  matches!(t, Term::Bin(BinOp::Implies, ..))
}

fn collect_proved(node: &TargetNode, above: bool, out: &mut Vec<TarId>) {
  let p = above || node.proved;
  if p {
    if let Some(i) = node.num {
      out.push(i)
    }
  }
  for c in &node.andlist {
    collect_proved(c, p, out)
  }
}

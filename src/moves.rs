//! The tableau mutation primitives. Every mover is all-or-nothing: on any
//! failure it returns `None` without touching the tableau, and on success it
//! reports which statement indices changed so the caller can refresh caches
//! and presentation.

use crate::types::{
  BinOp, Deps, Diff, HypId, Idx, QuantKind, QzItem, Tableau, TarId, TargetNode, Term, Var,
};
use crate::unify::{check_macros, subst, substitute, unify};
use memchr::memmem;

/// Rename every metavariable in `t` to a fresh subscripted name, carrying
/// constraints over into new quantifier-zone declarations. Used before
/// backward reasoning so the implication's metavariables cannot collide
/// with those already in the target.
pub fn relabel(tl: &mut Tableau, t: &Term) -> Term {
  let mut t = t.clone();
  for name in t.metavars() {
    let fresh = tl.fresh_name(&name);
    let mut mv = Var::meta(fresh);
    if let Some(q) = tl.qz.iter().find(|q| q.var().name == name) {
      mv.con = q.var().con.clone();
    }
    tl.qz.push(QzItem::Const(mv.clone()));
    t = subst(&t, &Var::meta(name), &Term::Var(mv));
  }
  t
}

/// Strip the leading universal quantifiers of `t`, replacing each bound
/// variable with a fresh metavariable declared in the quantifier zone
/// (a temporary existential placeholder local to one move).
pub fn unquantify(tl: &mut Tableau, t: &Term) -> Term {
  let mut body = t.clone();
  while let Term::Quant(QuantKind::Forall, v, b) = body {
    let mut mv = Var::meta(tl.fresh_name(&v.name));
    mv.con = v.con.clone();
    body = *b;
    body.clear_binder(&v.name);
    body = subst(&body, &v, &Term::Var(mv.clone()));
    tl.qz.push(QzItem::Const(mv));
  }
  body
}

fn conjoin(mut ts: Vec<Term>) -> Term {
  let last = ts.pop().unwrap_or(Term::Bool(true));
  ts.into_iter().rev().fold(last, |acc, t| Term::bin(BinOp::And, t, acc))
}

fn nonempty(d: Deps) -> Option<Deps> {
  match d {
    Deps::Tars(ref v) if v.is_empty() => None,
    d => Some(d),
  }
}

/// Forward: unify the antecedent against the conjunction of the hypotheses
/// at `preds`, append the substituted consequent as a hypothesis. Backward
/// (`preds` holds a single target index): unify the consequent against that
/// target and append the substituted antecedent as a new sufficient target
/// (or, if the target was already reasoned from once, append the
/// antecedent's complement as a hypothesis for contradiction).
pub fn modus_ponens(
  tl: &mut Tableau, ttree: &mut TargetNode, imp: HypId, preds: &[usize], forward: bool,
) -> Option<Diff> {
  ponens_tollens(tl, ttree, imp, preds, forward, false)
}

/// Contrapositive mirror of [`modus_ponens`]: unifies against the negation
/// of the consequent (forward) or antecedent (backward), negating the
/// result before appending.
pub fn modus_tollens(
  tl: &mut Tableau, ttree: &mut TargetNode, imp: HypId, preds: &[usize], forward: bool,
) -> Option<Diff> {
  ponens_tollens(tl, ttree, imp, preds, forward, true)
}

fn ponens_tollens(
  tl: &mut Tableau, ttree: &mut TargetNode, imp: HypId, preds: &[usize], forward: bool,
  tollens: bool,
) -> Option<Diff> {
  if preds.is_empty() {
    return None
  }
  // dependency gate before any unification work
  let mut dep = tl.dependency(imp);
  for &p in preds {
    dep = nonempty(tl.target_compatible(ttree, &dep, p, forward)?)?;
  }
  let imp_t = tl.hyps[imp].clone();
  // scratch metavariables minted below are rolled back if the move fails
  let mark = tl.qz.len();
  let imp_t = if forward { imp_t } else { relabel(tl, &imp_t) };
  let Term::Bin(BinOp::Implies, p, q) = unquantify(tl, &imp_t) else {
    tl.qz.truncate(mark);
    return None
  };
  let (pattern, result) = match (forward, tollens) {
    (true, false) => (*p, *q),
    (true, true) => (q.complement(), p.complement()),
    (false, false) => (*q, *p),
    (false, true) => (p.complement(), q.complement()),
  };
  let stmts: Vec<Term> = if forward {
    preds.iter().map(|&i| tl.hyps[HypId::from_usize(i)].clone()).collect()
  } else {
    vec![tl.tars[TarId::from_usize(preds[0])].clone()]
  };
  // a single implication premise is read as ¬P ∧ Q rather than requiring a
  // literal conjunction
  let matched = match (&stmts[..], &pattern) {
    ([Term::Bin(BinOp::Implies, sp, sq)], Term::Bin(BinOp::And, ..)) if forward =>
      Term::bin(BinOp::And, sp.complement(), (**sq).clone()),
    _ => conjoin(stmts),
  };
  let unified = unify(&pattern, &matched, vec![])
    .filter(|(assign, macros)| check_macros(macros, assign, &tl.qz));
  let Some((assign, _)) = unified else {
    tl.qz.truncate(mark);
    return None
  };
  let result = substitute(result, &assign);
  if forward {
    let h = tl.append_hyp(result, dep);
    Some(Diff::hyp(h))
  } else {
    let tar = TarId::from_usize(preds[0]);
    if tl.reasoned.contains(&tar) {
      // a target may only be reasoned backward from once; afterwards its
      // sufficient conditions are assumed false, for contradiction
      let h = tl.append_hyp(result.complement(), Deps::one(tar));
      tl.twins.insert((h, tar));
      Some(Diff::hyp(h))
    } else {
      tl.reasoned.insert(tar);
      let j = tl.append_tar(result);
      ttree.add_descendant(tar, j);
      Some(Diff::tar(j))
    }
  }
}

/// Rewrite the `n`-th occurrence (1-based, in rendered order) of
/// `occurrence` inside the statement at `idx` using the quantified equality
/// at `eq`: the matched subterm unifies against the equality's left side,
/// or on failure its right side, and the opposite side (with bindings
/// applied) takes its place.
pub fn equality_substitution(
  tl: &mut Tableau, eq: HypId, idx: usize, is_hyp: bool, occurrence: &str, n: usize,
) -> Option<Diff> {
  let stmt = if is_hyp {
    tl.hyps[HypId::from_usize(idx)].clone()
  } else {
    tl.tars[TarId::from_usize(idx)].clone()
  };
  // cheap textual reject before the tree walk (and before any scratch
  // metavariables are minted)
  let rendered = stmt.to_string();
  if memmem::find_iter(rendered.as_bytes(), occurrence.as_bytes()).count() < n {
    return None
  }
  let eq_t = tl.hyps[eq].clone();
  let mark = tl.qz.len();
  let Term::Bin(BinOp::Eq, l, r) = unquantify(tl, &eq_t) else {
    tl.qz.truncate(mark);
    return None
  };
  let mut count = 0;
  let Some(new) = rewrite_nth(&stmt, occurrence, &l, &r, &mut count, n, &tl.qz) else {
    tl.qz.truncate(mark);
    return None
  };
  if is_hyp {
    let i = HypId::from_usize(idx);
    tl.replace_hyp(i, new);
    Some(Diff::hyp(i))
  } else {
    let i = TarId::from_usize(idx);
    tl.replace_tar(i, new);
    Some(Diff::tar(i))
  }
}

fn rewrite_nth(
  t: &Term, occ: &str, l: &Term, r: &Term, count: &mut usize, n: usize, qz: &[QzItem],
) -> Option<Term> {
  if t.to_string() == occ {
    *count += 1;
    if *count == n {
      if let Some((assign, macros)) = unify(l, t, vec![]) {
        if check_macros(&macros, &assign, qz) {
          return Some(substitute(r.clone(), &assign))
        }
      }
      if let Some((assign, macros)) = unify(r, t, vec![]) {
        if check_macros(&macros, &assign, qz) {
          return Some(substitute(l.clone(), &assign))
        }
      }
      return None
    }
  }
  // children in rendered (left-to-right) order, rebuilding around the one
  // position that changes
  match t {
    Term::Apply { f, args, skolem } => {
      for (i, a) in args.iter().enumerate() {
        if let Some(new) = rewrite_nth(a, occ, l, r, count, n, qz) {
          let mut args = args.clone();
          args[i] = new;
          return Some(Term::Apply { f: f.clone(), args, skolem: *skolem })
        }
      }
      None
    }
    Term::Macro(k, a) => Some(Term::Macro(*k, Box::new(rewrite_nth(a, occ, l, r, count, n, qz)?))),
    Term::Not(a) => Some(Term::Not(Box::new(rewrite_nth(a, occ, l, r, count, n, qz)?))),
    Term::Quant(k, v, body) =>
      Some(Term::Quant(*k, v.clone(), Box::new(rewrite_nth(body, occ, l, r, count, n, qz)?))),
    Term::Bin(op, a, b) => {
      if let Some(new) = rewrite_nth(a, occ, l, r, count, n, qz) {
        return Some(Term::bin(*op, new, (**b).clone()))
      }
      Some(Term::bin(*op, (**a).clone(), rewrite_nth(b, occ, l, r, count, n, qz)?))
    }
    Term::Var(_) | Term::Num(_) | Term::Bool(_) | Term::Sym(_) => None,
  }
}

/// Unfold the definition `defn` (a quantified biconditional, implication or
/// equation) into the statement at `idx`, descending `level` nodes before
/// looking for a redex. The first position at that depth whose subterm
/// unifies with the definition's left side is rewritten to the right side.
pub fn expansion(
  tl: &mut Tableau, defn: &Term, idx: usize, is_hyp: bool, level: usize,
) -> Option<Diff> {
  let mark = tl.qz.len();
  let defn = relabel(tl, defn);
  let (lhs, rhs) = match unquantify(tl, &defn) {
    Term::Bin(BinOp::Iff, l, r) | Term::Bin(BinOp::Implies, l, r) | Term::Bin(BinOp::Eq, l, r) =>
      (*l, *r),
    _ => {
      tl.qz.truncate(mark);
      return None
    }
  };
  let stmt = if is_hyp {
    tl.hyps[HypId::from_usize(idx)].clone()
  } else {
    tl.tars[TarId::from_usize(idx)].clone()
  };
  let Some(new) = expand_at(&stmt, &lhs, &rhs, level, &tl.qz) else {
    tl.qz.truncate(mark);
    return None
  };
  if is_hyp {
    let i = HypId::from_usize(idx);
    tl.replace_hyp(i, new);
    Some(Diff::hyp(i))
  } else {
    let i = TarId::from_usize(idx);
    tl.replace_tar(i, new);
    Some(Diff::tar(i))
  }
}

fn expand_at(t: &Term, lhs: &Term, rhs: &Term, level: usize, qz: &[QzItem]) -> Option<Term> {
  if level == 0 {
    let (assign, macros) = unify(lhs, t, vec![])?;
    if !check_macros(&macros, &assign, qz) {
      return None
    }
    return Some(substitute(rhs.clone(), &assign))
  }
  match t {
    Term::Apply { f, args, skolem } => {
      for (i, a) in args.iter().enumerate() {
        if let Some(new) = expand_at(a, lhs, rhs, level - 1, qz) {
          let mut args = args.clone();
          args[i] = new;
          return Some(Term::Apply { f: f.clone(), args, skolem: *skolem })
        }
      }
      None
    }
    Term::Macro(k, a) => Some(Term::Macro(*k, Box::new(expand_at(a, lhs, rhs, level - 1, qz)?))),
    Term::Not(a) => Some(Term::Not(Box::new(expand_at(a, lhs, rhs, level - 1, qz)?))),
    Term::Quant(k, v, body) =>
      Some(Term::Quant(*k, v.clone(), Box::new(expand_at(body, lhs, rhs, level - 1, qz)?))),
    Term::Bin(op, a, b) => {
      if let Some(new) = expand_at(a, lhs, rhs, level - 1, qz) {
        return Some(Term::bin(*op, new, (**b).clone()))
      }
      Some(Term::bin(*op, (**a).clone(), expand_at(b, lhs, rhs, level - 1, qz)?))
    }
    Term::Var(_) | Term::Num(_) | Term::Bool(_) | Term::Sym(_) => None,
  }
}

/// Normalization pass run after every mutation, repeated to a fixed point.
/// Hypotheses are skolemized and broken into implication normal form;
/// targets shed their outer disjunctions/implications/conjunctions into
/// hypotheses and sibling targets. Idempotent: a second run right after the
/// first reports an empty diff.
pub fn cleanup(tl: &mut Tableau, ttree: &mut TargetNode) -> Diff {
  let mut diff = Diff::default();
  loop {
    let mut changed = false;
    for i in tl.active_hyp.clone() {
      if let Some(step) = hyp_step(tl, i) {
        diff.merge(step);
        changed = true;
      }
    }
    for i in tl.active_tar.clone() {
      if let Some(step) = tar_step(tl, ttree, i) {
        diff.merge(step);
        changed = true;
      }
    }
    if !changed {
      break
    }
  }
  tl.refresh_signatures();
  tl.maximal = crate::consts::GRAPH.maximal_constants_of(&tl.constant_pool()).into_iter().collect();
  diff
}

fn same(a: &Term, b: &Term) -> bool { a.to_string() == b.to_string() }

fn hyp_step(tl: &mut Tableau, i: HypId) -> Option<Diff> {
  let t = tl.hyps[i].clone();
  match t {
    Term::Quant(..) => {
      let (new, changed) = skolemize_statement(tl, &t, true);
      if !changed {
        return None
      }
      tl.replace_hyp(i, new);
      Some(Diff::hyp(i))
    }
    Term::Bin(BinOp::Or, l, r) if same(&l, &r) => {
      tl.replace_hyp(i, *l);
      Some(Diff::hyp(i))
    }
    Term::Bin(BinOp::Or, l, r) => {
      if let Term::Not(p) = *l {
        tl.replace_hyp(i, Term::bin(BinOp::Implies, *p, *r));
        return Some(Diff::hyp(i))
      }
      None
    }
    Term::Bin(BinOp::Iff, l, r) => {
      let fwd = Term::bin(BinOp::Implies, (*l).clone(), (*r).clone());
      let bwd = Term::bin(BinOp::Implies, *r, *l);
      tl.replace_hyp(i, Term::bin(BinOp::And, fwd, bwd));
      Some(Diff::hyp(i))
    }
    Term::Bin(BinOp::And, l, r) if same(&l, &r) => {
      tl.replace_hyp(i, *l);
      Some(Diff::hyp(i))
    }
    Term::Bin(BinOp::And, l, r) => {
      let dep = tl.dependency(i);
      tl.replace_hyp(i, *l);
      let j = tl.append_hyp(*r, dep);
      inherit_twins(tl, i, j);
      let mut diff = Diff::hyp(i);
      diff.merge(Diff::hyp(j));
      Some(diff)
    }
    Term::Not(box_t) =>
      if let Term::Bin(BinOp::Implies, p, q) = *box_t {
        let dep = tl.dependency(i);
        tl.replace_hyp(i, *p);
        let j = tl.append_hyp(Term::not(*q), dep);
        inherit_twins(tl, i, j);
        let mut diff = Diff::hyp(i);
        diff.merge(Diff::hyp(j));
        Some(diff)
      } else {
        None
      },
    Term::Bin(BinOp::Implies, l, r) => match (*l, *r) {
      // duplicating the antecedent halves is only sound when they carry no
      // metavariables (a metavariable split across the copies could bind
      // inconsistently)
      (Term::Bin(BinOp::Or, p, q), r) if p.metavars().is_empty() && q.metavars().is_empty() => {
        let left = Term::bin(BinOp::Implies, *p, r.clone());
        let right = Term::bin(BinOp::Implies, *q, r);
        tl.replace_hyp(i, Term::bin(BinOp::And, left, right));
        Some(Diff::hyp(i))
      }
      (p, Term::Bin(BinOp::And, q, r)) => {
        let left = Term::bin(BinOp::Implies, p.clone(), *q);
        let right = Term::bin(BinOp::Implies, p, *r);
        tl.replace_hyp(i, Term::bin(BinOp::And, left, right));
        Some(Diff::hyp(i))
      }
      _ => None,
    },
    _ => None,
  }
}

fn tar_step(tl: &mut Tableau, ttree: &mut TargetNode, i: TarId) -> Option<Diff> {
  let t = tl.tars[i].clone();
  match t {
    Term::Quant(..) => {
      let (new, changed) = skolemize_statement(tl, &t, false);
      if !changed {
        return None
      }
      tl.replace_tar(i, new);
      Some(Diff::tar(i))
    }
    // target disjunctions are left for the driver, which reorders dangling
    // variables before rewriting P∨Q to ¬P⇒Q
    Term::Bin(BinOp::Implies, l, r) => {
      let h = tl.append_hyp(*l, Deps::one(i));
      tl.twins.insert((h, i));
      tl.replace_tar(i, *r);
      let mut diff = Diff::tar(i);
      diff.merge(Diff::hyp(h));
      Some(diff)
    }
    Term::Bin(BinOp::And, l, r) => {
      tl.replace_tar(i, *l);
      let j = tl.append_tar(*r);
      ttree.add_sibling(tl, i, j);
      let mut diff = Diff::tar(i);
      diff.merge(Diff::tar(j));
      Some(diff)
    }
    Term::Not(box_t) =>
      if let Term::Bin(BinOp::Implies, p, q) = *box_t {
        tl.replace_tar(i, Term::bin(BinOp::And, *p, Term::not(*q)));
        Some(Diff::tar(i))
      } else {
        None
      },
    _ => None,
  }
}

fn inherit_twins(tl: &mut Tableau, from: HypId, to: HypId) {
  let pairs: Vec<TarId> =
    tl.twins.iter().filter(|&&(h, _)| h == from).map(|&(_, t)| t).collect();
  for t in pairs {
    tl.twins.insert((to, t));
  }
}

/// Process the leading quantifier run of a statement. In a target,
/// universals become Skolem constants and existentials become
/// metavariables. In a hypothesis, existentials become Skolem functions of
/// the universals seen so far, and a universal stays quantified only when
/// it directly governs an implication or disjunction (the reasoning movers
/// instantiate those per use); any other hypothesis universal is exposed as
/// a metavariable so completion can instantiate it. Skolem terms carry a
/// flag that blocks re-skolemization, which is what makes repeated cleanup
/// terminate.
fn skolemize_statement(tl: &mut Tableau, t: &Term, hyp: bool) -> (Term, bool) {
  let mut prefix = vec![];
  let mut body = t.clone();
  while let Term::Quant(k, v, b) = body {
    prefix.push((k, v));
    body = *b;
  }
  let governs_connective = matches!(body, Term::Bin(BinOp::Implies | BinOp::Or, ..));
  let mut changed = false;
  let mut keep: Vec<Var> = vec![];
  // Skolem dependency terms: every universal seen so far, kept or not
  let mut univs: Vec<Term> = vec![];
  let last = prefix.len() - 1;
  for (i, (k, v)) in prefix.into_iter().enumerate() {
    match (k, hyp) {
      (QuantKind::Forall, true) if i == last && governs_connective => {
        univs.push(Term::Var(v.clone()));
        keep.push(v)
      }
      (QuantKind::Forall, true) | (QuantKind::Exists, false) => {
        let name = tl.fresh_name(&v.name);
        body.clear_binder(&v.name);
        let mut mv = Var::meta(name);
        mv.con = v.con.clone();
        if k == QuantKind::Forall {
          univs.push(Term::Var(mv.clone()));
        }
        body = subst(&body, &v, &Term::Var(mv.clone()));
        tl.qz.push(QzItem::Const(mv));
        changed = true;
      }
      (QuantKind::Exists, true) | (QuantKind::Forall, false) => {
        let name = tl.fresh_name(&v.name);
        body.clear_binder(&v.name);
        let sk = if hyp && !univs.is_empty() {
          Term::Apply { f: Var::new(name.clone()), args: univs.clone(), skolem: true }
        } else {
          Term::Var(Var::new(name.clone()))
        };
        body = subst(&body, &v, &sk);
        // the Skolem symbol's range joins the quantifier zone
        let mut decl = Var::new(name);
        decl.con = v.con.clone();
        tl.qz.push(QzItem::Forall(decl));
        changed = true;
      }
    }
  }
  for v in keep.into_iter().rev() {
    body.mark_binder(&v.name);
    body = Term::forall(v, body);
  }
  (body, changed)
}

/// Refresh the signature caches and twin/maximal bookkeeping for anything
/// a mover just appended. Kept separate from [`cleanup`] so the driver can
/// call it for statements appended outside a cleanup pass.
pub fn refresh(tl: &mut Tableau) {
  tl.refresh_signatures();
  tl.maximal = crate::consts::GRAPH.maximal_constants_of(&tl.constant_pool()).into_iter().collect();
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;

  fn setup(hyps: &[&str], tars: &[&str]) -> (Tableau, TargetNode) {
    let mut tl = Tableau::new();
    for h in hyps {
      tl.append_hyp(parse(h).unwrap(), Deps::Any);
    }
    for t in tars {
      tl.append_tar(parse(t).unwrap());
    }
    tl.refresh_signatures();
    let roots: Vec<TarId> = tl.active_tar.iter().copied().collect();
    (tl, TargetNode::root(roots))
  }

  #[test]
  fn forward_modus_ponens() {
    let (mut tl, mut tt) = setup(&["∀x (P(x) ⇒ Q(x))", "P(a)"], &["Q(a)"]);
    let diff = modus_ponens(&mut tl, &mut tt, HypId(0), &[1], true).unwrap();
    assert_eq!(diff.hyps.len(), 1);
    assert_eq!(tl.hyps[diff.hyps[0]].to_string(), "Q(a)");
  }

  #[test]
  fn backward_modus_ponens_appends_sufficient_target() {
    let (mut tl, mut tt) = setup(&["∀x (P(x) ⇒ Q(x))"], &["Q(a)"]);
    let diff = modus_ponens(&mut tl, &mut tt, HypId(0), &[0], false).unwrap();
    let j = diff.tars[0];
    assert_eq!(tl.tars[j].to_string(), "P(a)");
    // proving the new target suffices for the old one
    assert!(tt.target_depends(j, TarId(0)));
    assert!(tl.reasoned.contains(&TarId(0)));
  }

  #[test]
  fn second_backward_step_assumes_complement() {
    let (mut tl, mut tt) = setup(&["∀x (P(x) ⇒ Q(x))", "∀x (R(x) ⇒ Q(x))"], &["Q(a)"]);
    modus_ponens(&mut tl, &mut tt, HypId(0), &[0], false).unwrap();
    let diff = modus_ponens(&mut tl, &mut tt, HypId(1), &[0], false).unwrap();
    let h = diff.hyps[0];
    assert_eq!(tl.hyps[h].to_string(), "¬R(a)");
    assert!(tl.twins.contains(&(h, TarId(0))));
  }

  #[test]
  fn forward_modus_tollens() {
    let (mut tl, mut tt) = setup(&["∀x (P(x) ⇒ Q(x))", "¬Q(a)"], &["⊥"]);
    let diff = modus_tollens(&mut tl, &mut tt, HypId(0), &[1], true).unwrap();
    assert_eq!(tl.hyps[diff.hyps[0]].to_string(), "¬P(a)");
  }

  #[test]
  fn implication_premise_read_as_conjunction() {
    let (mut tl, mut tt) = setup(&["(¬P(a)∧Q(a)) ⇒ R(a)", "P(a) ⇒ Q(a)"], &["R(a)"]);
    let diff = modus_ponens(&mut tl, &mut tt, HypId(0), &[1], true).unwrap();
    assert_eq!(tl.hyps[diff.hyps[0]].to_string(), "R(a)");
  }

  #[test]
  fn dependency_gate_blocks_unreachable_target() {
    let (mut tl, mut tt) = setup(&["∀x (P(x) ⇒ Q(x))"], &["Q(a)", "Q(b)"]);
    // the implication may only serve target 1
    tl.dep.insert(HypId(0), Deps::one(TarId(1)));
    assert!(modus_ponens(&mut tl, &mut tt, HypId(0), &[0], false).is_none());
    assert!(modus_ponens(&mut tl, &mut tt, HypId(0), &[1], false).is_some());
  }

  #[test]
  fn forward_dependency_intersection() {
    let (mut tl, mut tt) = setup(&["∀x (P(x) ⇒ Q(x))", "P(a)"], &["Q(a)", "Q(b)"]);
    tl.dep.insert(HypId(1), Deps::one(TarId(0)));
    let diff = modus_ponens(&mut tl, &mut tt, HypId(0), &[1], true).unwrap();
    // ANY ∩ {t0} = {t0}
    assert_eq!(tl.dependency(diff.hyps[0]), Deps::one(TarId(0)));
  }

  #[test]
  fn equality_substitution_rewrites_sole_occurrence() {
    let (mut tl, _) = setup(&["a = b"], &["P(a)"]);
    let diff = equality_substitution(&mut tl, HypId(0), 0, false, "a", 1).unwrap();
    assert_eq!(tl.tars[diff.tars[0]].to_string(), "P(b)");
  }

  #[test]
  fn equality_substitution_picks_nth_occurrence() {
    let (mut tl, _) = setup(&["a = b"], &["a + a = c"]);
    equality_substitution(&mut tl, HypId(0), 0, false, "a", 2).unwrap();
    assert_eq!(tl.tars[TarId(0)].to_string(), "a + b = c");
  }

  #[test]
  fn equality_substitution_tries_right_side() {
    let (mut tl, _) = setup(&["b = a"], &["P(a)"]);
    equality_substitution(&mut tl, HypId(0), 0, false, "a", 1).unwrap();
    assert_eq!(tl.tars[TarId(0)].to_string(), "P(b)");
  }

  #[test]
  fn equality_substitution_missing_occurrence_fails() {
    let (mut tl, _) = setup(&["a = b"], &["P(c)"]);
    assert!(equality_substitution(&mut tl, HypId(0), 0, false, "a", 1).is_none());
    assert_eq!(tl.tars[TarId(0)].to_string(), "P(c)");
  }

  #[test]
  fn definition_expansion_at_outer_level() {
    let (mut tl, _) = setup(&["P(a)"], &["⊥"]);
    let defn = parse("∀x (P(x) ⇔ Q(x)∧R(x))").unwrap();
    expansion(&mut tl, &defn, 0, true, 0).unwrap();
    assert_eq!(tl.hyps[HypId(0)].to_string(), "Q(a)∧R(a)");
  }

  #[test]
  fn cleanup_splits_conjunction_and_implication_target() {
    let (mut tl, mut tt) = setup(&["P(a)∧Q(a)"], &["R(a) ⇒ S(a)"]);
    cleanup(&mut tl, &mut tt);
    assert_eq!(tl.hyps[HypId(0)].to_string(), "P(a)");
    assert_eq!(tl.hyps[HypId(1)].to_string(), "Q(a)");
    // target implication moved its antecedent into a twinned hypothesis
    assert_eq!(tl.tars[TarId(0)].to_string(), "S(a)");
    assert_eq!(tl.hyps[HypId(2)].to_string(), "R(a)");
    assert!(tl.twins.contains(&(HypId(2), TarId(0))));
    assert_eq!(tl.dependency(HypId(2)), Deps::one(TarId(0)));
  }

  #[test]
  fn cleanup_conjunction_target_becomes_siblings() {
    let (mut tl, mut tt) = setup(&[], &["P(a)∧Q(a)"]);
    cleanup(&mut tl, &mut tt);
    assert_eq!(tl.tars[TarId(0)].to_string(), "P(a)");
    assert_eq!(tl.tars[TarId(1)].to_string(), "Q(a)");
    let root = tt.find(TarId(0)).is_some() && tt.find(TarId(1)).is_some();
    assert!(root);
  }

  #[test]
  fn cleanup_skolemizes_hypothesis_existential() {
    let (mut tl, mut tt) = setup(&["∀x ∃y P(x, y)"], &["⊥"]);
    cleanup(&mut tl, &mut tt);
    // x is exposed as a metavariable; y became a Skolem function of it
    assert_eq!(tl.hyps[HypId(0)].to_string(), "P(x_0, y_0(x_0))");
    assert!(tl.qz.iter().any(|q| q.var().name == "x_0" && q.var().metavar));
  }

  #[test]
  fn plain_universal_hypothesis_becomes_metavariable() {
    let (mut tl, mut tt) = setup(&["∀x P(x)", "∀x (Q(x) ⇒ R(x))"], &["⊥"]);
    cleanup(&mut tl, &mut tt);
    assert_eq!(tl.hyps[HypId(0)].to_string(), "P(x_0)");
    // a universal over an implication stays quantified for the movers
    assert_eq!(tl.hyps[HypId(1)].to_string(), "∀x Q(x) ⇒ R(x)");
  }

  #[test]
  fn failed_mover_leaves_quantifier_zone_alone() {
    let (mut tl, mut tt) = setup(&["∀x (P(x) ⇒ Q(x))", "R(a)"], &["⊥"]);
    assert!(modus_ponens(&mut tl, &mut tt, HypId(0), &[1], true).is_none());
    assert!(tl.qz.is_empty());
    // the occurrence is present textually but unifies with neither side
    let (mut tl, _) = setup(&["∀x (f(x) = g(x))"], &["P(c)"]);
    assert!(equality_substitution(&mut tl, HypId(0), 0, false, "c", 1).is_none());
    assert!(tl.qz.is_empty());
  }

  #[test]
  fn cleanup_target_quantifiers() {
    let (mut tl, mut tt) = setup(&[], &["∀x ∃y P(x, y)"]);
    cleanup(&mut tl, &mut tt);
    // x arbitrary: a Skolem constant; y to be found: a metavariable
    assert_eq!(tl.tars[TarId(0)].to_string(), "P(x_0, y_0)");
    assert!(tl.qz.iter().any(|q| q.var().name == "y_0" && q.var().metavar));
  }

  #[test]
  fn cleanup_iff_and_negated_implication() {
    let (mut tl, mut tt) = setup(&["P(a) ⇔ Q(a)", "¬(R(a) ⇒ S(a))"], &["⊥"]);
    cleanup(&mut tl, &mut tt);
    let texts: Vec<String> =
      tl.active_hyp.iter().map(|&i| tl.hyps[i].to_string()).collect();
    assert!(texts.contains(&"P(a) ⇒ Q(a)".to_string()));
    assert!(texts.contains(&"Q(a) ⇒ P(a)".to_string()));
    assert!(texts.contains(&"R(a)".to_string()));
    assert!(texts.contains(&"¬S(a)".to_string()));
  }

  #[test]
  fn cleanup_is_idempotent() {
    let (mut tl, mut tt) =
      setup(&["∃x P(x)", "A(a)∧B(a)", "¬C(a) ∨ D(a)"], &["E(a) ∨ F(a)", "G(a)∧H(a)"]);
    cleanup(&mut tl, &mut tt);
    let second = cleanup(&mut tl, &mut tt);
    assert!(second.is_empty());
  }

  #[test]
  fn index_stability_across_movers() {
    let (mut tl, mut tt) = setup(&["∀x (P(x) ⇒ Q(x))", "P(a)∧R(a)"], &["Q(a)"]);
    let before = tl.hyps[HypId(0)].to_string();
    cleanup(&mut tl, &mut tt);
    modus_ponens(&mut tl, &mut tt, HypId(0), &[1], true).unwrap();
    // earlier indices still name the same statements
    assert_eq!(tl.hyps[HypId(0)].to_string(), before);
    assert_eq!(tl.hyps[HypId(1)].to_string(), "P(a)");
  }
}

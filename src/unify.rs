//! Structural unification with metavariables. Failure is a value, never a
//! panic: every caller branches on the result before trusting the
//! substitution.

use crate::types::{BinOp, MacroKind, QzItem, Sort, Term, Var};

/// An ordered substitution: applying the pairs left to right must be
/// consistent (two bindings for one key are merged by unifying their
/// right-hand sides, see [`unify`]). A key is a bound metavariable, or a
/// whole metavariable-headed application when it binds as a unit.
pub type Assign = Vec<(Term, Term)>;

/// Deferred macro obligations `(other side, macro term)` collected during
/// unification, to be checked against the quantifier zone by
/// [`check_macros`].
pub type Macros = Vec<(Term, Term)>;

/// One structural unification step. Extends `assign`/`macros` on success;
/// returns `None` on a mismatch. The substitution returned by this raw
/// walk may still bind one metavariable twice; [`unify`] normalizes that.
pub fn trees_unify(
  t1: &Term, t2: &Term, mut assign: Assign, mut macros: Macros,
) -> Option<(Assign, Macros)> {
  // unexpanded macros unify with anything for now; the obligation is
  // revisited once the metavariable inside is resolved
  if let Term::Macro(..) = t1 {
    macros.push((t2.clone(), t1.clone()));
    return Some((assign, macros))
  }
  if let Term::Macro(..) = t2 {
    macros.push((t1.clone(), t2.clone()));
    return Some((assign, macros))
  }
  if let (Term::Apply { f: f1, args: a1, .. }, Term::Apply { f: f2, args: a2, .. }) = (t1, t2) {
    // a metavariable-headed application binds its head symbol (curried),
    // unifying argument-wise instead of requiring equal heads
    if f1.metavar || f2.metavar {
      if a1.len() != a2.len() {
        return None
      }
      for (x, y) in a1.iter().zip(a2) {
        (assign, macros) = trees_unify(x, y, assign, macros)?;
      }
      let (m, o) = if f1.metavar { (f1, f2) } else { (f2, f1) };
      if m.sort != o.sort {
        return None
      }
      assign.push((Term::Var(m.clone()), Term::Var(o.clone())));
      return Some((assign, macros))
    }
  }
  // a metavariable-headed application against anything that is not an
  // application binds as a unit: the whole application stands for the
  // other side
  for (app, other) in [(t1, t2), (t2, t1)] {
    if let Term::Apply { f, .. } = app {
      let other_meta = matches!(other, Term::Var(v) if v.metavar);
      if f.metavar && !other_meta && !matches!(other, Term::Apply { .. }) {
        let ok = match f.sort {
          Sort::Pred => other.is_predicate(),
          Sort::Expr => !other.is_predicate() && !other.contains_binder(),
        };
        if !ok {
          return None
        }
        assign.push((app.clone(), other.clone()));
        return Some((assign, macros))
      }
    }
  }
  match (t1, t2) {
    (Term::Var(v), t) | (t, Term::Var(v)) if v.metavar => {
      let ok = match v.sort {
        Sort::Pred => t.is_predicate(),
        // the capture side-condition: the bound term may not smuggle a
        // variable out of its binder's scope
        Sort::Expr => !t.is_predicate() && !t.contains_binder(),
      };
      if !ok {
        return None
      }
      assign.push((Term::Var(v.clone()), t.clone()));
      Some((assign, macros))
    }
    (Term::Var(v1), Term::Var(v2)) =>
      if v1.name == v2.name {
        Some((assign, macros))
      } else {
        None
      },
    (Term::Var(_), _) | (_, Term::Var(_)) => None,
    (Term::Apply { f: f1, args: a1, .. }, Term::Apply { f: f2, args: a2, .. }) => {
      if f1.name != f2.name || a1.len() != a2.len() {
        return None
      }
      for (x, y) in a1.iter().zip(a2) {
        (assign, macros) = trees_unify(x, y, assign, macros)?;
      }
      Some((assign, macros))
    }
    // equality unifies commutatively: straight first, then crossed
    (Term::Bin(BinOp::Eq, l1, r1), Term::Bin(BinOp::Eq, l2, r2)) => {
      let straight = trees_unify(l1, l2, assign.clone(), macros.clone())
        .and_then(|(a, m)| trees_unify(r1, r2, a, m));
      match straight {
        Some(res) => Some(res),
        None => {
          (assign, macros) = trees_unify(l1, r2, assign, macros)?;
          trees_unify(r1, l2, assign, macros)
        }
      }
    }
    (Term::Bin(op1, l1, r1), Term::Bin(op2, l2, r2)) => {
      if op1 != op2 {
        return None
      }
      (assign, macros) = trees_unify(l1, l2, assign, macros)?;
      trees_unify(r1, r2, assign, macros)
    }
    (Term::Not(a), Term::Not(b)) => trees_unify(a, b, assign, macros),
    (Term::Quant(k1, v1, b1), Term::Quant(k2, v2, b2)) => {
      if k1 != k2 || v1.name != v2.name {
        return None
      }
      trees_unify(b1, b2, assign, macros)
    }
    (Term::Num(a), Term::Num(b)) =>
      if a == b {
        Some((assign, macros))
      } else {
        None
      },
    (Term::Bool(a), Term::Bool(b)) =>
      if a == b {
        Some((assign, macros))
      } else {
        None
      },
    (Term::Sym(a), Term::Sym(b)) =>
      if a == b {
        Some((assign, macros))
      } else {
        None
      },
    _ => None,
  }
}

/// Full unification: run [`trees_unify`], then normalize the substitution
/// by substituting each later binding into the earlier ones and merging
/// duplicate bindings for a key (unifying their right-hand sides; a
/// conflict fails the whole unification). Quadratic in the substitution
/// size, which is bounded by the quantifier count of a statement.
pub fn unify(t1: &Term, t2: &Term, assigned: Assign) -> Option<(Assign, Macros)> {
  let (mut assign, mut macros) = trees_unify(t1, t2, assigned, vec![])?;
  let mut i = 0;
  while i < assign.len() {
    for j in 0..i {
      assign[j] = make_substitution(&assign[j], &assign[i]);
    }
    let mut j = i + 1;
    while j < assign.len() {
      if assign[i].0.to_string() == assign[j].0.to_string() {
        let a = assign[i].1.clone();
        let b = assign[j].1.clone();
        (assign, macros) = trees_unify(&a, &b, assign, macros)?;
        assign.remove(j);
      } else {
        assign[j] = make_substitution(&assign[j], &assign[i]);
        j += 1;
      }
    }
    i += 1;
  }
  Some((assign, macros))
}

/// Substitute `val` for every occurrence of the metavariable `var`.
pub fn subst(t: &Term, var: &Var, val: &Term) -> Term {
  match t {
    Term::Var(v) =>
      if v.name == var.name {
        val.clone()
      } else {
        t.clone()
      },
    Term::Apply { f, args, skolem } => {
      let mut f = f.clone();
      if f.name == var.name {
        match val {
          Term::Var(w) => f = w.clone(),
          // replacing a function variable by an applied term curries: the
          // replacement's own arguments come first
          Term::Apply { f: g, args: pre, skolem: sk } =>
            return Term::Apply {
              f: g.clone(),
              args: pre.iter().cloned().chain(args.iter().map(|a| subst(a, var, val))).collect(),
              skolem: *sk,
            },
          _ => {}
        }
      }
      Term::Apply {
        f,
        args: args.iter().map(|a| subst(a, var, val)).collect(),
        skolem: *skolem,
      }
    }
    Term::Macro(k, a) => Term::Macro(*k, Box::new(subst(a, var, val))),
    Term::Not(a) => Term::Not(Box::new(subst(a, var, val))),
    Term::Quant(k, v, body) => {
      let mut v = v.clone();
      if let Some(c) = &v.con {
        v.con = Some(Box::new(subst(c, var, val)))
      }
      if v.name == var.name {
        // shadowed below this binder
        Term::Quant(*k, v, body.clone())
      } else {
        Term::Quant(*k, v, Box::new(subst(body, var, val)))
      }
    }
    Term::Bin(op, l, r) => Term::bin(*op, subst(l, var, val), subst(r, var, val)),
    Term::Num(_) | Term::Bool(_) | Term::Sym(_) => t.clone(),
  }
}

/// Replace every subterm that renders identically to `key`. Used for
/// bindings whose key is a whole metavariable-headed application.
fn subst_term(t: &Term, key: &Term, val: &Term) -> Term {
  if t.to_string() == key.to_string() {
    return val.clone()
  }
  match t {
    Term::Apply { f, args, skolem } => Term::Apply {
      f: f.clone(),
      args: args.iter().map(|a| subst_term(a, key, val)).collect(),
      skolem: *skolem,
    },
    Term::Macro(k, a) => Term::Macro(*k, Box::new(subst_term(a, key, val))),
    Term::Not(a) => Term::Not(Box::new(subst_term(a, key, val))),
    Term::Quant(k, v, body) => Term::Quant(*k, v.clone(), Box::new(subst_term(body, key, val))),
    Term::Bin(op, l, r) => Term::bin(*op, subst_term(l, key, val), subst_term(r, key, val)),
    Term::Var(_) | Term::Num(_) | Term::Bool(_) | Term::Sym(_) => t.clone(),
  }
}

fn apply_binding(t: &Term, key: &Term, val: &Term) -> Term {
  match key {
    Term::Var(v) => subst(t, v, val),
    _ => subst_term(t, key, val),
  }
}

/// Apply a whole substitution, left to right.
pub fn substitute(mut t: Term, assign: &Assign) -> Term {
  for (key, val) in assign {
    t = apply_binding(&t, key, val);
  }
  t
}

fn make_substitution(a1: &(Term, Term), a2: &(Term, Term)) -> (Term, Term) {
  let (key2, expr2) = a2;
  (a1.0.clone(), apply_binding(&a1.1, key2, expr2))
}

/// Resolve the constraint query of a macro term against the quantifier
/// zone. `universe(x)` is `x`'s constraint itself; `domain`/`codomain`
/// project a function constraint `dom → cod`.
fn resolve_macro(kind: MacroKind, arg: &Term, qz: &[QzItem]) -> Option<Term> {
  let Term::Var(v) = arg else { return None };
  let con = qz.iter().find(|q| q.var().name == v.name).and_then(|q| q.var().con.as_deref())?;
  match kind {
    MacroKind::Universe => Some(con.clone()),
    MacroKind::Domain => match con {
      Term::Bin(BinOp::To, d, _) => Some((**d).clone()),
      _ => None,
    },
    MacroKind::Codomain => match con {
      Term::Bin(BinOp::To, _, c) => Some((**c).clone()),
      _ => None,
    },
  }
}

/// Check deferred macro obligations once the substitution is known: each
/// macro argument must resolve through the quantifier zone to a term that
/// unifies with the other side of its obligation.
pub fn check_macros(macros: &Macros, assign: &Assign, qz: &[QzItem]) -> bool {
  for (other, mac) in macros {
    let Term::Macro(kind, arg) = mac else { return false };
    let arg = substitute((**arg).clone(), assign);
    let Some(resolved) = resolve_macro(*kind, &arg, qz) else { return false };
    let other = substitute(other.clone(), assign);
    if unify(&resolved, &other, assign.clone()).is_none() {
      return false
    }
  }
  true
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::{parse, parse_with_metavars};

  fn unified(s1: &str, mv1: &[&str], s2: &str, mv2: &[&str]) -> Option<Assign> {
    let t1 = parse_with_metavars(s1, mv1).unwrap();
    let t2 = parse_with_metavars(s2, mv2).unwrap();
    unify(&t1, &t2, vec![]).map(|(a, _)| a)
  }

  #[test]
  fn soundness_applying_substitution_equalizes() {
    let t1 = parse_with_metavars("P(x, f(y))", &["x", "y"]).unwrap();
    let t2 = parse("P(a, f(b))").unwrap();
    let (assign, _) = unify(&t1, &t2, vec![]).unwrap();
    let s1 = substitute(t1, &assign);
    let s2 = substitute(t2, &assign);
    assert_eq!(s1.to_string(), s2.to_string());
  }

  #[test]
  fn totality_of_failure() {
    assert!(unified("f(x)", &[], "g(x)", &[]).is_none());
    assert!(unified("P(a)", &[], "P(b)", &[]).is_none());
    assert!(unified("x ∈ A", &[], "x ⊆ A", &[]).is_none());
  }

  #[test]
  fn conflicting_bindings_fail() {
    // x must be both a and b
    assert!(unified("P(x, x)", &["x"], "P(a, b)", &[]).is_none());
  }

  #[test]
  fn mergeable_bindings_collapse() {
    // x bound to the metavariable y and to a: merged, consistent
    let assign = unified("P(x, x)", &["x"], "P(y, a)", &["y"]).unwrap();
    let t = substitute(parse_with_metavars("P(x, x)", &["x"]).unwrap(), &assign);
    assert_eq!(t.to_string(), "P(a, a)");
  }

  #[test]
  fn equality_is_commutative() {
    assert!(unified("a = b", &[], "b = a", &[]).is_some());
    assert!(unified("x = b", &["x"], "b = a", &[]).is_some());
    assert!(unified("a = b", &[], "a = c", &[]).is_none());
  }

  #[test]
  fn metavar_headed_application_binds_head() {
    let assign = unified("F(a)", &["F"], "g(a)", &[]).unwrap();
    assert_eq!(assign.len(), 1);
    let Term::Var(v) = &assign[0].0 else { panic!() };
    assert_eq!(v.name, "F");
    let t = substitute(parse_with_metavars("F(b)", &["F"]).unwrap(), &assign);
    assert_eq!(t.to_string(), "g(b)");
  }

  #[test]
  fn metavar_application_against_plain_term_binds_whole() {
    // no argument to pair F's argument with, so F(a) itself stands for b
    let assign = unified("F(a)", &["F"], "b", &[]).unwrap();
    assert_eq!(assign.len(), 1);
    assert_eq!(assign[0].0.to_string(), "F(a)");
    let t = substitute(parse_with_metavars("P(F(a), c)", &["F"]).unwrap(), &assign);
    assert_eq!(t.to_string(), "P(b, c)");
    // two such bindings still have to agree
    assert!(unified("Q(F(a), F(a))", &["F"], "Q(b, c)", &[]).is_none());
  }

  #[test]
  fn capture_side_condition() {
    // y below ∃y is still bound there; x may not be bound to it
    let t = parse("∃y f(y) = z").unwrap();
    let Term::Quant(_, _, body) = t else { panic!() };
    let Term::Bin(BinOp::Eq, fy, _) = *body else { panic!() };
    assert!(fy.contains_binder());
    let x = Term::Var(crate::types::Var::meta("x"));
    assert!(unify(&x, &fy, vec![]).is_none());
    // the same term with no enclosing binder is fine
    let free = parse("f(y)").unwrap();
    assert!(unify(&x, &free, vec![]).is_some());
  }

  #[test]
  fn predicate_metavars_only_bind_predicates() {
    let p = Term::Var(crate::types::Var::pred_meta("P"));
    assert!(unify(&p, &parse("a ∈ A").unwrap(), vec![]).is_some());
    assert!(unify(&p, &parse("a + b").unwrap(), vec![]).is_none());
    let x = Term::Var(crate::types::Var::meta("x"));
    assert!(unify(&x, &parse("a ∈ A").unwrap(), vec![]).is_none());
  }

  #[test]
  fn macro_obligation_deferred_then_checked() {
    use crate::types::{QzItem, Var};
    let mac = parse_with_metavars("universe(x)", &["x"]).unwrap();
    let other = parse("ℝ").unwrap();
    let (assign, macros) = unify(&mac, &other, vec![]).unwrap();
    assert_eq!(macros.len(), 1);
    // x resolves to the qz variable u with constraint ℝ
    let mut u = Var::new("u");
    u.con = Some(Box::new(parse("ℝ").unwrap()));
    let qz = vec![QzItem::Forall(u)];
    let mut assign = assign;
    assign.push((Term::Var(Var::meta("x")), Term::Var(Var::new("u"))));
    assert!(check_macros(&macros, &assign, &qz));
    // but not if the constraint is a different set
    let mut w = Var::new("u");
    w.con = Some(Box::new(parse("ℕ").unwrap()));
    assert!(!check_macros(&macros, &assign, &[QzItem::Forall(w)]));
  }
}

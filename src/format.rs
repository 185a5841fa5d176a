//! Textual rendering of terms. The equality-substitution mover addresses
//! subterms by their rendered text, so `Display` here is part of the engine
//! contract, not just debugging output.

use crate::types::{BinOp, QuantKind, Term};
use std::fmt::{self, Display, Formatter, Write};

impl BinOp {
  fn symbol(self) -> &'static str {
    match self {
      BinOp::Implies => "⇒",
      BinOp::Iff => "⇔",
      BinOp::And => "∧",
      BinOp::Or => "∨",
      BinOp::Eq => "=",
      BinOp::Neq => "≠",
      BinOp::Lt => "<",
      BinOp::Gt => ">",
      BinOp::Leq => "≤",
      BinOp::Geq => "≥",
      BinOp::Elem => "∈",
      BinOp::Subset => "⊂",
      BinOp::Subseteq => "⊆",
      BinOp::Union => "∪",
      BinOp::Inter => "∩",
      BinOp::Diff => "\\",
      BinOp::Add => "+",
      BinOp::Sub => "-",
      BinOp::Mul => "*",
      BinOp::Div => "/",
      BinOp::Pow => "^",
      BinOp::To => "→",
    }
  }

  fn spaced(self) -> bool {
    !matches!(self, BinOp::And | BinOp::Or | BinOp::Union | BinOp::Inter | BinOp::Mul
      | BinOp::Div | BinOp::Pow)
  }
}

// Levels mirror the parser's grammar exactly: ∨ binds looser than ∧, and
// the operators sharing one parser loop share one level.
fn prec(t: &Term) -> u32 {
  match t {
    Term::Quant(..) => 9,
    Term::Bin(op, ..) => match op {
      BinOp::Implies | BinOp::Iff => 8,
      BinOp::Or => 7,
      BinOp::And => 6,
      BinOp::Eq
      | BinOp::Neq
      | BinOp::Lt
      | BinOp::Gt
      | BinOp::Leq
      | BinOp::Geq
      | BinOp::Elem
      | BinOp::Subset
      | BinOp::Subseteq
      | BinOp::To => 5,
      BinOp::Add | BinOp::Sub | BinOp::Diff | BinOp::Union | BinOp::Inter => 4,
      BinOp::Mul | BinOp::Div => 3,
      BinOp::Pow => 2,
    },
    Term::Not(_) => 1,
    _ => 0,
  }
}

/// On a precedence tie the child is parenthesized iff `tie` is set; the
/// caller sets it against the side its operator groups toward, so the
/// rendered text reparses to the same tree and distinct trees render
/// distinctly.
fn paren(f: &mut Formatter<'_>, parent: u32, tie: bool, child: &Term) -> fmt::Result {
  if prec(child) > parent || (tie && prec(child) == parent) {
    write!(f, "({child})")
  } else {
    write!(f, "{child}")
  }
}

impl Display for Term {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Term::Var(v) => f.write_str(&v.name),
      Term::Num(n) => write!(f, "{n}"),
      Term::Bool(true) => f.write_str("⊤"),
      Term::Bool(false) => f.write_str("⊥"),
      Term::Sym(s) => f.write_str(s),
      Term::Apply { f: head, args, .. } => {
        f.write_str(&head.name)?;
        f.write_char('(')?;
        for (i, a) in args.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?
          }
          write!(f, "{a}")?
        }
        f.write_char(')')
      }
      Term::Macro(k, t) => write!(f, "{}({t})", k.name()),
      Term::Not(t) => {
        f.write_char('¬')?;
        paren(f, prec(self), false, t)
      }
      Term::Quant(QuantKind::Forall, v, body) => write!(f, "∀{} {body}", v.name),
      Term::Quant(QuantKind::Exists, v, body) => write!(f, "∃{} {body}", v.name),
      Term::Bin(op, l, r) => {
        let p = prec(self);
        // ⇒ ⇔ ^ group to the right, chains of ∧ ∨ and the arithmetic/set
        // operators to the left; a relation never chains at all
        let (tie_l, tie_r) = match op {
          BinOp::Implies | BinOp::Iff | BinOp::Pow => (true, false),
          BinOp::And | BinOp::Or | BinOp::Union | BinOp::Inter | BinOp::Add | BinOp::Sub
          | BinOp::Diff | BinOp::Mul | BinOp::Div => (false, true),
          _ => (true, true),
        };
        paren(f, p, tie_l, l)?;
        if op.spaced() {
          write!(f, " {} ", op.symbol())?
        } else {
          f.write_str(op.symbol())?
        }
        paren(f, p, tie_r, r)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Var;

  #[test]
  fn precedence_parenthesization() {
    let x = || Term::Var(Var::new("x"));
    let p = Term::bin(BinOp::Eq, x(), Term::Num(0));
    let q = Term::bin(BinOp::Eq, x(), Term::Num(1));
    let imp = Term::bin(BinOp::Implies, p.clone(), q.clone());
    assert_eq!(imp.to_string(), "x = 0 ⇒ x = 1");
    let conj = Term::bin(BinOp::And, p, imp);
    assert_eq!(conj.to_string(), "x = 0∧(x = 0 ⇒ x = 1)");
  }

  #[test]
  fn equal_precedence_renders_injectively() {
    use crate::parser::parse;
    // rendered text is the engine's identity on statements, so the two
    // nestings of each connective pair must not collapse
    for (s, rendered) in [
      ("(P(a) ⇒ Q(a)) ⇒ R(a)", "(P(a) ⇒ Q(a)) ⇒ R(a)"),
      ("P(a) ⇒ Q(a) ⇒ R(a)", "P(a) ⇒ Q(a) ⇒ R(a)"),
      ("(P(a) ⇒ Q(a)) ⇔ R(a)", "(P(a) ⇒ Q(a)) ⇔ R(a)"),
      ("P(a) ⇔ (Q(a) ⇒ R(a))", "P(a) ⇔ Q(a) ⇒ R(a)"),
      ("(P(a) ∨ Q(a))∧R(a)", "(P(a) ∨ Q(a))∧R(a)"),
      ("P(a) ∨ Q(a)∧R(a)", "P(a) ∨ Q(a)∧R(a)"),
      ("P(a)∧(Q(a)∧R(a))", "P(a)∧(Q(a)∧R(a))"),
      ("P(a)∧Q(a)∧R(a)", "P(a)∧Q(a)∧R(a)"),
    ] {
      let t = parse(s).unwrap();
      assert_eq!(t.to_string(), rendered);
      assert_eq!(parse(rendered).unwrap().to_string(), rendered);
    }
  }

  #[test]
  fn application_and_quantifier() {
    let t = Term::forall(
      Var::new("x"),
      Term::bin(
        BinOp::Elem,
        Term::apply(Var::new("f"), vec![Term::Var(Var::new("x"))]),
        Term::Sym("ℕ".into()),
      ),
    );
    assert_eq!(t.to_string(), "∀x f(x) ∈ ℕ");
  }
}

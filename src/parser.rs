//! Statement reader for library records and tests. This is the minimal
//! realization of the external `parse` collaborator: enough grammar to read
//! the record format and to state theorems in tests, nothing more.

use crate::types::{BinOp, MacroKind, QuantKind, Term, Var};

#[derive(Clone, Debug)]
pub struct ParseError {
  pub pos: usize,
  pub msg: String,
}

impl std::fmt::Display for ParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "parse error at {}: {}", self.pos, self.msg)
  }
}

pub type Result<T> = std::result::Result<T, ParseError>;

pub struct Parser {
  chars: Vec<char>,
  pos: usize,
}

/// Parse a full statement.
pub fn parse(text: &str) -> Result<Term> {
  let mut p = Parser::new(text);
  let t = p.statement()?;
  p.skip_ws();
  if p.pos < p.chars.len() {
    return Err(p.err("trailing input"))
  }
  Ok(t)
}

/// Parse a quantifier-zone line: a sequence of `∀x`/`∃x` with no body.
pub fn parse_qz(text: &str) -> Result<Vec<(QuantKind, Var)>> {
  let mut p = Parser::new(text);
  let mut out = vec![];
  loop {
    p.skip_ws();
    if p.pos >= p.chars.len() {
      return Ok(out)
    }
    let Some(kind) = p.quantifier() else { return Err(p.err("expected quantifier")) };
    let name = p.ident().ok_or_else(|| p.err("expected variable"))?;
    out.push((kind, Var::new(name)))
  }
}

impl Parser {
  fn new(text: &str) -> Self { Parser { chars: text.chars().collect(), pos: 0 } }

  fn err(&self, msg: &str) -> ParseError { ParseError { pos: self.pos, msg: msg.to_owned() } }

  fn skip_ws(&mut self) {
    while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
      self.pos += 1
    }
  }

  fn peek(&self) -> Option<char> { self.chars.get(self.pos).copied() }

  /// Consume `tok` if the input continues with it.
  fn eat(&mut self, tok: &str) -> bool {
    self.skip_ws();
    let toks: Vec<char> = tok.chars().collect();
    if self.chars[self.pos..].starts_with(&toks) {
      // an alphabetic keyword must not run into a longer identifier
      if toks.iter().all(|c| c.is_alphabetic() || *c == '\\') {
        if let Some(c) = self.chars.get(self.pos + toks.len()) {
          if c.is_alphanumeric() || *c == '_' {
            return false
          }
        }
      }
      self.pos += toks.len();
      true
    } else {
      false
    }
  }

  fn ident(&mut self) -> Option<String> {
    self.skip_ws();
    let start = self.pos;
    while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
      self.pos += 1
    }
    if self.pos == start {
      None
    } else {
      Some(self.chars[start..self.pos].iter().collect())
    }
  }

  fn quantifier(&mut self) -> Option<QuantKind> {
    if self.eat("∀") || self.eat("\\forall") {
      Some(QuantKind::Forall)
    } else if self.eat("∃") || self.eat("\\exists") {
      Some(QuantKind::Exists)
    } else {
      None
    }
  }

  fn statement(&mut self) -> Result<Term> {
    if let Some(t) = self.quantified()? {
      return Ok(t)
    }
    self.implication()
  }

  fn quantified(&mut self) -> Result<Option<Term>> {
    self.skip_ws();
    let Some(kind) = self.quantifier() else { return Ok(None) };
    let name = self.ident().ok_or_else(|| self.err("expected bound variable"))?;
    let mut body = self.statement()?;
    body.mark_binder(&name);
    Ok(Some(Term::Quant(kind, Var::new(name), Box::new(body))))
  }

  // ⇒ and ⇔ are right associative and bind loosest; their right operand is
  // a full statement so a quantifier may follow without parentheses
  fn implication(&mut self) -> Result<Term> {
    let l = self.disjunction()?;
    if self.eat("⇔") || self.eat("<=>") || self.eat("\\iff") {
      let r = self.statement()?;
      Ok(Term::bin(BinOp::Iff, l, r))
    } else if self.eat("⇒") || self.eat("=>") || self.eat("\\implies") {
      let r = self.statement()?;
      Ok(Term::bin(BinOp::Implies, l, r))
    } else {
      Ok(l)
    }
  }

  fn disjunction(&mut self) -> Result<Term> {
    let mut l = self.conjunction()?;
    while self.eat("∨") || self.eat("|") || self.eat("\\vee") {
      let r = self.conjunction()?;
      l = Term::bin(BinOp::Or, l, r)
    }
    Ok(l)
  }

  fn conjunction(&mut self) -> Result<Term> {
    let mut l = self.negation()?;
    while self.eat("∧") || self.eat("&") || self.eat("\\wedge") {
      let r = self.negation()?;
      l = Term::bin(BinOp::And, l, r)
    }
    Ok(l)
  }

  fn negation(&mut self) -> Result<Term> {
    if self.eat("¬") || self.eat("\\neg") {
      return Ok(Term::Not(Box::new(self.negation_body()?)))
    }
    // `!` but not `!=`
    self.skip_ws();
    if self.peek() == Some('!') && self.chars.get(self.pos + 1) != Some(&'=') {
      self.pos += 1;
      return Ok(Term::Not(Box::new(self.negation_body()?)))
    }
    self.relation()
  }

  // ¬ may be applied directly to a quantified statement
  fn negation_body(&mut self) -> Result<Term> {
    if let Some(t) = self.quantified()? {
      return Ok(t)
    }
    self.negation()
  }

  fn next_is(&mut self, tok: &str) -> bool {
    self.skip_ws();
    let toks: Vec<char> = tok.chars().collect();
    self.chars[self.pos..].starts_with(&toks)
  }

  fn relation(&mut self) -> Result<Term> {
    let l = self.additive()?;
    // the ASCII spellings of ⇒ and ⇔ begin like = and <=; leave them for
    // implication()
    if self.next_is("=>") || self.next_is("<=>") {
      return Ok(l)
    }
    for (toks, op) in [
      (&["≠", "!=", "\\neq"][..], BinOp::Neq),
      (&["≤", "<=", "\\leq"][..], BinOp::Leq),
      (&["≥", ">=", "\\geq"][..], BinOp::Geq),
      (&["⊆", "\\subseteq"][..], BinOp::Subseteq),
      (&["⊂", "\\subset"][..], BinOp::Subset),
      (&["∈", "\\in"][..], BinOp::Elem),
      (&["→", "\\to"][..], BinOp::To),
      (&["="][..], BinOp::Eq),
      (&["<"][..], BinOp::Lt),
      (&[">"][..], BinOp::Gt),
    ] {
      if toks.iter().any(|t| self.eat(t)) {
        let r = self.additive()?;
        return Ok(Term::bin(op, l, r))
      }
    }
    Ok(l)
  }

  fn additive(&mut self) -> Result<Term> {
    let mut l = self.multiplicative()?;
    loop {
      let op = if self.eat("+") {
        BinOp::Add
      } else if self.eat("∪") || self.eat("\\cup") {
        BinOp::Union
      } else if self.eat("∩") || self.eat("\\cap") {
        BinOp::Inter
      } else if self.eat("\\setminus") {
        BinOp::Diff
      } else if self.eat("-") {
        BinOp::Sub
      } else {
        return Ok(l)
      };
      let r = self.multiplicative()?;
      l = Term::bin(op, l, r)
    }
  }

  fn multiplicative(&mut self) -> Result<Term> {
    let mut l = self.power()?;
    loop {
      let op = if self.eat("*") {
        BinOp::Mul
      } else if self.eat("/") {
        BinOp::Div
      } else {
        return Ok(l)
      };
      let r = self.power()?;
      l = Term::bin(op, l, r)
    }
  }

  fn power(&mut self) -> Result<Term> {
    let l = self.atom()?;
    if self.eat("^") {
      let r = self.power()?;
      return Ok(Term::bin(BinOp::Pow, l, r))
    }
    Ok(l)
  }

  fn atom(&mut self) -> Result<Term> {
    self.skip_ws();
    if self.eat("(") {
      let t = self.statement()?;
      if !self.eat(")") {
        return Err(self.err("expected ')'"))
      }
      return Ok(t)
    }
    if self.eat("⊤") || self.eat("\\top") {
      return Ok(Term::Bool(true))
    }
    if self.eat("⊥") || self.eat("\\bot") {
      return Ok(Term::Bool(false))
    }
    match self.peek() {
      Some(c) if c.is_ascii_digit() => {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
          self.pos += 1
        }
        let s: String = self.chars[start..self.pos].iter().collect();
        Ok(Term::Num(s.parse().map_err(|_| self.err("numeral out of range"))?))
      }
      Some(c) if c.is_alphanumeric() || c == '_' => {
        let name = self.ident().unwrap();
        if self.eat("(") {
          let mut args = vec![self.statement()?];
          while self.eat(",") {
            args.push(self.statement()?)
          }
          if !self.eat(")") {
            return Err(self.err("expected ')'"))
          }
          let mac = match &*name {
            "universe" => Some(MacroKind::Universe),
            "domain" => Some(MacroKind::Domain),
            "codomain" => Some(MacroKind::Codomain),
            _ => None,
          };
          if let Some(k) = mac {
            if args.len() != 1 {
              return Err(self.err("macro takes one argument"))
            }
            return Ok(Term::Macro(k, Box::new(args.pop().unwrap())))
          }
          Ok(Term::apply(Var::new(name), args))
        } else if is_var_name(&name) {
          Ok(Term::Var(Var::new(name)))
        } else {
          Ok(Term::Sym(name))
        }
      }
      // a non-ASCII symbol like ℕ or ∅ stands alone
      Some(c) if !c.is_ascii() => {
        self.pos += 1;
        Ok(Term::Sym(c.to_string()))
      }
      _ => Err(self.err("expected a term")),
    }
  }
}

/// Single letters (with an optional numeric subscript) are variables;
/// longer names are constants known to the system.
fn is_var_name(name: &str) -> bool {
  let mut it = name.chars();
  match it.next() {
    Some(c) if c.is_ascii_alphabetic() => {}
    _ => return false,
  }
  match it.next() {
    None => true,
    Some('_') => it.all(|c| c.is_ascii_digit()),
    Some(_) => false,
  }
}

/// Mark a metavariable when reconstructing terms in tests.
#[cfg(test)]
pub fn parse_with_metavars(text: &str, metavars: &[&str]) -> Result<Term> {
  let mut t = parse(text)?;
  fn mark(t: &mut Term, mv: &[&str]) {
    match t {
      Term::Var(v) =>
        if mv.contains(&&*v.name) {
          v.metavar = true
        },
      Term::Apply { f, args, .. } => {
        if mv.contains(&&*f.name) {
          f.metavar = true
        }
        args.iter_mut().for_each(|a| mark(a, mv))
      }
      Term::Macro(_, a) | Term::Not(a) => mark(a, mv),
      Term::Quant(_, _, body) => mark(body, mv),
      Term::Bin(_, l, r) => {
        mark(l, mv);
        mark(r, mv)
      }
      _ => {}
    }
  }
  mark(&mut t, metavars);
  Ok(t)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roundtrip_basic_statements() {
    for s in [
      "∀x (P(x) ⇒ Q(x))",
      "P(a)∧Q(b)",
      "x ∈ A ∪ B",
      "∃y y ∈ A",
      "¬(x = 0)",
      "A ⊆ B ⇒ (x ∈ A ⇒ x ∈ B)",
    ] {
      let t = parse(s).unwrap();
      assert_eq!(parse(&t.to_string()).unwrap().to_string(), t.to_string());
    }
  }

  #[test]
  fn ascii_aliases() {
    assert_eq!(parse("P(x) => Q(x)").unwrap().to_string(), "P(x) ⇒ Q(x)");
    assert_eq!(parse("P(x) <=> Q(x)").unwrap().to_string(), "P(x) ⇔ Q(x)");
    assert_eq!(parse("\\forall x x <= y").unwrap().to_string(), "∀x x ≤ y");
    assert_eq!(parse("a != b & c \\in A").unwrap().to_string(), "a ≠ b∧c ∈ A");
  }

  #[test]
  fn quantifier_after_connective() {
    // the definition-record shape: a quantified biconditional whose right
    // side is itself quantified
    let s = "∀A ∀B (A ⊆ B ⇔ ∀x (x ∈ A ⇒ x ∈ B))";
    let t = parse(s).unwrap();
    assert_eq!(parse(&t.to_string()).unwrap().to_string(), t.to_string());
    let t = parse("P(a) ⇒ ∀x Q(x)").unwrap();
    let Term::Bin(BinOp::Implies, _, r) = t else { panic!() };
    assert!(matches!(*r, Term::Quant(QuantKind::Forall, ..)));
    let t = parse("¬∀x P(x)").unwrap();
    let Term::Not(inner) = t else { panic!() };
    assert!(matches!(*inner, Term::Quant(..)));
  }

  #[test]
  fn quantifier_marks_binders() {
    let t = parse("∀x P(x)").unwrap();
    let Term::Quant(QuantKind::Forall, _, body) = t else { panic!() };
    assert!(body.contains_binder());
  }

  #[test]
  fn macro_terms() {
    let t = parse("x ∈ universe(y)").unwrap();
    let Term::Bin(BinOp::Elem, _, r) = t else { panic!() };
    assert!(matches!(*r, Term::Macro(MacroKind::Universe, _)));
  }

  #[test]
  fn qz_line() {
    let qz = parse_qz("∀x ∀y ∃z").unwrap();
    assert_eq!(qz.len(), 3);
    assert!(matches!(qz[2].0, QuantKind::Exists));
    assert_eq!(qz[1].1.name, "y");
  }

  #[test]
  fn rejects_garbage() {
    assert!(parse("∀").is_err());
    assert!(parse("P(x").is_err());
    assert!(parse("x = = y").is_err());
  }
}

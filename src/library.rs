//! The theorem library: sequential text records keyed by byte offset.
//! Building the index reads only each record's signature header; a record's
//! statements are materialized into terms on demand, and only the candidates
//! that survive the constant filters ever pay that cost.

use crate::consts::ConstGraph;
use crate::error::FatalError;
use crate::parser::{parse, parse_qz};
use crate::types::{BinOp, Deps, Tableau, Term};

/// A parsed constant-signature line. The pair markers record which
/// auto-node (implication, equality, biconditional) anchors the theorem
/// before its body has been read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SigShape {
  Plain(Vec<String>),
  Pair(Vec<String>, Vec<String>),
  EqPair(Vec<String>, Vec<String>),
  IffPair(Vec<String>, Vec<String>),
}

/// One library record, header parsed, body kept as raw lines.
#[derive(Clone, Debug)]
pub struct Record {
  pub offset: u64,
  pub title: String,
  pub sig: SigShape,
  pub neg_sig: SigShape,
  pub def_sig: Vec<String>,
  pub tags: Vec<String>,
  qz_line: Option<String>,
  hyp_lines: Vec<String>,
  tar_lines: Vec<String>,
}

impl Record {
  pub fn is_definition(&self) -> bool { self.tags.iter().any(|t| t == "#definition") }

  /// Parse the record body into one closed statement: the quantifier-zone
  /// prefix wrapped around `hyps ⇒ targets` (or just the targets when the
  /// hypothesis block is empty, as in definitions).
  pub fn materialize(&self) -> Result<Term, FatalError> {
    let bad = |msg: String| FatalError::MalformedRecord { offset: self.offset, msg };
    let stmt = |line: &str| parse(line).map_err(|e| bad(e.to_string()));
    let mut tars = vec![];
    for line in &self.tar_lines {
      tars.push(stmt(line)?)
    }
    if tars.is_empty() {
      return Err(bad("empty target block".into()))
    }
    let conclusion = conjoin(tars);
    let mut body = if self.hyp_lines.is_empty() {
      conclusion
    } else {
      let mut hyps = vec![];
      for line in &self.hyp_lines {
        hyps.push(stmt(line)?)
      }
      Term::bin(BinOp::Implies, conjoin(hyps), conclusion)
    };
    if let Some(qz) = &self.qz_line {
      let qz = parse_qz(qz).map_err(|e| bad(e.to_string()))?;
      for (kind, var) in qz.into_iter().rev() {
        body.mark_binder(&var.name);
        body = Term::Quant(kind, var, Box::new(body));
      }
    }
    Ok(body)
  }

  /// The starting tableau of a proof attempt on this record. Quantifier-zone
  /// variables are left free: a universal goal is proved for fixed arbitrary
  /// constants, and the same names in the hypothesis block refer to them.
  pub fn attempt_tableau(&self) -> Result<Tableau, FatalError> {
    let bad = |msg: String| FatalError::MalformedRecord { offset: self.offset, msg };
    let stmt = |line: &str| parse(line).map_err(|e| bad(e.to_string()));
    let mut tl = Tableau::new();
    for line in &self.hyp_lines {
      tl.append_hyp(stmt(line)?, Deps::Any);
    }
    for line in &self.tar_lines {
      tl.append_tar(stmt(line)?);
    }
    Ok(tl)
  }
}

fn conjoin(mut ts: Vec<Term>) -> Term {
  let last = ts.pop().unwrap_or(Term::Bool(true));
  ts.into_iter().rev().fold(last, |acc, t| Term::bin(BinOp::And, t, acc))
}

pub struct LibraryIndex {
  pub records: Vec<Record>,
}

impl LibraryIndex {
  /// Read records sequentially, stopping before the record at
  /// `stop_offset` (the theorem being proved may not use itself or
  /// anything after it).
  pub fn build(text: &str, stop_offset: Option<u64>) -> Result<LibraryIndex, FatalError> {
    let mut lines: Vec<(u64, &str)> = vec![];
    let mut pos = 0u64;
    for line in text.split_inclusive('\n') {
      lines.push((pos, line.trim_end_matches('\n').trim_end_matches('\r')));
      pos += line.len() as u64;
    }
    let mut records = vec![];
    let mut i = 0;
    while i < lines.len() {
      if lines[i].1.trim().is_empty() {
        i += 1;
        continue
      }
      let offset = lines[i].0;
      if stop_offset.is_some_and(|stop| offset >= stop) {
        break
      }
      let (record, next) = Self::record(&lines, i, offset)?;
      records.push(record);
      i = next;
    }
    Ok(LibraryIndex { records })
  }

  fn record(lines: &[(u64, &str)], start: usize, offset: u64) -> Result<(Record, usize), FatalError> {
    let bad = |msg: &str| FatalError::MalformedRecord { offset, msg: msg.to_owned() };
    let line = |i: usize| lines.get(i).map(|&(_, l)| l).ok_or_else(|| bad("truncated record"));
    let title = line(start)?.to_owned();
    let sig = parse_sig(line(start + 1)?).ok_or_else(|| bad("bad signature line"))?;
    let neg_sig = parse_sig(line(start + 2)?).ok_or_else(|| bad("bad negated-signature line"))?;
    let def_sig = match parse_sig(line(start + 3)?) {
      Some(SigShape::Plain(cs)) => cs,
      _ => return Err(bad("bad definition-signature line")),
    };
    let tags_line = line(start + 4)?;
    let Some(rest) = tags_line.strip_prefix("Tags:") else { return Err(bad("missing Tags line")) };
    let tags: Vec<String> = rest.split_whitespace().map(str::to_owned).collect();
    if tags.iter().any(|t| !t.starts_with('#')) {
      return Err(bad("tags must be #hashtags"))
    }
    let mut i = start + 5;
    let mut qz_line = None;
    let mut hyp_lines = vec![];
    if line(i)? != "---" {
      // a line of bare quantifiers is the shared quantifier zone; anything
      // else already belongs to the hypothesis block
      if parse_qz(line(i)?).is_ok() {
        qz_line = Some(line(i)?.to_owned());
        i += 1;
      }
      while line(i)? != "---" {
        if line(i)?.trim().is_empty() {
          return Err(bad("hypothesis block not terminated by ---"))
        }
        hyp_lines.push(line(i)?.to_owned());
        i += 1;
      }
    }
    i += 1; // the --- separator
    let mut tar_lines = vec![];
    while let Ok(l) = line(i) {
      if l.trim().is_empty() {
        break
      }
      tar_lines.push(l.to_owned());
      i += 1;
    }
    if tar_lines.is_empty() {
      return Err(bad("empty target block"))
    }
    Ok((
      Record { offset, title, sig, neg_sig, def_sig, tags, qz_line, hyp_lines, tar_lines },
      i + 1,
    ))
  }

  /// Non-definition implication/biconditional records safe to introduce
  /// under the maximal-constant ceiling. Both the direct and the negated
  /// (contrapositive) reading are offered, each as its own candidate; the
  /// relevant side is the antecedent for forward reasoning and the
  /// conclusion for backward reasoning.
  pub fn filter_theorems(
    &self, graph: &ConstGraph, maximal: &[String], forward: bool,
  ) -> Vec<(usize, bool)> {
    let mut out = vec![];
    for (i, r) in self.records.iter().enumerate() {
      if r.is_definition() {
        continue
      }
      for (negate, sig) in [(false, &r.sig), (true, &r.neg_sig)] {
        let side = match sig {
          SigShape::Pair(h, t) | SigShape::IffPair(h, t) =>
            if forward {
              h
            } else {
              t
            },
          _ => continue,
        };
        if graph.check_maximal(maximal, side) {
          out.push((i, negate))
        }
      }
    }
    out
  }

  /// Definition records whose defining side's constants all occur in the
  /// query set.
  pub fn filter_definitions(&self, constants: &[String]) -> Vec<usize> {
    self
      .records
      .iter()
      .enumerate()
      .filter(|(_, r)| {
        r.is_definition()
          && !r.def_sig.is_empty()
          && r.def_sig.iter().all(|c| constants.contains(c))
      })
      .map(|(i, _)| i)
      .collect()
  }
}

/// The conclusion-side constants of a signature, for the ratio heuristic's
/// containment pre-check.
pub fn conclusion_constants(sig: &SigShape) -> &[String] {
  match sig {
    SigShape::Plain(cs) => cs,
    SigShape::Pair(_, t) | SigShape::EqPair(_, t) | SigShape::IffPair(_, t) => t,
  }
}

fn parse_sig(line: &str) -> Option<SigShape> {
  let line = line.trim();
  if line.starts_with('[') {
    let (cs, rest) = parse_list(line)?;
    return rest.trim().is_empty().then_some(SigShape::Plain(cs))
  }
  let inner = line.strip_prefix('(')?.strip_suffix(')')?.trim();
  let (mk, inner): (fn(_, _) -> SigShape, &str) = if let Some(rest) = inner.strip_prefix("=,") {
    (SigShape::EqPair, rest)
  } else if let Some(rest) = inner.strip_prefix("\\iff,") {
    (SigShape::IffPair, rest)
  } else {
    (SigShape::Pair, inner)
  };
  let (l, rest) = parse_list(inner.trim_start())?;
  let rest = rest.trim_start().strip_prefix(',')?;
  let (r, rest) = parse_list(rest.trim_start())?;
  rest.trim().is_empty().then_some(mk(l, r))
}

/// Parse a `['a', 'b', ...]` list, returning the remaining input.
fn parse_list(s: &str) -> Option<(Vec<String>, &str)> {
  let mut rest = s.strip_prefix('[')?;
  let mut out = vec![];
  loop {
    rest = rest.trim_start();
    if let Some(r) = rest.strip_prefix(']') {
      return Some((out, r))
    }
    if !out.is_empty() {
      rest = rest.strip_prefix(',')?.trim_start();
    }
    rest = rest.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    out.push(rest[..end].to_owned());
    rest = &rest[end + 1..];
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consts::GRAPH;

  const LIB: &str = "\
Transitivity of subset
(['⊆'], ['⊆'])
(['⊆'], ['⊆'])
[]
Tags: #set #subset
∀A ∀B ∀C
A ⊆ B
B ⊆ C
---
A ⊆ C

Proper subset
(['⊂'], ['⊂'])
(['⊂'], ['⊂'])
[]
Tags: #set
∀A ∀B ∀C
A ⊂ B
B ⊂ C
---
A ⊂ C

Definition of subset
[]
[]
['⊆']
Tags: #set #definition
---
∀A ∀B (A ⊆ B ⇔ ∀x (x ∈ A ⇒ x ∈ B))

Union upper bound
(['∈'], ['∈', '∪'])
(['∈', '∪'], ['∈'])
[]
Tags: #set
∀A ∀B ∀x
x ∈ A
---
x ∈ A ∪ B
";

  #[test]
  fn index_reads_all_records() {
    let index = LibraryIndex::build(LIB, None).unwrap();
    assert_eq!(index.records.len(), 4);
    assert_eq!(index.records[0].title, "Transitivity of subset");
    assert!(index.records[2].is_definition());
    assert_eq!(index.records[0].offset, 0);
    assert!(index.records[1].offset > 0);
  }

  #[test]
  fn stop_offset_excludes_later_records() {
    let full = LibraryIndex::build(LIB, None).unwrap();
    let stop = full.records[2].offset;
    let index = LibraryIndex::build(LIB, Some(stop)).unwrap();
    assert_eq!(index.records.len(), 2);
  }

  #[test]
  fn materialize_builds_quantified_implication() {
    let index = LibraryIndex::build(LIB, None).unwrap();
    let t = index.records[0].materialize().unwrap();
    assert_eq!(t.to_string(), "∀A ∀B ∀C A ⊆ B∧B ⊆ C ⇒ A ⊆ C");
    let d = index.records[2].materialize().unwrap();
    assert!(matches!(d, Term::Quant(..)));
  }

  #[test]
  fn attempt_keeps_zone_variables_free() {
    let index = LibraryIndex::build(LIB, None).unwrap();
    let tl = index.records[0].attempt_tableau().unwrap();
    assert_eq!(tl.hyps.len(), 2);
    assert_eq!(tl.tars.len(), 1);
    assert_eq!(tl.hyps.0[0].to_string(), "A ⊆ B");
    assert_eq!(tl.tars.0[0].to_string(), "A ⊆ C");
  }

  #[test]
  fn maximal_constant_gating() {
    let index = LibraryIndex::build(LIB, None).unwrap();
    // the ceiling is always an antichain; ⊆ alone already covers ∈
    let maximal = vec!["⊆".to_owned()];
    let picked = index.filter_theorems(&GRAPH, &maximal, false);
    let titles: Vec<&str> =
      picked.iter().map(|&(i, _)| index.records[i].title.as_str()).collect();
    // ⊂ dominates ⊆, so the proper-subset theorem is gated out even though
    // it would unify with a subset goal after expansion
    assert!(titles.contains(&"Transitivity of subset"));
    assert!(!titles.contains(&"Proper subset"));
    // definitions never appear among theorem candidates
    assert!(!titles.contains(&"Definition of subset"));
  }

  #[test]
  fn union_gated_by_ceiling() {
    let index = LibraryIndex::build(LIB, None).unwrap();
    // without ∪ among the maximal constants the direct reading is excluded
    // (the contrapositive reading's conclusion mentions only ∈ and stays)
    let narrow = vec!["∈".to_owned()];
    let picked = index.filter_theorems(&GRAPH, &narrow, false);
    assert!(picked
      .iter()
      .all(|&(i, neg)| neg || index.records[i].title != "Union upper bound"));
    let wide = vec!["∪".to_owned()];
    let picked = index.filter_theorems(&GRAPH, &wide, false);
    assert!(picked
      .iter()
      .any(|&(i, neg)| !neg && index.records[i].title == "Union upper bound"));
  }

  #[test]
  fn definition_filter_checks_subset() {
    let index = LibraryIndex::build(LIB, None).unwrap();
    let defs = index.filter_definitions(&["⊆".to_owned(), "∈".to_owned()]);
    assert_eq!(defs.len(), 1);
    assert!(index.filter_definitions(&["∪".to_owned()]).is_empty());
  }

  #[test]
  fn signature_shapes() {
    assert_eq!(
      parse_sig("['a', 'b']"),
      Some(SigShape::Plain(vec!["a".into(), "b".into()]))
    );
    assert_eq!(
      parse_sig("(=, ['l'], ['r'])"),
      Some(SigShape::EqPair(vec!["l".into()], vec!["r".into()]))
    );
    assert_eq!(
      parse_sig("(\\iff, [], ['c'])"),
      Some(SigShape::IffPair(vec![], vec!["c".into()]))
    );
    assert!(parse_sig("not a signature").is_none());
  }

  #[test]
  fn malformed_record_is_fatal() {
    let broken = "Some theorem\n['a']\n['a']\n[]\nTags: #x\nP(a)\nno separator follows\n";
    assert!(matches!(
      LibraryIndex::build(broken, None),
      Err(FatalError::MalformedRecord { .. })
    ));
  }
}

//! The constant-dominance order. A constant dominates the constants its
//! definition is built from; the library gate only admits theorems whose
//! constants stay at or below what the tableau already mentions, which keeps
//! the search from chasing ever more complex library material.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Immediate "defined from" edges. Acyclic by construction: a constant can
/// only be defined from constants that already existed.
static EDGES: &[(&str, &[&str])] = &[
  ("≠", &["="]),
  ("≤", &["<", "="]),
  ("≥", &["≤"]),
  (">", &["<"]),
  ("∅", &["∈"]),
  ("⊆", &["∈"]),
  ("⊂", &["⊆", "≠"]),
  ("∪", &["∈"]),
  ("∩", &["∈"]),
  ("\\", &["∈"]),
  ("→", &["∈"]),
  ("𝒫", &["⊆"]),
  ("ℤ", &["ℕ"]),
  ("ℚ", &["ℤ"]),
  ("ℝ", &["ℚ"]),
  ("ℂ", &["ℝ"]),
  ("-", &["+"]),
  ("*", &["+"]),
  ("/", &["*"]),
  ("^", &["*"]),
  ("min", &["≤"]),
  ("max", &["≤"]),
  ("inv", &["∘"]),
  ("∘", &["→"]),
];

pub struct ConstGraph {
  children: HashMap<&'static str, &'static [&'static str]>,
}

/// The process-wide graph; immutable after construction.
pub static GRAPH: Lazy<ConstGraph> = Lazy::new(|| ConstGraph {
  children: EDGES.iter().map(|&(p, cs)| (p, cs)).collect(),
});

impl ConstGraph {
  /// True iff `c2` is a strict descendant of `c1`, that is `c1` is built
  /// (transitively) from `c2`. Incomparable or equal constants give false.
  pub fn greater(&self, c1: &str, c2: &str) -> bool {
    if c1 == c2 {
      return false
    }
    let Some(children) = self.children.get(c1) else { return false };
    children.iter().any(|&c| c == c2 || self.greater(c, c2))
  }

  /// Library-safety gate: no constant in `constants` may dominate a
  /// constant already maximal in the tableau.
  pub fn check_maximal(&self, maximal: &[String], constants: &[String]) -> bool {
    !constants.iter().any(|c| maximal.iter().any(|m| self.greater(c, m)))
  }

  /// The antichain of maximal elements of `pool`: each candidate is added
  /// unless something already present dominates it, and evicts anything it
  /// dominates.
  pub fn maximal_constants_of(&self, pool: &[String]) -> Vec<String> {
    let mut maximal: Vec<String> = vec![];
    for c in pool {
      if maximal.iter().any(|m| m == c || self.greater(m, c)) {
        continue
      }
      maximal.retain(|m| !self.greater(c, m));
      maximal.push(c.clone());
    }
    maximal
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn s(items: &[&str]) -> Vec<String> { items.iter().map(|i| i.to_string()).collect() }

  #[test]
  fn antisymmetry() {
    let names: Vec<&str> = EDGES.iter().map(|&(p, _)| p).collect();
    for &a in &names {
      for &b in &names {
        if a != b {
          assert!(!(GRAPH.greater(a, b) && GRAPH.greater(b, a)), "{a} vs {b}");
        }
      }
    }
  }

  #[test]
  fn transitive_descent() {
    assert!(GRAPH.greater("⊂", "∈"));
    assert!(GRAPH.greater("ℂ", "ℕ"));
    assert!(!GRAPH.greater("∈", "⊂"));
    assert!(!GRAPH.greater("∪", "∩"));
  }

  #[test]
  fn maximal_set_is_an_antichain() {
    let maximal = GRAPH.maximal_constants_of(&s(&["∈", "⊆", "⊂", "∪", "="]));
    assert!(maximal.contains(&"⊂".to_string()));
    assert!(maximal.contains(&"∪".to_string()));
    assert!(!maximal.contains(&"∈".to_string()));
    assert!(!maximal.contains(&"⊆".to_string()));
    // ⊂ dominates ≠ dominates =
    assert!(!maximal.contains(&"=".to_string()));
  }

  #[test]
  fn gate_rejects_dominating_constants() {
    let maximal = s(&["⊆", "∪"]);
    assert!(GRAPH.check_maximal(&maximal, &s(&["∈", "∪", "="])));
    // ⊂ is built from ⊆, so it sits strictly above the ceiling
    assert!(!GRAPH.check_maximal(&maximal, &s(&["⊂"])));
    assert!(!GRAPH.check_maximal(&maximal, &s(&["𝒫"])));
  }
}

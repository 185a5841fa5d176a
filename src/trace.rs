//! The presentation-layer seam. The search engine never reads back from a
//! sink; it only reports which statements each successful mover changed.

use crate::types::{Diff, Idx, Tableau};
use serde_derive::Serialize;
use std::io::Write;

pub trait Present {
  fn present(&mut self, tl: &Tableau, diff: &Diff);
}

/// No presentation layer attached.
pub struct Silent;

impl Present for Silent {
  fn present(&mut self, _: &Tableau, _: &Diff) {}
}

#[derive(Serialize)]
struct Entry {
  index: usize,
  text: String,
  active: bool,
}

#[derive(Serialize)]
struct DiffRecord {
  hyps: Vec<Entry>,
  tars: Vec<Entry>,
}

/// Streams one JSON object per mover diff, newline separated.
pub struct JsonTrace<W> {
  out: W,
}

impl<W: Write> JsonTrace<W> {
  pub fn new(out: W) -> Self { JsonTrace { out } }
}

impl<W: Write> Present for JsonTrace<W> {
  fn present(&mut self, tl: &Tableau, diff: &Diff) {
    let rec = DiffRecord {
      hyps: diff
        .hyps
        .iter()
        .map(|&i| Entry {
          index: i.into_usize(),
          text: tl.hyps[i].to_string(),
          active: tl.active_hyp.contains(&i),
        })
        .collect(),
      tars: diff
        .tars
        .iter()
        .map(|&i| Entry {
          index: i.into_usize(),
          text: tl.tars[i].to_string(),
          active: tl.active_tar.contains(&i),
        })
        .collect(),
    };
    // a broken sink must not abort the search
    if serde_json::to_writer(&mut self.out, &rec).is_ok() {
      let _ = self.out.write_all(b"\n");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::types::{Deps, HypId};

  #[test]
  fn diffs_stream_as_json_lines() {
    let mut tl = Tableau::new();
    let h = tl.append_hyp(parse("P(a)").unwrap(), Deps::Any);
    let mut sink = JsonTrace::new(Vec::new());
    sink.present(&tl, &Diff::hyp(h));
    let line = String::from_utf8(sink.out).unwrap();
    let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(v["hyps"][0]["index"], 0);
    assert_eq!(v["hyps"][0]["text"], "P(a)");
    assert_eq!(v["hyps"][0]["active"], true);
    assert_eq!(HypId(0), h);
  }
}

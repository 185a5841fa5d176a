use clap::Parser;
use enum_map::EnumMap;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

mod automate;
mod consts;
mod error;
mod format;
mod library;
mod moves;
mod parser;
mod trace;
mod types;
mod unify;

use crate::automate::{Driver, Outcome, Rule};
use crate::library::{LibraryIndex, Record};
use crate::trace::{JsonTrace, Present, Silent};

pub fn stat(s: &'static str) {
  *STATS.lock().unwrap().get_or_insert_with(HashMap::new).entry(s).or_default() += 1;
}

#[macro_export]
macro_rules! vprintln {
  ($($args:tt)*) => {
    if $crate::verbose() {
      eprintln!($($args)*)
    }
  };
}

static VERBOSE: AtomicBool = AtomicBool::new(false);
pub fn verbose() -> bool { VERBOSE.load(std::sync::atomic::Ordering::SeqCst) }
pub fn set_verbose(b: bool) { VERBOSE.store(b, std::sync::atomic::Ordering::SeqCst) }

static STATS: Mutex<Option<HashMap<&'static str, u32>>> = Mutex::new(None);

fn print_stats_and_exit() -> ! {
  let mut g = STATS.lock().unwrap();
  let mut vec: Vec<_> = g.get_or_insert_with(HashMap::new).iter().collect();
  vec.sort();
  for (s, i) in vec {
    println!("{s}: {i}");
  }
  std::process::exit(0)
}

/// Attempt every theorem in a library file, each proved from only the
/// records preceding it.
#[derive(Parser)]
#[command(name = "tableau-rs")]
struct Cli {
  /// the library file of theorem and definition records
  library: PathBuf,

  /// attempt only the records whose title contains this string
  #[arg(long)]
  theorem: Option<String>,

  /// write every rule firing as a line of JSON to this file
  #[arg(long)]
  json: Option<PathBuf>,

  /// log rule firings to stderr
  #[arg(short, long)]
  verbose: bool,

  /// stop at the first failed attempt
  #[arg(long)]
  one_error: bool,
}

fn main() {
  let cli = Cli::parse();
  set_verbose(cli.verbose);
  let text = match std::fs::read_to_string(&cli.library) {
    Ok(text) => text,
    Err(e) => {
      eprintln!("cannot read {}: {e}", cli.library.display());
      std::process::exit(1)
    }
  };
  let full = match LibraryIndex::build(&text, None) {
    Ok(index) => index,
    Err(e) => e.report(&cli.library),
  };
  ctrlc::set_handler(|| print_stats_and_exit()).expect("Error setting Ctrl-C handler");
  match &cli.json {
    Some(path) => {
      let file = match std::fs::File::create(path) {
        Ok(file) => file,
        Err(e) => {
          eprintln!("cannot create {}: {e}", path.display());
          std::process::exit(1)
        }
      };
      run(&cli, full, &mut JsonTrace::new(BufWriter::new(file)))
    }
    None => run(&cli, full, &mut Silent),
  }
}

fn run(cli: &Cli, full: LibraryIndex, present: &mut impl Present) -> ! {
  let jobs: Vec<&Record> = full
    .records
    .iter()
    .filter(|r| !r.is_definition())
    .filter(|r| cli.theorem.as_ref().is_none_or(|s| r.title.contains(s)))
    .collect();
  let progress = ProgressBar::with_draw_target(
    Some(jobs.len() as u64),
    ProgressDrawTarget::stdout_with_hz(5),
  );
  if let Ok(style) = ProgressStyle::with_template("[{pos:>5}/{len:5}] {wide_bar} {msg}") {
    progress.set_style(style)
  }
  let mut rules: EnumMap<Rule, u32> = EnumMap::default();
  for rec in jobs {
    progress.set_message(rec.title.clone());
    // every attempt sees only the records before its own
    let index = LibraryIndex {
      records: full.records.iter().filter(|r| r.offset < rec.offset).cloned().collect(),
    };
    let tableau = match rec.attempt_tableau() {
      Ok(tl) => tl,
      Err(e) => e.report(&cli.library),
    };
    let mut driver = Driver::new(&index, present);
    match driver.automate(tableau) {
      Ok(Outcome::Proved) => {
        stat("proved");
        vprintln!("{}: proved", rec.title);
      }
      Ok(Outcome::Failed(stack)) => {
        stat("failed");
        progress.suspend(|| println!("{}: failed with {} open branches", rec.title, stack.len()));
        if cli.one_error {
          progress.finish_and_clear();
          print_stats_and_exit()
        }
      }
      Err(e) => e.report(&cli.library),
    }
    for (rule, n) in driver.stats {
      rules[rule] += n
    }
    progress.inc(1);
  }
  progress.finish_and_clear();
  for (rule, n) in rules {
    if n != 0 {
      println!("{rule:?}: {n}");
    }
  }
  print_stats_and_exit()
}

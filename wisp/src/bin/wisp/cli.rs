use std::path::PathBuf;

use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "wisp", bin_name = "wisp", about = "An embeddable Lisp-family interpreter.")]
pub enum Wisp {
    /// Starts an interactive read-eval-print loop, optionally
    /// preloading a source file first.
    Repl {
        startup_source: Option<PathBuf>,
    },
    /// Compiles and runs a single source file, printing its result
    /// and how long it took.
    Dofile {
        path: PathBuf,
    },
    /// Loads and runs the bytecode file `bc` from the current
    /// directory.
    RunBytecode,
}

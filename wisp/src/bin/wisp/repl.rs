use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use wisp::kernel;
use wisp_common::Source;

use crate::status::Status;

/// Prints `> `, reads a line, executes it, prints the result via the
/// `print` builtin, and loops — spec.md §6's `repl [startup-source]`.
/// `(quit)` exits 0 immediately; any other runtime or syntax error is
/// reported and the prompt recovers (spec.md §7), but leaves the
/// session's exit code non-zero unless it later sees `(quit)`, so an
/// unattended run that errored out still reports failure.
pub fn run(startup_source: Option<PathBuf>) -> Result<(), String> {
    let mut ctx = wisp::Context::new();
    kernel::install(&mut ctx);

    if let Some(path) = startup_source {
        let source = Source::path(&path).map_err(|e| format!("couldn't read '{}': {}", path.display(), e))?;
        if let Err(e) = ctx.exec(source) {
            Status::fatal().log(&e.to_string());
        }
    }

    let stdin = io::stdin();
    let mut exit_code = 0;

    for line in stdin.lock().lines() {
        print!("> ");
        io::stdout().flush().ok();

        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };

        if line.trim() == "(quit)" {
            std::process::exit(0);
        }
        if line.trim().is_empty() {
            continue;
        }

        match ctx.exec(Source::source(&line)) {
            Ok(result) => {
                let rendered = kernel::external_repr(ctx.heap(), result);
                println!("{}", rendered);
            }
            Err(e) => {
                Status::fatal().log(&e.to_string());
                ctx.reset();
                exit_code = 1;
            }
        }
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

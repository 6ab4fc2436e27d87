use std::path::PathBuf;
use std::time::Instant;

use wisp::kernel;
use wisp_common::Source;

/// Loads `path`, executes it, and prints wall-clock timing to stdout
/// — spec.md §6's `dofile <path>`.
pub fn run(path: PathBuf) -> Result<(), String> {
    let source = Source::path(&path).map_err(|e| format!("couldn't read '{}': {}", path.display(), e))?;

    let mut ctx = wisp::Context::new();
    kernel::install(&mut ctx);

    let start = Instant::now();
    ctx.exec(source).map_err(|e| e.to_string())?;
    let elapsed = start.elapsed();

    println!("ran in {:?}", elapsed);
    Ok(())
}

use std::fs::File;

use wisp::kernel;

/// Loads and runs the bytecode file `bc` from the current directory
/// — spec.md §6's `runBytecode`.
pub fn run() -> Result<(), String> {
    let mut file = File::open("bc").map_err(|e| format!("couldn't open 'bc': {}", e))?;

    let mut ctx = wisp::Context::new();
    kernel::install(&mut ctx);

    let results = wisp::persist::load(&mut ctx, &mut file).map_err(|e| e.to_string())?;

    for result in results {
        println!("{}", kernel::external_repr(ctx.heap(), result));
    }
    Ok(())
}

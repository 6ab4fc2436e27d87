mod cli;
mod dofile;
mod repl;
mod run_bytecode;
mod status;

use structopt::StructOpt;

use cli::Wisp;
use status::Status;

fn main() {
    let result = match Wisp::from_args() {
        Wisp::Repl { startup_source } => repl::run(startup_source),
        Wisp::Dofile { path } => dofile::run(path),
        Wisp::RunBytecode => run_bytecode::run(),
    };

    if let Err(message) = result {
        Status::fatal().log(&message);
        std::process::exit(1);
    }
}

use std::process::ExitCode;

use log::LevelFilter;

use imagine::cli::{self, Invocation};
use imagine::logger;

fn main() -> ExitCode {
    let invocation = match Invocation::parse() {
        Ok(inv) => inv,
        Err(e) => e.exit(),
    };
    logger::init(if invocation.args.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    log::debug!("{:?}", invocation.annotations);
    cli::run(invocation)
}

use super::{print_report, Failure, RuntimeArgs};
use ctk_core::Orchestrator;

pub fn run(engine: &str, args: &RuntimeArgs, json: bool) -> Result<u8, Failure> {
    let options = args.resolve(engine)?;
    let report = Orchestrator::new(options, engine)?.cleanup()?;
    print_report(&report, json)
}

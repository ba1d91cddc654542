use crate::cli::RunArgs;
use crate::dispatch::{select, Invocation, Selector, DEFINITIONS};
use crate::error::{RegtestError, Result};
use crate::output::print_warning;
use tracing::info;

pub fn handle_run_command(args: &RunArgs) -> Result<i32> {
    let selector = Selector {
        checkpath: args.checkpath.clone(),
        name: args.name.clone(),
        system: args.system.clone(),
        partitions: args.partitions.clone(),
        valid_prog_environs: args.valid_prog_environs.clone(),
        passthrough: args.passthrough.clone(),
    };

    let definition = match select(DEFINITIONS, &selector.checkpath, selector.name.as_deref()) {
        Ok(definition) => definition,
        Err(e) => {
            if let RegtestError::Selection { candidates, .. } = &e {
                for candidate in candidates {
                    print_warning(&format!("matching test: {}", candidate));
                }
            }
            return Err(e);
        }
    };

    let invocation = Invocation::build(definition, &selector)?;
    println!("{}", invocation.render());

    if args.dry_run {
        info!("dry run, {} not executed", invocation.program);
        return Ok(0);
    }
    invocation.execute()
}

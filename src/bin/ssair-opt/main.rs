// Copyright (c) 2017-2021 Fabian Schuiki

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

mod samples;

use anyhow::{anyhow, bail, Result};
use clap::Arg;
use ssair::{
    analysis::{DominatorTree, DOMINATOR_TREE_TIME},
    ir::Module,
    opt::prelude::*,
    verifier::Verifier,
};
use std::sync::atomic::Ordering;

fn main() {
    match main_inner() {
        Ok(_) => (),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn main_inner() -> Result<()> {
    let matches = app_from_crate!()
        .about("Builds sample programs and runs SSA optimization passes on them.")
        .arg(
            Arg::with_name("verbosity")
                .short("v")
                .multiple(true)
                .help(HELP_VERBOSITY.lines().next().unwrap())
                .long_help(HELP_VERBOSITY),
        )
        .arg(
            Arg::with_name("samples")
                .value_name("SAMPLE")
                .multiple(true)
                .help("Sample programs to optimize; all if omitted"),
        )
        .arg(
            Arg::with_name("list")
                .long("list")
                .help("List the available sample programs"),
        )
        .arg(
            Arg::with_name("time-passes")
                .short("t")
                .long("time")
                .help("Print execution time statistics per pass"),
        )
        .arg(
            Arg::with_name("single-threaded")
                .short("s")
                .long("no-parallel")
                .help("Do not parallelize execution"),
        )
        .arg(
            Arg::with_name("dominators")
                .short("d")
                .long("dominators")
                .help("Annotate blocks with dominance information in the output"),
        )
        .arg(
            Arg::with_name("verify-each")
                .long("verify-each")
                .help("Verify the module after every pass"),
        )
        .arg(
            Arg::with_name("max-call-depth")
                .long("max-call-depth")
                .value_name("DEPTH")
                .takes_value(true)
                .help("How deep constant propagation may evaluate nested calls"),
        )
        .arg(
            Arg::with_name("passes")
                .short("p")
                .long("pass")
                .value_name("PASS")
                .takes_value(true)
                .multiple(true)
                .help(HELP_PASSES.lines().next().unwrap())
                .long_help(HELP_PASSES),
        )
        .get_matches();

    // Configure the logger.
    let verbose = std::cmp::max(1, matches.occurrences_of("verbosity") as usize) - 1;
    let quiet = !matches.is_present("verbosity");
    stderrlog::new()
        .module("ssair")
        .module("ssair_opt")
        .quiet(quiet)
        .verbosity(verbose)
        .init()?;

    if matches.is_present("list") {
        for sample in samples::SAMPLES {
            println!("{:16}  {}", sample.name, sample.description);
        }
        return Ok(());
    }

    // Configure rayon to be single-threaded if requested.
    let parallel = !matches.is_present("single-threaded");
    if !parallel {
        info!("Limiting to one rayon worker thread");
        rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build_global()?;
    }

    // Prepare the time tracking.
    let mut times = vec![];
    let tinit = time::precise_time_ns();

    // Build the input.
    let t0 = time::precise_time_ns();
    let mut module = Module::new();
    let selected: Vec<&str> = match matches.values_of("samples") {
        Some(names) => names.collect(),
        None => samples::SAMPLES.iter().map(|s| s.name).collect(),
    };
    for name in selected {
        match samples::lookup(name) {
            Some(sample) => (sample.build)(&mut module),
            None => bail!("unknown sample `{}`; see --list", name),
        }
    }
    module.link()?;
    verify(&module).map_err(|errs| anyhow!("Input does not verify:\n{}", errs))?;
    let t1 = time::precise_time_ns();
    times.push(("build".to_owned(), t1 - t0));
    println!("; Input");
    print_module(&module, matches.is_present("dominators"));

    // Determine the optimization passes to be run.
    let pipeline = match matches.values_of("passes") {
        Some(passes) => PassPipeline::parse(passes)?,
        None => PassPipeline::default_pipeline(),
    };
    let mut ctx = PassContext::new()
        .with_parallel(parallel)
        .with_verify_each(matches.is_present("verify-each"));
    if let Some(depth) = matches.value_of("max-call-depth") {
        ctx = ctx.with_max_call_depth(depth.parse()?);
    }

    // Apply optimization passes.
    let stats = pipeline.run(&ctx, &mut module);
    times.extend(stats.times);

    // Verify modified module.
    let t0 = time::precise_time_ns();
    verify(&module).map_err(|errs| anyhow!("Verification failed after optimization:\n{}", errs))?;
    let t1 = time::precise_time_ns();
    times.push(("verify".to_owned(), t1 - t0));

    println!();
    println!("; Output");
    print_module(&module, matches.is_present("dominators"));

    // Final time stat.
    let tfinal = time::precise_time_ns();
    times.push(("total".to_owned(), tfinal - tinit));

    // Print execution time statistics if requested by the user.
    if matches.is_present("time-passes") {
        eprintln!("Execution Time Statistics:");
        for (mut name, ns) in times {
            name.push(':');
            eprintln!("  {:14}  {:8.3} ms", name, ns as f64 * 1.0e-6);
        }
        eprintln!("");
        eprintln!("Structure Statistics:");
        eprintln!(
            "  Dominator Tree Construction: {:8.3} ms",
            DOMINATOR_TREE_TIME.load(Ordering::SeqCst) as f64 * 1.0e-6
        );
    }

    // Dump some threading statistics.
    info!("Used {} rayon worker threads", rayon::current_num_threads());

    Ok(())
}

fn verify(module: &Module) -> Result<(), ssair::verifier::VerifierErrors> {
    let mut verifier = Verifier::new();
    verifier.verify_module(module);
    verifier.finish()
}

fn print_module(module: &Module, dominators: bool) {
    if !dominators {
        print!("{}", module);
        return;
    }
    for (_, func) in module.functions() {
        match func.layout.first_block() {
            Some(_) => {
                let domtree = DominatorTree::new(func);
                println!("{}", func.dump_annotated(&domtree));
            }
            None => println!("{}", func),
        }
    }
}

static HELP_VERBOSITY: &str = "Increase message verbosity

This option can be specified multiple times to increase the level of verbosity \
in the output:

-v      Only print errors
-vv     Also print warnings
-vvv    Also print info messages
-vvvv   Also print debug messages
-vvvvv  Also print detailed tracing messages
";

static HELP_PASSES: &str = "Exact order of passes to run

This option specifies the exact order of passes to be executed. Pass names may \
also be given as a comma-separated list. The admissible passes are as follows:

ssa            SSA Construction (memory to register promotion)
gvn            Global Value Numbering
sccp           Sparse Conditional Constant Propagation
cfs            Control Flow Simplification
dce            Dead Code Elimination
adce           Aggressive Dead Code Elimination
osr            Operator Strength Reduction
loop-simplify  Loop Simplification (preheader insertion)
ssa-destruct   SSA Destruction (phi to copy lowering)
verify         Verify the module and log any errors

Without this option, the passes run in the order
ssa, gvn, loop-simplify, osr, sccp, cfs, gvn, adce, ssa-destruct.
";

#[cfg(test)]
mod tests {
    use super::*;
    use ssair::pass;

    #[test]
    fn help_lists_every_pass() {
        for &(name, _) in pass::PASSES {
            assert!(
                HELP_PASSES.lines().any(|l| l.starts_with(name)),
                "pass {} missing from help",
                name
            );
        }
    }
}

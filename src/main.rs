//! Entry point: wires the CLI, launch, tracker, event loop, and report
//! together. Exit codes follow spec.md §6 — 0 on normal child exit, 1 for a
//! usage error, and a distinct nonzero code for a fatal profiler failure.

mod aggregator;
mod cli;
mod context;
mod counter;
mod error;
mod event_loop;
mod launch;
mod proc_maps;
mod record;
mod symbolizer;
mod sys;
mod tracker;

use clap::Parser;
use log::error;

use cli::Opt;
use context::ProfilerContext;

const EXIT_USAGE: i32 = 1;
const EXIT_PROFILER_FAILURE: i32 = 2;

fn main() {
    env_logger::init();

    let opt = Opt::parse();
    if opt.command.is_empty() {
        eprintln!("usage: profiler <command> [args...]");
        std::process::exit(EXIT_USAGE);
    }

    match run(&opt) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            error!("{err}");
            std::process::exit(EXIT_PROFILER_FAILURE);
        }
    }
}

fn run(opt: &Opt) -> Result<i32, error::ProfilerError> {
    let child = launch::SuspendedChild::spawn(&opt.argv())?;

    let mut ctx = ProfilerContext::new(opt.sample_period);
    ctx.tracker
        .seed(child.pid)
        .map_err(|err| error::ProfilerError::kernel_abi("perf_event_open", -1, to_io_error(err)))?;

    child.release().map_err(error::ProfilerError::Launch)?;

    event_loop::run(&mut ctx).map_err(error::ProfilerError::Launch)?;

    let exit_code = launch::wait_for_exit(child.pid).map_err(error::ProfilerError::Launch)?;

    print_report(&ctx.aggregator.report());

    Ok(exit_code)
}

fn to_io_error(err: error::CounterOpenError) -> std::io::Error {
    match err {
        error::CounterOpenError::Missed => {
            std::io::Error::new(std::io::ErrorKind::NotFound, "root thread exited before attach")
        }
        error::CounterOpenError::Fatal(source) => source,
    }
}

fn print_report(report: &aggregator::Report) {
    println!("sampled {} cycles across {} thread(s)", report.global_total, report.threads.len());
    for thread in &report.threads {
        println!("\nthread {} ({} samples)", thread.tid, thread.total_samples);
        for function in &thread.functions {
            println!(
                "  {:6.2}%  {:>10} cycles  {}",
                function.percentage, function.cycles, function.function_name
            );
        }
    }
}

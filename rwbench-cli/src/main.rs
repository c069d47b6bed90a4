//! Command-line entry point of the read-after-write consistency benchmark.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    rwbench_cli::cli::execute()
}

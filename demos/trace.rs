use std::collections::BTreeMap;

use anyhow::Result;
use asmcovtrace::Step;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt, Debug)]
struct Opt {
    /// Only print the exit status.
    #[structopt(short, long)]
    quiet: bool,

    /// Print per-address hit counts instead of the instruction trace.
    #[structopt(short, long)]
    summary: bool,

    /// Number of most-hit addresses to print with `--summary`.
    #[structopt(long, default_value = "20")]
    top: usize,

    #[structopt(min_values = 1)]
    argv: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::from_args();

    let mut tracee = asmcovtrace::open(opt.argv[0].as_str(), opt.argv.iter().map(String::as_str))?;

    let mut hits: BTreeMap<u64, u64> = BTreeMap::new();
    let mut count = 0u64;

    let last = loop {
        match tracee.step()? {
            Step::InstructionPointer(ip) => {
                count += 1;

                if opt.summary {
                    *hits.entry(ip).or_default() += 1;
                } else if !opt.quiet {
                    println!("{:>16x}", ip);
                }
            },
            step => break step,
        }
    };

    if opt.summary && !opt.quiet {
        let mut ranked: Vec<_> = hits.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        for (ip, n) in ranked.into_iter().take(opt.top) {
            println!("{:>16x}: {}", ip, n);
        }
    }

    println!("stepped {} instructions, {:?}", count, last);

    Ok(())
}

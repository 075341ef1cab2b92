// src/main.rs

use incrond::{cli, logging};

fn main() {
    let args = cli::parse();

    if args.about {
        println!(
            "incrond - inotify cron daemon {}",
            env!("CARGO_PKG_VERSION")
        );
        return;
    }

    if let Err(err) = run_main(args) {
        eprintln!("incrond error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main(args: cli::CliArgs) -> anyhow::Result<()> {
    logging::init_logging(args.log_level)?;
    incrond::run(args)
}

fn main() {
    use clap::Parser;
    use std::error::Error;

    let args = muadl::cli::Args::parse();

    // Logging level comes from --log_level (numeric, Python logging scheme).
    let mut builder = env_logger::Builder::new();
    builder.filter_level(muadl::cli::level_filter(args.log_level));
    builder.target(env_logger::Target::Stdout);
    builder.init();

    match muadl::cli::run(&args) {
        Ok(summary) => {
            if summary.is_partial() {
                std::process::exit(4);
            }
        }
        Err(e) => {
            log::error!("{}", e);
            let mut source = e.source();
            while let Some(s) = source {
                log::debug!("  cause: {}", s);
                source = s.source();
            }
            std::process::exit(e.exit_code());
        }
    }
}

use clap::Parser;
use colored::Colorize;
use std::fs;
use std::process::ExitCode;
use testgate::aggregator::ReportAggregator;
use testgate::cli::Cli;
use testgate::config::GateConfig;
use testgate::error::GateError;
use testgate::runner::AuditRunner;
use testgate::uploader::PasteUploader;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::from(2);
        }
    };

    let module = cli.module_name();
    let report_path = match &cli.output {
        Some(path) => path.clone(),
        None => cli.module_dir.join(&config.report_path),
    };

    let mut aggregator = ReportAggregator::new(&report_path);
    if config.upload_enabled && !cli.no_upload {
        aggregator =
            aggregator.with_uploader(Box::new(PasteUploader::new(&config.upload_endpoint)));
    }

    let runner = AuditRunner::new(&module, &cli.module_dir, config);

    if let Some(log_path) = &cli.compiler_log {
        let capture = runner.capture();
        capture.register();
        match fs::read_to_string(log_path) {
            Ok(content) => capture.append(&content),
            Err(e) => {
                eprintln!("{} failed to read {}: {}", "error:".red().bold(), log_path.display(), e);
                return ExitCode::from(2);
            }
        }
        capture.unregister();
    }

    if let Err(e) = runner.run(&aggregator) {
        eprintln!("{} {}", "error:".red().bold(), e);
        return ExitCode::from(2);
    }

    match aggregator.close() {
        Ok(()) => {
            println!(
                "{} all audits passed for {} ({})",
                "testgate:".green().bold(),
                module,
                report_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(GateError::BuildFailure(message)) => {
            eprintln!("{}", message.red());
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn load_config(cli: &Cli) -> testgate::error::Result<GateConfig> {
    match &cli.config {
        Some(path) => GateConfig::from_file(path),
        None => GateConfig::load(&cli.module_dir),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

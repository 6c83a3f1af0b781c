mod cli;

use std::io::Write;
use std::process;

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use repo_audit::{AuditPipeline, Outcome, output};

fn init_logging(args: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(args.verbose.tracing_level_filter().into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_logging(&args);

    let config = match args.audit_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    };
    debug!(?config, "resolved configuration");

    if config.analysis.api_key.is_none() {
        warn!("no API key configured (--api-key or OPENAI_API_KEY); AI analysis will be reported as failed");
    }

    let pipeline = match AuditPipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    };

    let run = pipeline.run(&args.repo_url).await;

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = output::formatter(args.json).write_run(&run, &mut stdout) {
        eprintln!("error: failed to write output: {e}");
        process::exit(1);
    }
    let _ = stdout.flush();

    if run.outcome == Outcome::Aborted {
        process::exit(1);
    }
}

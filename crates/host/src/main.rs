//! fnhost binary.
//!
//! Loads a host config, starts one dispatcher per configured runtime and runs
//! until interrupted. Workers run in-process through `LocalChannel`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use fnhost::{HostConfig, ScriptHost};
use fnhost_cache::{Environment, ProcessEnvironment};
use fnhost_dispatch::{LocalChannelFactory, echo_handler};
use tracing::info;

/// Host command line arguments.
#[derive(Parser, Debug)]
#[command(name = "fnhost")]
#[command(about = "Serverless function host")]
struct Args {
	/// Host configuration file
	#[arg(short, long, value_name = "PATH", default_value = "fnhost.toml")]
	config: PathBuf,

	/// Invoke one function after startup, then shut down
	#[arg(long, value_name = "NAME")]
	invoke: Option<String>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	let env = Arc::new(ProcessEnvironment);

	setup_tracing(env.as_ref(), args.verbose);

	info!(config = %args.config.display(), "starting fnhost");
	let config = HostConfig::load(&args.config)?;
	let host = ScriptHost::new(config, env, Arc::new(LocalChannelFactory::new(echo_handler())))?;

	let outcome = run(&host, args.invoke.as_deref()).await;

	let report = host.stop().await;
	if !report.all_completed() {
		info!(timed_out = ?report.timed_out, "graceful stop incomplete; terminating");
	}
	host.dispose().await;

	outcome
}

async fn run(host: &ScriptHost, invoke: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
	host.start().await?;

	match invoke {
		Some(function) => {
			let output = host.invoke(function, BTreeMap::new()).await?;
			info!(function, ?output, "invocation complete");
		}
		None => {
			tokio::signal::ctrl_c().await?;
			info!("interrupt received");
		}
	}
	Ok(())
}

fn setup_tracing(env: &dyn Environment, verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::fmt::format::FmtSpan;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("fnhost=debug,fnhost_dispatch=debug,fnhost_cache=debug,info")
			} else {
				EnvFilter::new("info")
			}
		})
	};

	if let Some(log_dir) = env.var("FNHOST_LOG_DIR").map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("fnhost.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_span_events(FmtSpan::CLOSE)
				.with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			tracing::info!(path = ?log_path, "host tracing initialized");
			return;
		}
	}

	tracing_subscriber::registry()
		.with(filter())
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();
}

use anyhow::{Result, bail};
use cfsi::{Action, Runtime, configured_backends, run_external, run_index, run_init, run_mask, run_mosaic};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about = "Cloud-free Sentinel-2 mosaics: index, mask, mosaic",
	long_about = None,
	disable_help_subcommand = true,
)]
struct Cli {
	/// Actions to run, in order
	#[arg(required = true, value_enum)]
	actions: Vec<Action>,

	/// Detach from the running container; only valid with a single action
	#[arg(short, long)]
	detach: bool,

	#[command(flatten)]
	verbose: Verbosity<InfoLevel>,
}

fn main() {
	let cli = Cli::parse();

	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.format_timestamp(None)
		.init();

	if let Err(err) = run(cli) {
		eprintln!("{err}");
		std::process::exit(1);
	}
}

#[tokio::main]
async fn run(cli: Cli) -> Result<()> {
	if cli.detach && cli.actions.len() > 1 {
		bail!("optional argument --detach only works when a single action is given");
	}

	// external actions don't need config; build the runtime lazily
	let mut runtime: Option<Runtime> = None;
	for action in &cli.actions {
		if !action.is_in_process() {
			run_external(*action, cli.detach);
			continue;
		}
		if runtime.is_none() {
			let built = Runtime::from_env()?;
			spawn_interrupt_handler(&built);
			runtime = Some(built);
		}
		let runtime = runtime.as_ref().unwrap();

		match action {
			Action::Init => run_init(runtime)?,
			Action::Index => {
				run_index(runtime).await?;
			}
			Action::Mask => {
				let backends = configured_backends(runtime)?;
				run_mask(runtime, &backends).await?;
			}
			Action::Mosaic => {
				run_mosaic(runtime).await?;
			}
			_ => unreachable!("external actions are handled above"),
		}

		if runtime.is_cancelled() {
			bail!("interrupted");
		}
	}
	Ok(())
}

/// First Ctrl-C cancels cooperatively; workers stop between tiles.
fn spawn_interrupt_handler(runtime: &Runtime) {
	let sender = runtime.cancel_handle();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			log::info!("interrupt received, finishing current tiles");
			let _ = sender.send(true);
		}
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(arguments: Vec<&str>) -> std::result::Result<Cli, clap::Error> {
		Cli::try_parse_from(arguments)
	}

	#[test]
	fn help_lists_actions() {
		let err = parse(vec!["cfsi"]).unwrap_err().to_string();
		assert!(err.contains("Usage: cfsi"));
	}

	#[test]
	fn version_flag() {
		let err = parse(vec!["cfsi", "-V"]).unwrap_err().to_string();
		assert!(err.starts_with("cfsi "));
	}

	#[test]
	fn action_tokens_parse_in_order() {
		let cli = parse(vec!["cfsi", "index", "mask", "mosaic"]).unwrap();
		assert_eq!(cli.actions, vec![Action::Index, Action::Mask, Action::Mosaic]);
		assert!(!cli.detach);
	}

	#[test]
	fn unknown_action_is_rejected() {
		assert!(parse(vec!["cfsi", "transmogrify"]).is_err());
	}

	#[test]
	fn detach_with_multiple_actions_fails() {
		let cli = parse(vec!["cfsi", "-d", "index", "mask"]).unwrap();
		let err = run(cli).unwrap_err().to_string();
		assert!(err.contains("--detach only works"));
	}
}

//! Actions that shell out to container and infrastructure tooling.
//!
//! These exist so one entry point drives the whole deployment; failures are
//! reported but do not abort the remaining actions.

use crate::Action;
use std::process::Command;

/// Runs the external tool behind a non-pipeline action.
pub fn run_external(action: Action, detach: bool) {
	let (program, arguments): (&str, Vec<&str>) = match action {
		Action::Build => ("docker-compose", vec!["build", "--no-cache"]),
		Action::Start => ("docker-compose", vec!["up", "-d", "db"]),
		Action::Stop => ("docker-compose", vec!["down"]),
		Action::Clean => ("docker-compose", vec!["down", "--volumes"]),
		Action::Deploy => ("terraform", vec!["apply"]),
		Action::Destroy => ("terraform", vec!["destroy"]),
		Action::Log => ("docker-compose", vec!["logs", "-f"]),
		other => {
			log::error!("action '{other}' is not an external action");
			return;
		}
	};
	if detach && action != Action::Start {
		log::warn!("--detach has no effect for action '{action}'");
	}

	log::info!("running {program} {}", arguments.join(" "));
	match Command::new(program).args(&arguments).status() {
		Ok(status) if status.success() => {}
		Ok(status) => log::error!("{program} exited with {status}"),
		Err(err) => log::error!("cannot run {program}: {err}"),
	}
}

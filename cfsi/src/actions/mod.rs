//! Action handlers behind the CLI tokens.
//!
//! Actions form a partial order (`index` before `mask` before `mosaic`) but
//! each one is independently resumable: the skip policies make re-running
//! idempotent with respect to already-completed work.

mod external;
mod index;
mod init;
mod mask;
mod mosaic;

pub use external::*;
pub use index::*;
pub use init::*;
pub use mask::*;
pub use mosaic::*;

use clap::ValueEnum;
use std::fmt;

/// Everything the CLI accepts as a positional token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
	/// Rebuild the container images
	Build,
	/// Start the catalog database container
	Start,
	/// Initialize the catalog schema
	Init,
	/// Stop the catalog database container
	Stop,
	/// Stop the catalog database container and delete its data
	Clean,
	/// Index S2 granules from the object store into the catalog
	Index,
	/// Generate cloud and shadow masks
	Mask,
	/// Create cloudless mosaics
	Mosaic,
	/// Deploy infrastructure with Terraform
	Deploy,
	/// Destroy infrastructure with Terraform
	Destroy,
	/// Follow container logs
	Log,
}

impl Action {
	/// Whether this action runs inside the process (needing config and
	/// collaborators) or shells out to external tooling.
	pub fn is_in_process(&self) -> bool {
		matches!(self, Action::Init | Action::Index | Action::Mask | Action::Mosaic)
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Action::Build => "build",
			Action::Start => "start",
			Action::Init => "init",
			Action::Stop => "stop",
			Action::Clean => "clean",
			Action::Index => "index",
			Action::Mask => "mask",
			Action::Mosaic => "mosaic",
			Action::Deploy => "deploy",
			Action::Destroy => "destroy",
			Action::Log => "log",
		};
		f.write_str(name)
	}
}

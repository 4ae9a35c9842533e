use crate::{Runtime, catalog_path};
use cfsi_core::{Result, SqliteCatalog};

/// Creates (or verifies) the catalog schema.
pub fn run_init(runtime: &Runtime) -> Result<()> {
	let path = catalog_path(&runtime.config, &runtime.planner);
	SqliteCatalog::open(&path)?.init_schema()?;
	log::info!("catalog schema ready at {}", path.display());
	Ok(())
}

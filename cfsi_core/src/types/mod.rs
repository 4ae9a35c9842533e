mod dataset_doc;
mod grid;
mod product;

pub use dataset_doc::*;
pub use grid::*;
pub use product::*;

//! Configuration section definitions.
//!
//! Each module corresponds to a section in `assetgraph.toml`:
//!
//! | Module     | TOML Section   | Purpose                              |
//! |------------|----------------|--------------------------------------|
//! | `graph`    | `[graph]`      | Root directory, verbosity            |
//! | `populate` | `[populate]`   | Concurrency, followed relations      |
//! | `images`   | `[images]`     | CSS image post-processing directive  |
//! | `minify`   | `[minify]`     | Which asset types get minified       |
//! | `pipeline` | `[[pipeline]]` | Ordered transform stages             |

mod graph;
mod images;
mod minify;
mod pipeline;
mod populate;

pub use graph::GraphSection;
pub use images::ImagesSection;
pub use minify::MinifySection;
pub use pipeline::StageConfig;
pub use populate::PopulateSection;

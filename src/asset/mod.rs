//! Asset model: types, nodes, parse trees and providers.

mod kind;
pub mod minify;
mod node;
mod provider;

// Types
pub use kind::AssetType;
pub use node::{Asset, AssetId, LoadState, ParseTree};

// Providers
pub use provider::{AssetProvider, JsonProvider, Probe, Providers, SvgProvider};

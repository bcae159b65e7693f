pub mod catalog;
pub mod config;
pub mod error;
pub mod explorer;
pub mod fog;
pub mod geo;
pub mod gpx_export;
pub mod location;
pub mod navigation;
pub mod progression;
pub mod proximity;
pub mod routing;
pub mod runtime;
pub mod search;
pub mod server;
pub mod viewport;

pub use config::ExplorerConfig;
pub use explorer::Explorer;
pub use runtime::{attach_position_source, spawn, ExplorerHandle, Services};
pub use server::{create_router, AppState};

mod app;
mod bridge;
mod broadcast;
mod config;
mod http;
mod prices;
mod recompute;
mod state;
mod sync;
mod watcher;
mod ws;

pub use app::{build_router, run};
pub use bridge::TitleBridge;
pub use broadcast::Broadcaster;
pub use config::{resolve_data_dir, Config};
pub use prices::apply_catalog;
pub use state::{AppState, StoreDirectory};
pub use sync::spawn_ingest_worker;
pub use watcher::spawn_watcher;

use clap::Parser;
use eframe::egui;
use std::path::PathBuf;

mod app;
mod config;
mod engine;
mod expr;
mod input;
mod session;
mod signals;

use config::ConfigStore;
use session::Session;

#[derive(Debug, Parser)]
#[command(
    name = "item-runner",
    version,
    about = "Replays item entries into a target application at calibrated screen coordinates"
)]
struct Cli {
    /// Item catalog, one item per line under [CATEGORY] headings
    #[arg(long, default_value = "items.txt")]
    items: PathBuf,

    /// Persisted coordinates and timing settings
    #[arg(long, default_value = "coordinates.json")]
    settings: PathBuf,

    /// Move the cursor along a curved path instead of jumping to targets
    #[arg(long)]
    humanize: bool,
}

fn main() -> eframe::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let store = ConfigStore::new(cli.items, cli.settings);
    let session = Session::open(store, cli.humanize);

    let mut opts = eframe::NativeOptions::default();
    opts.viewport.inner_size = Some(egui::vec2(900.0, 720.0));
    opts.viewport.min_inner_size = Some(egui::vec2(760.0, 560.0));
    opts.follow_system_theme = true;

    eframe::run_native(
        "Item Runner",
        opts,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(app::RunnerApp::new(session))
        }),
    )
}

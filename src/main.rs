mod actions;
mod cli;
mod config;
mod gestures;
mod ipc;
mod landmarks;
mod logging;
mod modes;
mod util;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}

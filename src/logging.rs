use env_logger::Env;

/// `RUST_LOG` controls verbosity; default to info so mode switches and
/// dispatched actions show up.
pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

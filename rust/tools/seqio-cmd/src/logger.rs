use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

static INIT: Once = Once::new();

/// Installs the `env_logger` backend. `RUST_LOG` overrides the level picked
/// from the `-v` count.
pub fn initialize_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    INIT.call_once_force(|_| {
        let mut builder = Builder::new();
        builder
            .filter_level(LevelFilter::Warn)
            .filter_module("seqio_cmd", level)
            .filter_module("seqio_io", level)
            .filter_module("seqio_io_impl", level)
            .format_timestamp_millis()
            .parse_default_env();
        let _ = builder.try_init();
    });
}

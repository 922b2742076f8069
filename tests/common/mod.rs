pub mod front;

pub mod ledger;

pub mod node;

use std::io;
use std::sync::Once;
use std::thread;

use log::LevelFilter;

static LOGGER_INIT: Once = Once::new();

/// Set up a logger that logs all log messages at `level` and above.
pub fn setup_logger(level: LevelFilter) {
    LOGGER_INIT.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{:?}][{}] {}",
                    thread::current().id(),
                    record.level(),
                    message
                ))
            })
            .level(level)
            .chain(io::stdout())
            .apply()
            .unwrap()
    })
}

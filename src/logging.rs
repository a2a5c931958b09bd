//! Logging setup. Thin wrapper over `env_logger`, kept as its own module
//! so test fixtures and `main`
//! binaries share one format.

use env_logger::Builder;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_log() {
    INIT.call_once(|| {
        let mut builder = Builder::from_default_env();
        builder
            .format_timestamp_micros()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} - {}] [{}:{}] {}",
                    record.level(),
                    record.target(),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .init();
    });
}

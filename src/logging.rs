//! Logger setup. Every record carries `[file:line]` like the firmware log macros.

use std::io::Write;

use anyhow::Error;
use env_logger::{Builder, Env};

/// Installs the global logger. `RUST_LOG` overrides `default_level`.
pub fn init(default_level: &str) -> Result<(), Error> {
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        let _ = init("debug");
        assert!(init("debug").is_err());
    }
}

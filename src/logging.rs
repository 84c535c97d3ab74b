use clap_verbosity_flag::{LogLevel, Verbosity};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` wins over the verbosity flags
pub fn initialize<L>(verbosity: &Verbosity<L>)
where
    L: LogLevel,
{
    if verbosity.is_silent() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            verbosity
                .log_level()
                .map(|level| level.as_str().to_lowercase())
                .unwrap_or_else(|| "trace".to_owned()),
        )
    });

    let format = tracing_subscriber::fmt::format()
        .with_target(false)
        .compact();

    tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .event_format(format)
        .init();
}

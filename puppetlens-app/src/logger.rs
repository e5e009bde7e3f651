use std::env;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

/// Crates whose level follows `LOGLEVEL`.
const MODULES: [&str; 4] = [
    "puppetlens",
    "puppetlens_app",
    "puppetlens_core",
    "tower_http",
];

/// Installs the global subscriber. `RUST_LOG`, when set, wins over `log_level`.
pub fn setup(log_level: &str) {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", directives(log_level));
    }
    let subscriber = get_subscriber();
    subscriber.init();
}

fn directives(log_level: &str) -> String {
    let level = log_level.to_ascii_lowercase();
    MODULES
        .iter()
        .map(|module| format!("{module}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn get_subscriber() -> SubscriberBuilder<DefaultFields, Format, EnvFilter> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_thread_names(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_directive_per_module() {
        assert_eq!(
            directives("DEBUG"),
            "puppetlens=debug,puppetlens_app=debug,puppetlens_core=debug,tower_http=debug"
        );
    }
}

//! `beacon version`: version and build time.

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set by the release build; absent in development builds.
fn build_time() -> &'static str {
    option_env!("BEACON_BUILD_TIME").unwrap_or("unknown")
}

fn version_line() -> String {
    format!("Version: {VERSION}-{}", build_time())
}

pub fn run() {
    println!("{}", version_line());
}

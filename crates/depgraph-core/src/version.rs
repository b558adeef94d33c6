use std::fmt::Write;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version line printed by `depgraph version`, with the git hash when the
/// build provides one.
#[must_use]
pub fn version_string() -> String {
    let mut s = format!("depgraph {VERSION}");

    if let Some(hash) = option_env!("DEPGRAPH_BUILD_GIT_HASH") {
        let _ = write!(s, " ({hash})");
    }

    s
}

/// `User-Agent` sent with every registry request.
#[must_use]
pub fn user_agent() -> String {
    format!("depgraph/{VERSION}")
}

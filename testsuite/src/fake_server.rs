use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use redis_fixture::{BinaryLocator, FixedLocator, FixtureConfig};

pub const FAKE_SERVER_EXECUTABLE: &str = "fake-redis-server";

static FAKE_SERVER_BIN_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    escargot::CargoBuild::new()
        .manifest_path("../crates/fake-redis-server/Cargo.toml")
        .bin(FAKE_SERVER_EXECUTABLE)
        .current_release()
        .current_target()
        .run()
        .expect("build fake-redis-server")
        .path()
        .to_path_buf()
});

/// Directory holding the freshly built fake server.
pub fn fake_server_dir() -> &'static Path {
    FAKE_SERVER_BIN_PATH.parent().unwrap()
}

pub fn fake_server_locator() -> Box<dyn BinaryLocator> {
    Box::new(FixedLocator::new(fake_server_dir()))
}

/// Fixture configuration launching the fake server instead of `redis-server`.
pub fn fake_server_config() -> FixtureConfig {
    FixtureConfig::builder()
        .executable(FAKE_SERVER_EXECUTABLE)
        .locator(fake_server_locator())
        .build()
}

/// Same as [`fake_server_config`], with the workspace created under `root`.
pub fn fake_server_config_in(root: &Path) -> FixtureConfig {
    FixtureConfig::builder()
        .executable(FAKE_SERVER_EXECUTABLE)
        .locator(fake_server_locator())
        .workspace_root(root)
        .build()
}

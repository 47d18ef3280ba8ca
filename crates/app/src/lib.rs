// Library exports for the CLI binary and integration tests

// Mount orchestration, configuration state, backup and autostart
pub mod daemon;

// Re-export key types for convenience
pub use daemon::spawn_service;
pub use daemon::AppState;
pub use daemon::AppStateError;
pub use daemon::ServiceConfig;
pub use daemon::State;
pub use daemon::StateError;

// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Pairroom

// Server Configuration
pub const PAIRROOM_HOST: &str = "PAIRROOM_HOST";
pub const PAIRROOM_PORT: &str = "PAIRROOM_PORT";
pub const PORT: &str = "PORT"; // Legacy

// CORS Configuration
pub const PAIRROOM_CORS_ORIGIN: &str = "PAIRROOM_CORS_ORIGIN";

// Storage Configuration
pub const PAIRROOM_DATABASE_URL: &str = "PAIRROOM_DATABASE_URL";
pub const DATABASE_URL: &str = "DATABASE_URL"; // Legacy
pub const PAIRROOM_LOAD_TIMEOUT_MS: &str = "PAIRROOM_LOAD_TIMEOUT_MS";

// Execution Sandbox
pub const PAIRROOM_EXEC_TIMEOUT_MS: &str = "PAIRROOM_EXEC_TIMEOUT_MS";
pub const PAIRROOM_EXEC_MAX_OUTPUT_BYTES: &str = "PAIRROOM_EXEC_MAX_OUTPUT_BYTES";
pub const PAIRROOM_EXEC_MAX_SOURCE_BYTES: &str = "PAIRROOM_EXEC_MAX_SOURCE_BYTES";
pub const PAIRROOM_EXEC_MEMORY_MB: &str = "PAIRROOM_EXEC_MEMORY_MB";
pub const PAIRROOM_PYTHON_BIN: &str = "PAIRROOM_PYTHON_BIN";
pub const PAIRROOM_EXEC_REQUIRE_ISOLATION: &str = "PAIRROOM_EXEC_REQUIRE_ISOLATION";

// Room limits
pub const PAIRROOM_MAX_BUFFER_BYTES: &str = "PAIRROOM_MAX_BUFFER_BYTES";

// Defaults
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CORS_ORIGIN: &str = "*";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://pairroom.db";
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_EXEC_MAX_OUTPUT_BYTES: usize = 64 * 1024;
pub const DEFAULT_EXEC_MAX_SOURCE_BYTES: usize = 256 * 1024;
pub const DEFAULT_EXEC_MEMORY_MB: u64 = 512;
pub const DEFAULT_PYTHON_BIN: &str = "python3";
pub const DEFAULT_EXEC_REQUIRE_ISOLATION: bool = false;
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

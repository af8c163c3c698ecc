// ABOUTME: Shared fixtures for API integration tests
// ABOUTME: Builds application state over an in-process executor and a chosen room store

#![allow(dead_code)]

use async_trait::async_trait;
use pairroom_api::AppState;
use pairroom_rooms::{FrameLimits, RoomStateStore};
use pairroom_sandbox::{CodeExecutor, ExecutionRequest, ExecutionResult, SandboxError};
use pairroom_storage::{PersistenceBridge, RoomStore};
use std::sync::Arc;
use std::time::Duration;

/// Prints the submitted source back. Only "python" is supported.
pub struct EchoExecutor;

#[async_trait]
impl CodeExecutor for EchoExecutor {
    fn supports(&self, language: &str) -> bool {
        language == "python"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        if !self.supports(&request.language) {
            return Err(SandboxError::UnsupportedLanguage(request.language.clone()));
        }
        Ok(ExecutionResult {
            success: true,
            stdout: format!("{}\n", request.source),
            stderr: String::new(),
            duration_ms: 1,
            timed_out: false,
            truncated: false,
            exit_code: Some(0),
        })
    }
}

pub fn state_with(store: Arc<dyn RoomStore>) -> AppState {
    let bridge = PersistenceBridge::spawn(store, Duration::from_secs(1));
    let rooms = RoomStateStore::new(bridge, Arc::new(EchoExecutor));
    AppState::new(rooms, FrameLimits::default())
}

//! Response bodies for the status endpoints

use serde::{Deserialize, Serialize};

use crate::services::supervisor::SupervisorState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub exchange: String,
    pub state: SupervisorState,
    pub reconnects: u64,
    pub recorded: u64,
    pub dropped: u64,
    pub ignored: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorsResponse {
    pub supervisors: Vec<SupervisorStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

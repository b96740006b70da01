pub mod config;
pub mod error;
pub mod keyboard;
pub mod logging;
pub mod model;
pub mod sim;
pub mod simulator;
pub mod surface;
pub mod timing;
pub mod trace;
pub mod workflow;

pub use config::SimulationConfig;
pub use error::{ErrorCategory, ErrorCode, SimError, SimResult};
pub use model::{WorkflowMessage, WorkflowResult, WorkflowState};
pub use simulator::Simulator;
pub use surface::{SimEvent, SimObserver, Surface};
pub use workflow::Orchestrator;

//! Application layer: shared session state, change classification and the
//! refresh orchestration core.

pub mod change_classifier;
pub mod debounce;
pub mod refresh_orchestrator;
pub mod session_coordinator;
pub mod session_state;

pub use change_classifier::{ChangeClassifier, PageEvent};
pub use debounce::Debouncer;
pub use refresh_orchestrator::{compute_next_interval, RefreshOrchestrator, RefreshTiming};
pub use session_coordinator::{SessionCoordinator, SessionStatus};
pub use session_state::{SessionState, SharedSession};

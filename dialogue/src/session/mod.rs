//! Counseling session: lifecycle, opening selection and the turn loop.

pub mod openings;
pub mod orchestrator;
pub mod state;

pub use orchestrator::{CounselingSession, SessionServices, SessionSpec, TurnReport};
pub use state::{EndReason, SessionPhase, SessionTransition};

pub mod load_use_case;
pub mod normalize_use_case;
pub mod ports;

pub use load_use_case::{FailureReason, LoadFailure, LoadReport, LoadUseCase};
pub use normalize_use_case::{NormalizeUseCase, RunSummary};

pub mod cache;
pub mod clock;
pub mod config;
pub mod decode;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod history;
pub mod mileage;
pub mod model;
pub mod normalize;
pub mod on_error;
pub mod providers;
pub mod quota;
pub mod similarity;
pub mod storage;

pub mod doctor;

pub use engine::ReliabilityService;
pub use errors::{AnalysisError, EngineError, StoreError};
pub use model::{AnalyzeRequest, AnalyzeResponse, EvaluationRecord};

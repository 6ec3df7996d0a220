//! DNS propagation verification for mailzone
//!
//! 向一组公共递归解析器并发查询同一条记录，按多数一致性判断变更是否已全局可见。
//! 单次检查用 [`PropagationVerifier::verify`]，轮询直到收敛/分歧/超时用
//! [`PropagationVerifier::await_convergence`]。

mod error;
mod services;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
mod types;

pub use error::{LookupError, VerifierError, VerifierResult};
pub use services::propagation::PropagationVerifier;
pub use services::resolver::{default_panel, HickoryRecordResolver, RecordResolver};
pub use types::{
    ObservationOutcome, PropagationQuery, PropagationResult, PropagationStatus, ResolverEndpoint,
    ResolverObservation, VerifierOptions,
};

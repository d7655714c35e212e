pub mod config;
pub mod context;
pub mod detail;
pub mod error;
pub mod flag;
pub mod propagation;
pub mod provider;
pub mod service;
pub mod value;

pub use config::{DisabledBooleanPolicy, ProviderConfig, ServiceType};
pub use detail::ResolutionDetail;
pub use error::{classify_error, ConfigError, ServiceError};
pub use flag::{split_flag_key, EvaluationRequest, EvaluationResponse, Flag};
pub use propagation::{
    with_trace_context, NoopPropagator, Propagator, TaskLocalPropagator, TraceContext,
};
pub use provider::FliptProvider;
pub use service::{FlagService, HttpFlagService};
pub use value::FlagValue;

#[cfg(feature = "grpc")]
pub use service::GrpcFlagService;

#[cfg(feature = "mock")]
pub use service::MockFlagService;

pub mod config;
pub mod gateway;
pub mod retry;
pub mod schema;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{GatewayConfig, RetryConfig};
pub use gateway::{GatewayFailure, InferenceGateway, InferenceRequest};
pub use retry::RetryPolicy;
pub use schema::{ResponseSchema, SchemaType};

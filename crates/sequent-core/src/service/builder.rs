//! ServiceBuilder - サービスの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - worker スレッドの spawn に失敗したら build() がエラーを返す
//! - 生成後のサービスは必ず worker を持つ

use crate::config::ServiceConfig;
use crate::error::ExecError;

use super::ExecService;

/// Builds an [`ExecService`].
///
/// # Example
/// ```
/// use sequent_core::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .worker_name("reports")
///     .build()
///     .unwrap();
/// let answer = service.submit(|| Ok(6 * 7)).unwrap();
/// assert_eq!(answer.wait().unwrap(), 42);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServiceBuilder {
    config: ServiceConfig,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ServiceConfig) -> Self {
        Self { config }
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker_name = name.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Spawn the worker and return the running service.
    pub fn build(self) -> Result<ExecService, ExecError> {
        ExecService::start(self.config)
    }
}

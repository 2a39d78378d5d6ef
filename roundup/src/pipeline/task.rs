//! Task trait.

use async_trait::async_trait;
use roundup_shared::RoundupResult;

/// Unit of work inside a stage.
///
/// Tasks are consumed when run. Inputs are read from, and outputs written to,
/// the shared context `Ctx`.
#[async_trait]
pub trait PipelineTask<Ctx>: Send + Sync {
    async fn run(self: Box<Self>, ctx: Ctx) -> RoundupResult<()>;

    /// Stable name used in metrics and logs.
    fn name(&self) -> &str;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;

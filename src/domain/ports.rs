use crate::domain::model::{RawHit, TermResults, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 單一搜尋後端：輸入 term，回傳原始結果
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, term: &str) -> Result<Vec<RawHit>>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<TermResults>>;
    async fn transform(&self, data: Vec<TermResults>) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}

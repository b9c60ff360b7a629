use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes one outbound request. Implementations must not retry on their own;
/// retries are driven by [`crate::fetch::RetryPolicy`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

use clap::Args;

use common::keystore::KeyStoreError;

#[derive(Args, Debug, Clone)]
pub struct Ensure;

#[derive(Debug, thiserror::Error)]
pub enum EnsureError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Ensure {
    type Error = EnsureError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let chat = state.context().await?;
        let identity = state.config.identity();

        let report = chat.keystore().ensure_key_material(&identity).await?;
        Ok(format!("{}: {}", identity, report))
    }
}

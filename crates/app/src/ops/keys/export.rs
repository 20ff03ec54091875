use clap::Args;

use common::crypto::KeyError;
use common::keystore::KeyStoreError;

#[derive(Args, Debug, Clone)]
pub struct Export {
    /// Export the private key instead of the public key
    #[arg(long)]
    pub private: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error(transparent)]
    Key(#[from] KeyError),
}

#[async_trait::async_trait]
impl crate::op::Op for Export {
    type Error = ExportError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let chat = state.context().await?;
        let pair = chat.keystore().load_key_pair(&state.config.identity())?;

        let pem = if self.private {
            pair.to_pkcs8_pem()?
        } else {
            pair.public_pem()?
        };
        Ok(pem.trim_end().to_string())
    }
}

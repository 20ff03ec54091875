use clap::Args;

use common::session::{SendError, Session, SessionError};

#[derive(Args, Debug, Clone)]
pub struct SendMessage {
    /// Message text
    pub text: String,

    /// Send a two-party message to this uid instead of the whole directory
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SendOpError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Send(#[from] SendError),
}

#[async_trait::async_trait]
impl crate::op::Op for SendMessage {
    type Error = SendOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = Session::start(ctx.chat().await?).await?;

        let receipt = match &self.to {
            Some(uid) => session.send_to(uid, &self.text).await?,
            None => session.send(&self.text).await?,
        };
        Ok(receipt.to_string())
    }
}

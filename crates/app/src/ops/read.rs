use clap::Args;

use common::session::{Session, SessionError};

#[derive(Args, Debug, Clone)]
pub struct Read {
    /// Only show the most recent messages
    #[arg(long)]
    pub last: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::op::Op for Read {
    type Error = ReadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = Session::start(ctx.chat().await?).await?;
        let messages = session.read().await?;

        if messages.is_empty() {
            return Ok("No messages".to_string());
        }

        let skip = self
            .last
            .map(|last| messages.len().saturating_sub(last))
            .unwrap_or(0);
        let lines: Vec<String> = messages.iter().skip(skip).map(|m| m.to_string()).collect();
        Ok(lines.join("\n"))
    }
}

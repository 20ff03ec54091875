use clap::Args;

use common::prelude::DocumentStore;

#[derive(Args, Debug, Clone)]
pub struct Directory;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("directory unavailable: {0}")]
    Store(String),
}

#[async_trait::async_trait]
impl crate::op::Op for Directory {
    type Error = DirectoryError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let chat = ctx.chat().await?;
        let records = chat
            .store()
            .list_records()
            .await
            .map_err(|e| DirectoryError::Store(e.to_string()))?;

        if records.is_empty() {
            return Ok("No published keys".to_string());
        }

        let lines: Vec<String> = records
            .iter()
            .map(|record| {
                let fingerprint: String = record.public_key.n.chars().take(16).collect();
                format!("{}\t{}\t{}...", record.identity, record.label, fingerprint)
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

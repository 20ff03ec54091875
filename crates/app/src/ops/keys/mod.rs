use clap::{Args, Subcommand};

pub mod ensure;
pub mod export;

use crate::op::Op;

crate::command_enum! {
    (Ensure, ensure::Ensure),
    (Export, export::Export),
}

// Rename the generated Command to KeysCommand for clarity
pub type KeysCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Keys {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[async_trait::async_trait]
impl Op for Keys {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

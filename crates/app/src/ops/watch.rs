use std::collections::HashSet;

use clap::Args;

use common::session::{Feed, Session, SessionError};

#[derive(Args, Debug, Clone)]
pub struct Watch;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::op::Op for Watch {
    type Error = WatchError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let chat = ctx.chat().await?;
        // surface key problems before following the feed
        let session = Session::start(chat.clone()).await?;
        eprintln!("watching as {} (Ctrl-C to stop)", session.identity());

        let mut feed = Feed::spawn(chat);
        let mut shown = HashSet::new();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                state = feed.changed() => {
                    let Some(state) = state else { break };
                    for message in &state.messages {
                        if shown.insert(message.id) {
                            println!("{}", message);
                        }
                    }
                }
            }
        }

        feed.stop().await;
        Ok(format!("{} messages seen", shown.len()))
    }
}

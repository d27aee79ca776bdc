use crate::cli::actions::{Action, server};
use anyhow::Result;

pub(crate) async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
    }
}

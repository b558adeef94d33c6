//! `depgraph tree` command: resolve one package and print its tree.

use depgraph_core::deps::{DepsService, RegistryClient, TreeNode};
use depgraph_core::Config;
use miette::{IntoDiagnostic, Result};

/// One-shot resolution request.
#[derive(Debug, Clone)]
pub struct TreeAction {
    pub name: String,
    pub constraint: String,
    pub pretty: bool,
    pub config: Config,
}

pub fn run(action: TreeAction) -> Result<()> {
    action.config.validate().into_diagnostic()?;

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let tree = runtime.block_on(resolve(&action))?;

    println!("{}", render(&tree, action.pretty)?);
    Ok(())
}

async fn resolve(action: &TreeAction) -> Result<TreeNode> {
    let client =
        RegistryClient::with_timeout(&action.config.registry, action.config.request_timeout())
            .into_diagnostic()?;
    let service = DepsService::new(client, action.config.resolver_options());

    service
        .tree(&action.name, &action.constraint)
        .await
        .into_diagnostic()
}

fn render(tree: &TreeNode, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(tree).into_diagnostic()
    } else {
        serde_json::to_string(tree).into_diagnostic()
    }
}

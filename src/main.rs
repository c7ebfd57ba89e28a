use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod chat_server;
mod config;
mod db;
mod detector;
mod error;
mod gateway;
mod llm;
mod orchestrator;
mod session;
mod store;
mod tools;
mod tools_server;

#[derive(Debug, Parser)]
#[command(name = "hrms_bridge")]
#[command(about = "HR chatbot bridge: chat sessions over an LLM plus a tool-execution service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the chat-session API backed by the model provider.
    Chat,
    /// Run the tool-execution service backed by the HR database.
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Chat => {
            let cfg = config::ChatConfig::from_env()?;
            let registry = tools::ToolRegistry::with_default_tools();
            let provider = Arc::new(llm::GeminiProvider::new(&cfg, &registry));
            let invoker = Arc::new(gateway::HttpToolGateway::new(&cfg.mcp_server_url)?);
            let store: Arc<dyn store::SessionStore> = Arc::new(store::InMemorySessionStore::new());
            chat_server::spawn_idle_eviction(store.clone(), cfg.session_idle_secs);
            let orchestrator = Arc::new(orchestrator::SessionOrchestrator::new(
                store,
                provider,
                invoker,
                registry,
                cfg.max_tool_iterations,
            ));
            chat_server::serve(cfg.listen, chat_server::AppState { orchestrator }).await?;
        }
        Commands::Tools => {
            let cfg = config::ToolsConfig::from_env()?;
            let db = db::HrDatabase::initialize(cfg.database_url).await?;
            tools_server::serve(cfg.listen, tools_server::ToolsState::new(db)).await?;
        }
    }
    Ok(())
}

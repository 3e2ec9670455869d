use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

mod app;
mod completion;
mod config;
mod handler;
mod protocol;
mod server;
mod tools;
mod transport;
mod tui;
mod ui;
mod view;

use app::App;
use completion::CompletionClient;
use config::Config;
use tools::FileTools;

#[derive(Parser)]
#[command(name = "causerie")]
#[command(about = "Terminal chat panel backed by a local AI relay server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server bridging chat panels to the completion API
    Serve {
        /// Port to listen on (loopback only)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Open the chat panel connected to a running relay
    Chat {
        /// Relay URL (defaults to ws://127.0.0.1:<port>)
        #[arg(short, long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|_| Config::new());

    match cli.command {
        Commands::Serve { port } => serve(&config, port).await,
        Commands::Chat { url } => chat(&config, url).await,
    }
}

async fn serve(config: &Config, port: Option<u16>) -> Result<()> {
    tracing_subscriber::fmt::init();

    let Some(api_key) = config.api_key() else {
        println!("{}", "No API key configured.".red());
        println!(
            "Set {} or add {} to {}",
            "OPENAI_API_KEY".bold(),
            "\"api_key\"".bold(),
            "~/.config/causerie/config.json".bold()
        );
        anyhow::bail!("missing API key");
    };

    let backend = CompletionClient::new(&config.base_url(), &api_key, &config.model());
    let tools = FileTools::new(config.workspace_root())?;
    let port = port.unwrap_or(config.port());
    let addr = format!("127.0.0.1:{}", port);

    println!("{} ws://{}", "Relay server running on".green(), addr);
    server::run(&addr, backend, tools).await
}

async fn chat(config: &Config, url: Option<String>) -> Result<()> {
    let url = url.unwrap_or_else(|| format!("ws://127.0.0.1:{}", config.port()));

    let mut events = tui::EventHandler::new();
    let transport = match transport::connect(&url, events.sender()).await {
        Ok(transport) => transport,
        Err(e) => {
            println!("{}: {:#}", "Error connecting to the relay".red(), e);
            println!(
                "Make sure the relay is running: {}",
                "causerie serve".bold()
            );
            return Ok(());
        }
    };

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut app = App::new(transport.outgoing.clone());

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;
        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => break,
        }
    }

    tui::restore()?;
    Ok(())
}

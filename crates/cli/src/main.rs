use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use parley::orchestrator::{Direction, Route};
use parley::runtime::Runtime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, workspace with AGENTS.md).
    Init {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Detect the backend behind the configured base URL and print it.
    Detect {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Probe this URL instead of the configured one.
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },

    /// List the models served by the detected backend.
    Models {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Chat interactively. In-chat commands: /reset, /model <name>, /prompt <text>, /log, /exit.
    Chat {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Session id to use (default: a new generated id).
        #[arg(long, value_name = "ID")]
        session: Option<String>,

        /// Model to use (default: agents.defaultModel or the first listed model).
        #[arg(long, short, value_name = "NAME")]
        model: Option<String>,
    },

    /// Send one message and print the reply.
    Ask {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Model to use (default: agents.defaultModel or the first listed model).
        #[arg(long, short, value_name = "NAME")]
        model: Option<String>,

        /// Skip classification and send to this route.
        #[arg(long, value_enum)]
        route: Option<RouteArg>,

        /// Message text.
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RouteArg {
    Model,
    File,
    Web,
}

impl From<RouteArg> for Route {
    fn from(r: RouteArg) -> Self {
        match r {
            RouteArg::Model => Route::Model,
            RouteArg::File => Route::File,
            RouteArg::Web => Route::Web,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Detect { config, url }) => run_detect(config, url).await,
        Some(Commands::Models { config, json }) => run_models(config, json).await,
        Some(Commands::Chat {
            config,
            session,
            model,
        }) => run_chat(config, session, model).await,
        Some(Commands::Ask {
            config,
            model,
            route,
            text,
        }) => run_ask(config, model, route.map(Route::from), text.join(" ")).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(parley::config::default_config_path);
    let dir = parley::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_detect(config_path: Option<PathBuf>, url: Option<String>) -> anyhow::Result<()> {
    let (config, _) = parley::config::load_config(config_path)?;
    let registry = parley::backend::BackendRegistry::from_config(&config);
    let candidate = match url {
        Some(u) => u,
        None => registry.base_url().await,
    };
    match registry.detect(&candidate).await {
        Some(d) => {
            println!("flavor:        {}", d.flavor);
            println!("base url:      {}", d.base_url);
            println!("requires auth: {}", d.requires_auth);
            Ok(())
        }
        None => anyhow::bail!("no known backend answered at {}", candidate),
    }
}

async fn run_models(config_path: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let (config, _) = parley::config::load_config(config_path)?;
    let registry = parley::backend::BackendRegistry::from_config(&config);
    registry.detect_current().await;
    let d = registry.resolve().await;
    let catalog = parley::backend::ModelCatalog::new(
        registry.api_key().map(str::to_string),
        config.backend.probe_timeout() * 5,
    );
    let models = catalog.list_models(&d.base_url, d.flavor).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }
    if models.is_empty() {
        println!("no models listed by {} ({})", d.base_url, d.flavor);
        return Ok(());
    }
    for m in models {
        println!(
            "{:<48} {:>10} {}",
            m.id,
            m.human_size.as_deref().unwrap_or("-"),
            m.family.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn run_ask(
    config_path: Option<PathBuf>,
    model: Option<String>,
    route: Option<Route>,
    text: String,
) -> anyhow::Result<()> {
    let (config, path) = parley::config::load_config(config_path)?;
    parley::init::require_initialized(&path)?;
    let runtime = Runtime::start(config).await?;
    let (_, reply) = runtime.ask(None, model.as_deref(), &text, route).await;
    runtime.shutdown();
    match reply {
        Some(r) => {
            println!("{}", r.trim());
            Ok(())
        }
        None => anyhow::bail!("no reply (is the backend running?)"),
    }
}

async fn run_chat(
    config_path: Option<PathBuf>,
    session: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let (config, path) = parley::config::load_config(config_path)?;
    parley::init::require_initialized(&path)?;
    let runtime = Runtime::start(config).await?;
    let mut handle = runtime
        .sessions()
        .get(session.as_deref(), model.as_deref())
        .await;
    println!("session {} with model {} (/exit to quit)", handle.id, handle.model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input == "/reset" {
            handle.orchestrator.lock().await.reset();
            println!("conversation reset");
            continue;
        }
        if let Some(name) = input.strip_prefix("/model") {
            let name = name.trim();
            if name.is_empty() {
                println!("model: {}", handle.model);
            } else {
                let switched = runtime.sessions().get(Some(&handle.id), Some(name)).await;
                handle = switched;
                println!("model: {} (conversation reset)", handle.model);
            }
            continue;
        }
        if let Some(prompt) = input.strip_prefix("/prompt ") {
            handle.orchestrator.lock().await.set_system_prompt(prompt.trim());
            println!("system prompt replaced (conversation reset)");
            continue;
        }
        if input == "/log" {
            for entry in handle.orchestrator.lock().await.log() {
                let arrow = match entry.direction {
                    Direction::Inbound => "->",
                    Direction::Outbound => "<-",
                };
                println!(
                    "{} [{}] {} {}",
                    entry.at.format("%H:%M:%S"),
                    entry.route,
                    arrow,
                    entry.text
                );
            }
            continue;
        }

        // Re-resolve so the session counts as active (and comes back if it was swept).
        let touched = runtime
            .sessions()
            .get(Some(&handle.id), Some(&handle.model))
            .await;
        handle = touched;
        let reply = handle
            .orchestrator
            .lock()
            .await
            .send_message(input, None)
            .await;
        match reply {
            Some(r) => println!("< {}", r.trim()),
            None => eprintln!("chat error: no reply from {}", handle.model),
        }
    }

    runtime.shutdown();
    Ok(())
}

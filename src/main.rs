use clap::Parser;
use relay::backend::HttpBackend;
use relay::cli::{
    build_gateway, dispatch, handle_completions, handle_config_init, health, keys, load_config,
    usage, Cli, Commands, ConfigCommands, KeysCommands,
};
use relay::logging::init_tracing;
use std::path::Path;

fn setup(config_path: &Path) -> Result<relay::config::RelayConfig, Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
    Ok(config)
}

async fn run(command: Commands) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let output = match command {
        Commands::Keys(cmd) => match cmd {
            KeysCommands::Add(args) => {
                let gateway = build_gateway(setup(&args.config)?).await?;
                keys::handle_keys_add(&args, &gateway).await?
            }
            KeysCommands::List(args) => {
                let gateway = build_gateway(setup(&args.config)?).await?;
                keys::handle_keys_list(&args, &gateway).await?
            }
            KeysCommands::Promote(args) => {
                let gateway = build_gateway(setup(&args.config)?).await?;
                keys::handle_keys_promote(&args, &gateway).await?
            }
            KeysCommands::Revoke(args) => {
                let gateway = build_gateway(setup(&args.config)?).await?;
                keys::handle_keys_revoke(&args, &gateway).await?
            }
        },
        Commands::Usage(args) => {
            let gateway = build_gateway(setup(&args.config)?).await?;
            usage::handle_usage(&args, &gateway).await?
        }
        Commands::Chat(args) => {
            let gateway = build_gateway(setup(&args.config)?).await?;
            dispatch::handle_chat(&args, &gateway).await?
        }
        Commands::Embed(args) => {
            let gateway = build_gateway(setup(&args.config)?).await?;
            dispatch::handle_embed(&args, &gateway).await?
        }
        Commands::Answer(args) => {
            let gateway = build_gateway(setup(&args.config)?).await?;
            dispatch::handle_answer(&args, &gateway).await?
        }
        Commands::Generate(args) => {
            let gateway = build_gateway(setup(&args.config)?).await?;
            dispatch::handle_generate(&args, &gateway).await?
        }
        Commands::Register(args) => {
            let gateway = build_gateway(setup(&args.config)?).await?;
            dispatch::handle_register(&args, &gateway).await?
        }
        Commands::Health(args) => {
            // Health needs no database or secret.
            let config = setup(&args.config)?;
            let backend = HttpBackend::new(config.backend.clone());
            health::handle_health(&args, &backend, &config.backend.url).await?
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Init(args) => handle_config_init(&args)?,
        },
        Commands::Completions(args) => {
            handle_completions(&args);
            return Ok(None);
        }
    };
    Ok(Some(output))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(Some(output)) => println!("{}", output),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

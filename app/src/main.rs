use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use eframe::egui;
use greentext::config::{load_ui_settings, ui_settings_path};
use greentext::{GreentextApp, SettingsPanel};
use greentext_core::config::{api_key_from_env, GreentextConfig};
use greentext_core::export::ExportFormat;
use greentext_core::llm::{LlmProviderKind, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use greentext_core::state::AppState;
use greentext_core::store::CredentialStore;
use greentext_core::telemetry;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "greentext", version, about = "Generate greentext stories with an LLM")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream a greentext to stdout and optionally export it.
    Generate {
        prompt: String,
        #[arg(long, default_value = "openai")]
        provider: LlmProviderKind,
        /// Use a saved key instead of the environment.
        #[arg(long)]
        key_name: Option<String>,
        #[arg(long, env = "GREENTEXT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: u32,
        #[arg(long)]
        export: Option<ExportFormat>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Manage saved API keys.
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    List,
    Save {
        provider: LlmProviderKind,
        name: String,
        #[arg(long, env = "GREENTEXT_API_KEY", hide_env_values = true)]
        key: String,
    },
    Delete {
        provider: LlmProviderKind,
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(telemetry::default_filter())?;

    let cli = Cli::parse();
    let config = GreentextConfig::load().map_err(|err| anyhow!(err.user_message()))?;
    let store = CredentialStore::new(config.credentials_path.clone());

    match cli.command {
        Some(Command::Generate {
            prompt,
            provider,
            key_name,
            api_key,
            temperature,
            max_tokens,
            export,
            out,
        }) => {
            let api_key = match key_name {
                Some(name) => Some(
                    store
                        .try_load()?
                        .get(&provider, &name)
                        .map(|stored| stored.record.key)
                        .ok_or_else(|| anyhow!("no saved {provider} key named {name}"))?,
                ),
                None => api_key.or_else(|| api_key_from_env(&provider)),
            };
            let runtime = Runtime::new()?;
            let state = AppState::from_config(&config);
            runtime.block_on(generate(
                &state,
                provider,
                prompt,
                api_key,
                temperature,
                max_tokens,
            ))?;
            if let Some(format) = export {
                let artifact = state.export(format)?;
                let path = out.unwrap_or_else(|| PathBuf::from(artifact.file_name()));
                artifact
                    .write_to(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("Saved {} ({})", path.display(), artifact.mime());
            }
            return Ok(());
        }
        Some(Command::Keys { action }) => return run_keys(&store, action),
        None => {}
    }

    let runtime = Arc::new(Runtime::new()?);
    let ui_settings = runtime.block_on(load_ui_settings())?;
    let state = AppState::from_config(&config);
    let settings = SettingsPanel::new(store, &ui_settings);
    let inner_size = egui::vec2(
        ui_settings.window_size[0].max(800.0),
        ui_settings.window_size[1].max(600.0),
    );
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(inner_size)
            .with_min_inner_size(egui::vec2(800.0, 600.0)),
        ..Default::default()
    };

    let app = GreentextApp::new(state, runtime, settings, ui_settings)
        .with_settings_path(ui_settings_path());
    eframe::run_native(
        "Greentext Generator",
        native_options,
        Box::new(move |_cc| Box::new(app)),
    )
    .map_err(|err| anyhow!(err.to_string()))?;

    Ok(())
}

async fn generate(
    state: &AppState,
    provider: LlmProviderKind,
    prompt: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
) -> anyhow::Result<()> {
    let request = state
        .llm()
        .request(provider, prompt, temperature, max_tokens);
    let (_, mut stream) = state
        .generate_streaming(request, api_key)
        .await
        .map_err(|err| anyhow!(err.user_message()))?;

    let mut stdout = std::io::stdout();
    while let Some(result) = stream.recv().await {
        let chunk = result.map_err(|err| anyhow!(err.user_message()))?;
        if chunk.done {
            break;
        }
        write!(stdout, "{}", chunk.delta)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    match (state.render_post(), state.success_message()) {
        (Some(post), Some(message)) => {
            println!();
            print!("{post}");
            eprintln!("{message}");
            Ok(())
        }
        _ => bail!("generation ended without a completed greentext"),
    }
}

fn run_keys(store: &CredentialStore, action: KeysCommand) -> anyhow::Result<()> {
    match action {
        KeysCommand::List => {
            let keys = store.try_load()?;
            for provider in LlmProviderKind::ALL {
                let Some(entries) = keys.keys_for(&provider) else {
                    continue;
                };
                println!("{provider}:");
                if entries.is_empty() {
                    println!("  (none)");
                }
                for (name, record) in entries {
                    println!("  {name}  {}  {}", record.hash, record.masked());
                }
            }
        }
        KeysCommand::Save {
            provider,
            name,
            key,
        } => {
            let stored = store.save(&provider, &name, &key)?;
            println!("Saved {} key as: {}", stored.provider, stored.name);
        }
        KeysCommand::Delete { provider, name } => {
            if !store.delete(&provider, &name)? {
                bail!("no saved {provider} key named {name}");
            }
            println!("Deleted key: {name}");
        }
    }
    Ok(())
}

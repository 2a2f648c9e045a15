//! murmur CLI — text-to-speech over HTTP.
//!
//! ```text
//! murmur serve [--host localhost] [--port 4003] [--format wav|pcm] [--spawn-sidecar] ...
//! murmur say "hello world" [--server http://localhost:4003] [--out generated.wav]
//! murmur fetch-models [--models-dir models]
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use murmur_lib::adapter::SynthesisAdapter;
use murmur_lib::download;
use murmur_lib::kokoro::KokoroEngine;
use murmur_lib::murmur_core::types::{
    AudioFormat, DEFAULT_HOST, DEFAULT_PORT, EngineConfig, ServerConfig, SynthesisLimits,
};
use murmur_lib::scratch::ScratchDir;
use murmur_lib::server::{self, AppState};

/// murmur — HTTP text-to-speech server
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialise the engine and serve GET / and GET /generate?text=...
    Serve(ServeArgs),
    /// Ask a running server to speak and save the audio
    Say {
        /// Text to speak
        text: String,
        /// Server URL
        #[arg(long, default_value = "http://localhost:4003")]
        server: String,
        /// Output file
        #[arg(long, default_value = "generated.wav")]
        out: PathBuf,
    },
    /// Download the Kokoro model and voices without starting a server
    FetchModels {
        #[arg(long, default_value = "models")]
        models_dir: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Listen host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    /// Listen port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Response body format: wav or pcm (s16le mono)
    #[arg(long, default_value_t = AudioFormat::Wav)]
    format: AudioFormat,
    /// Kokoro server URL (ignored with --spawn-sidecar)
    #[arg(long, default_value = "http://127.0.0.1:3001")]
    kokoro_url: String,
    /// Kokoro voice
    #[arg(long, default_value = "af_heart")]
    voice: String,
    /// Speech speed
    #[arg(long, default_value = "1.0")]
    speed: f32,
    /// Download model files and launch `koko` ourselves
    #[arg(long)]
    spawn_sidecar: bool,
    /// Port for the launched sidecar
    #[arg(long, default_value = "3001")]
    sidecar_port: u16,
    /// Where model files are cached
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,
    /// Stage each rendered response here before sending it
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    /// Longest accepted text, in characters
    #[arg(long, default_value = "5000")]
    max_text_len: usize,
    /// Longest text sent to the engine in one call, in bytes
    #[arg(long, default_value = "200")]
    max_chunk_len: usize,
    /// Audio requests allowed to queue for the engine
    #[arg(long, default_value = "8")]
    max_pending: usize,
    /// Per-request synthesis timeout (none by default)
    #[arg(long)]
    synth_timeout_secs: Option<u64>,
    /// How long to wait for the backend at startup
    #[arg(long, default_value = "60")]
    init_timeout_secs: u64,
}

impl ServeArgs {
    fn into_configs(self) -> (ServerConfig, EngineConfig, SynthesisLimits) {
        let server = ServerConfig {
            host: self.host,
            port: self.port,
            format: self.format,
            scratch_dir: self.scratch_dir,
        };
        let engine = EngineConfig {
            kokoro_url: self.kokoro_url,
            voice: self.voice,
            speed: self.speed,
            spawn_sidecar: self.spawn_sidecar,
            sidecar_port: self.sidecar_port,
            models_dir: self.models_dir,
            init_timeout: Duration::from_secs(self.init_timeout_secs),
        };
        let limits = SynthesisLimits {
            max_text_len: self.max_text_len,
            max_chunk_len: self.max_chunk_len.max(1),
            max_pending: self.max_pending,
            timeout: self.synth_timeout_secs.map(Duration::from_secs),
        };
        (server, engine, limits)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=info,murmur_lib=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Say { text, server, out } => say(&text, &server, &out).await,
        Command::FetchModels { models_dir } => fetch_models(&models_dir).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), String> {
    let (config, engine_config, limits) = args.into_configs();

    // Engine first: a server that cannot synthesize never starts listening.
    let engine = Arc::new(
        KokoroEngine::init(&engine_config)
            .await
            .map_err(|e| format!("engine init failed: {e}"))?,
    );

    let adapter = SynthesisAdapter::new(engine.clone(), limits);
    let mut state = AppState::new(adapter, config.format);
    if let Some(dir) = &config.scratch_dir {
        let scratch = ScratchDir::open(dir).await.map_err(|e| e.to_string())?;
        state = state.with_scratch(scratch);
    }

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("failed to bind {addr}: {e}"))?;

    info!("Server started http://{addr} (format {})", config.format);
    let result = server::serve(listener, state, server::shutdown_signal()).await;

    engine.shutdown().await;
    info!("Server stopped.");
    result.map_err(|e| format!("server error: {e}"))
}

async fn say(text: &str, server: &str, out: &Path) -> Result<(), String> {
    let resp = reqwest::Client::new()
        .get(format!("{}/generate", server.trim_end_matches('/')))
        .query(&[("text", text)])
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    let status = resp.status();
    if !status.is_success() {
        let detail = resp.text().await.unwrap_or_default();
        return Err(format!("server answered {status}: {detail}"));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| format!("failed to read audio: {e}"))?;
    tokio::fs::write(out, &bytes)
        .await
        .map_err(|e| format!("failed to write {}: {e}", out.display()))?;

    println!("wrote {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

async fn fetch_models(models_dir: &Path) -> Result<(), String> {
    let client = reqwest::Client::new();
    let (model, voices) =
        download::ensure_kokoro_files(&client, models_dir, download::log_progress()).await?;
    println!("{}\n{}", model.display(), voices.display());
    Ok(())
}

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::memory::embedding::DEFAULT_EMBEDDING_MODELS;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Interface to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Base URL of the Ollama service
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Chat model name
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// SurrealDB connection string (`surrealkv://path`, `mem://`, `ws://host`)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub persistence: PersistenceConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_permissive: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_models: Vec<String>,
    pub embeddings_enabled: bool,
    pub discovery_timeout_secs: u64,
    pub embed_timeout_secs: u64,
    pub chat_timeout_secs: u64,
}

impl OllamaConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    pub database_url: String,
    pub namespace: String,
    pub database: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Memories injected into each exchange.
    pub limit: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Load configuration with precedence CLI > `COMPANION_*` env > file > defaults.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.cors_permissive", true)?
            .set_default("ollama.base_url", "http://localhost:11434")?
            .set_default("ollama.chat_model", "llama3.2")?
            .set_default("ollama.embedding_models", DEFAULT_EMBEDDING_MODELS.to_vec())?
            .set_default("ollama.embeddings_enabled", true)?
            .set_default("ollama.discovery_timeout_secs", 3)?
            .set_default("ollama.embed_timeout_secs", 10)?
            .set_default("ollama.chat_timeout_secs", 300)?
            .set_default("persistence.database_url", "surrealkv://data/memories.db")?
            .set_default("persistence.namespace", "companion")?
            .set_default("persistence.database", "memory")?
            .set_default("retrieval.limit", 5)?;

        // 2. Config file. An explicit path must exist; ./config.* is optional.
        builder = match cli.config.as_deref() {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. COMPANION_SERVER__PORT=9000
        builder = builder.add_source(
            Environment::with_prefix("COMPANION")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ollama.embedding_models"),
        );

        // 4. CLI flags (and their plain env bindings)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(url) = cli.ollama_url {
            builder = builder.set_override("ollama.base_url", url)?;
        }
        if let Some(model) = cli.chat_model {
            builder = builder.set_override("ollama.chat_model", model)?;
        }
        if let Some(url) = cli.database_url {
            builder = builder.set_override("persistence.database_url", url)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}


use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::fmt::Debug;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::{CollectionConfig, Config, ConfigError, OllamaConfig};
use crate::embeddings::OllamaClient;

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Doc Gateway Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used to embed document chunks.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Collection Configuration").bold().yellow());
    eprintln!();

    configure_collection(&mut config.collection)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before adding documents.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Protocol: {}", style(&config.ollama.protocol).cyan());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );

    eprintln!();
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Collection Settings:").bold().yellow());
    eprintln!("  Name: {}", style(&config.collection.name).cyan());
    eprintln!(
        "  Max Chunk Length: {}",
        style(config.collection.max_chunk_length).cyan()
    );
    eprintln!(
        "  Default top_k: {}",
        style(config.collection.default_top_k).cyan()
    );
    eprintln!(
        "  Top documents: {}",
        style(config.collection.top_documents).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!(
        "Vector database: {}",
        style(config.vector_database_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(base_dir: &Path) -> Result<Config> {
    Config::load(base_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: base_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

/// Prompt for a value, re-asking until `check` accepts it
fn prompt_validated<T, F>(prompt: &str, default: T, check: F) -> Result<T>
where
    T: Clone + ToString + FromStr,
    <T as FromStr>::Err: Debug + ToString,
    F: FnMut(&T) -> Result<(), ConfigError>,
{
    let value = Input::new()
        .with_prompt(prompt)
        .default(default)
        .validate_with(check)
        .interact_text()?;
    Ok(value)
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = ["http", "https"];
    let current = protocols
        .iter()
        .position(|p| *p == ollama.protocol)
        .unwrap_or(0);
    let choice = Select::new()
        .with_prompt("Ollama protocol")
        .default(current)
        .items(&protocols)
        .interact()?;
    ollama.set_protocol(protocols[choice].to_string())?;

    let host = prompt_validated("Ollama host", ollama.host.clone(), |input: &String| {
        ollama.clone().set_host(input.clone())
    })?;
    let port = prompt_validated("Ollama port", ollama.port, |input: &u16| {
        ollama.clone().set_port(*input)
    })?;
    let model = prompt_validated("Embedding model", ollama.model.clone(), |input: &String| {
        ollama.clone().set_model(input.clone())
    })?;
    let batch_size = prompt_validated(
        "Texts per embedding request",
        ollama.batch_size,
        |input: &u32| ollama.clone().set_batch_size(*input),
    )?;
    let embedding_dimension = prompt_validated(
        "Embedding dimension of the model",
        ollama.embedding_dimension,
        |input: &u32| ollama.clone().set_embedding_dimension(*input),
    )?;

    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;
    ollama.set_embedding_dimension(embedding_dimension)?;

    Ok(())
}

fn configure_collection(collection: &mut CollectionConfig) -> Result<()> {
    let name = prompt_validated(
        "Collection name",
        collection.name.clone(),
        |input: &String| collection.clone().set_name(input.clone()),
    )?;
    let max_chunk_length = prompt_validated(
        "Maximum chunk length (characters) before splitting",
        collection.max_chunk_length,
        |input: &usize| collection.clone().set_max_chunk_length(*input),
    )?;
    let default_top_k = prompt_validated(
        "Default number of query results",
        collection.default_top_k,
        |input: &usize| collection.clone().set_default_top_k(*input),
    )?;
    let top_documents = prompt_validated(
        "Documents searched by retrieve when none are given",
        collection.top_documents,
        |input: &usize| collection.clone().set_top_documents(*input),
    )?;

    collection.set_name(name)?;
    collection.set_max_chunk_length(max_chunk_length)?;
    collection.set_default_top_k(default_top_k)?;
    collection.set_top_documents(top_documents)?;

    Ok(())
}

/// Whether the server answers on its model listing endpoint
fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    OllamaClient::new(ollama)
        .map(|client| {
            client
                .with_timeout(Duration::from_secs(5))
                .with_retry_attempts(1)
        })
        .and_then(|client| client.ping())
        .is_ok()
}

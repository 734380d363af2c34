//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation::{format_record, format_render_report, format_run_report, format_status};
use crate::config::{ConfigLoader, SyncConfig};
use crate::error::ApiError;
use crate::input::{InputSource, PlaybookSource};
use crate::pipeline::{render_pass, Pipeline};
use crate::provider::ProviderFactory;
use crate::render::OutputDirRenderer;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::stage::{FetchStage, GenerationStage, ModelPitchGenerator, ModelUrlAnalyzer};
use crate::store::RecordStore;
use crate::types::EntityKey;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Runtime context for CLI execution: workspace root and resolved configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: SyncConfig,
}

impl RunContext {
    /// Load configuration for `workspace_root`, or from `config_path` when given.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let mut config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config.resolve_paths(&workspace_root);
        Self::with_config(workspace_root, config)
    }

    pub fn with_config(workspace_root: PathBuf, config: SyncConfig) -> Result<Self, ApiError> {
        config.ensure_valid()?;
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        info!(command = command.name(), "Executing command");
        match command {
            Commands::Run { sections, format } => self.handle_run(sections, *format),
            Commands::Render { keys, output } => self.handle_render(keys, output.clone()),
            Commands::Status { format } => format_status(&self.open_store()?, *format),
            Commands::Show { key } => self.handle_show(key),
            Commands::Clear { yes } => self.handle_clear(*yes),
        }
    }

    fn open_store(&self) -> Result<RecordStore, ApiError> {
        Ok(RecordStore::open(&self.config.store.path)?)
    }

    /// Wire the model-backed collaborators from configuration.
    fn build_pipeline(&self, store: RecordStore) -> Result<Pipeline, ApiError> {
        let provider = &self.config.provider;
        let fetch_client = ProviderFactory::create_client(&provider.fetch_provider()?)?;
        let generate_client = ProviderFactory::create_client(&provider.generation_provider()?)?;

        let analyzer = ModelUrlAnalyzer::new(fetch_client, provider.fetch_temperature, provider.max_tokens)?;
        let generator = ModelPitchGenerator::new(
            generate_client,
            provider.generate_temperature,
            provider.max_tokens,
        );

        Ok(Pipeline::new(
            store,
            FetchStage::new(
                Arc::new(analyzer),
                RetryExecutor::new("fetch", RetryPolicy::from(&self.config.retry.fetch)),
            ),
            GenerationStage::new(
                Arc::new(generator),
                RetryExecutor::new("generate", RetryPolicy::from(&self.config.retry.generate)),
            ),
        ))
    }

    fn handle_run(&self, sections: &[String], format: OutputFormat) -> Result<String, ApiError> {
        let mut source = PlaybookSource::new(&self.config.input.company, &self.config.input.targets);
        let sections = if sections.is_empty() {
            self.config.input.sections.as_slice()
        } else {
            sections
        };
        if !sections.is_empty() {
            source = source.with_sections(sections.to_vec());
        }
        let snapshot = source.snapshot()?;

        let store = self.open_store()?;
        let mut pipeline = self.build_pipeline(store)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start async runtime: {}", e)))?;
        let report = runtime.block_on(pipeline.run(&snapshot))?;

        format_run_report(&report, format)
    }

    fn handle_render(&self, keys: &[String], output: Option<PathBuf>) -> Result<String, ApiError> {
        let keys = keys
            .iter()
            .map(|raw| EntityKey::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let output_dir = match output {
            Some(dir) if dir.is_relative() => self.workspace_root.join(dir),
            Some(dir) => dir,
            None => self.config.output.dir.clone(),
        };

        let store = self.open_store()?;
        let renderer = OutputDirRenderer::new(&output_dir);
        let report = render_pass(&store, &keys, &renderer);
        Ok(format_render_report(&report, &output_dir))
    }

    fn handle_show(&self, raw_key: &str) -> Result<String, ApiError> {
        let key = EntityKey::parse(raw_key)?;
        let store = self.open_store()?;
        let record = store
            .get(&key)
            .ok_or_else(|| ApiError::InvalidInput(format!("No record for key '{}'", key)))?;
        format_record(record)
    }

    fn handle_clear(&self, yes: bool) -> Result<String, ApiError> {
        let mut store = self.open_store()?;
        if store.is_empty() {
            return Ok("Store is already empty".to_string());
        }
        if !yes {
            use dialoguer::Confirm;
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Remove all {} record(s) from {}?",
                    store.len(),
                    store.path().display()
                ))
                .default(false)
                .interact()
                .map_err(|e| ApiError::ConfigError(format!("Failed to get user input: {}", e)))?;
            if !confirmed {
                return Ok("Clear cancelled".to_string());
            }
        }
        let removed = store.len();
        store.clear()?;
        Ok(format!("Removed {} record(s)", removed))
    }
}

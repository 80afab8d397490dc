//! Configuration module
//!
//! Loads the research configuration from the environment and applies
//! command-line overrides.

use anyhow::{Context, Result};
use lens_research::{BackendKind, ResearchController};
use tracing::debug;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend, credentials and polling limits
    pub research: lens_research::Config,
}

impl Config {
    /// Loads the environment configuration, overriding the backend if given
    pub fn load(backend: Option<BackendKind>) -> Result<Self> {
        let mut research =
            lens_research::Config::from_env().context("Failed to load configuration")?;
        if let Some(backend) = backend {
            research.backend = backend;
        }
        research.validate().context("Invalid configuration")?;

        debug!("Using {} backend", research.backend);
        Ok(Self { research })
    }

    /// Builds a controller for the configured backend
    pub fn controller(&self, use_cache: bool) -> Result<ResearchController> {
        let controller = ResearchController::new(self.research.build_backend())
            .with_policy(self.research.poll_policy());

        if !use_cache {
            return Ok(controller);
        }
        let cache = self
            .research
            .open_cache()
            .context("Failed to open result cache")?;
        Ok(controller.with_cache(cache))
    }
}

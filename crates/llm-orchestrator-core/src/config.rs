// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process environment configuration.
//!
//! This crate owns only the subset of environment-driven configuration
//! that the scheduler, agent, and model client themselves consume; a
//! fuller configuration-file loader is an external collaborator.

use crate::logging::Verbosity;
use std::time::Duration;

const PREFIX: &str = "LLM_ORCHESTRATOR_";

/// Options recognized from the process environment.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub log_verbosity: Verbosity,
    pub remote_log_enabled: bool,
    pub remote_log_group: Option<String>,
    pub provider_region: Option<String>,
    pub default_step_timeout: Option<Duration>,
    pub default_workflow_timeout: Option<Duration>,
    pub max_model_retries: u32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            log_verbosity: Verbosity::Info,
            remote_log_enabled: false,
            remote_log_group: None,
            provider_region: None,
            default_step_timeout: None,
            default_workflow_timeout: None,
            max_model_retries: 3,
        }
    }
}

impl EnvironmentConfig {
    /// Reads configuration from `LLM_ORCHESTRATOR_*` environment variables,
    /// falling back to defaults for anything unset or
    /// unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let log_verbosity = Self::var("LOG_VERBOSITY")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.log_verbosity);

        let remote_log_enabled = Self::var("REMOTE_LOG_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let remote_log_group = Self::var("REMOTE_LOG_GROUP");

        let provider_region = Self::var("PROVIDER_REGION");

        let default_step_timeout = Self::var("DEFAULT_STEP_TIMEOUT")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let default_workflow_timeout = Self::var("DEFAULT_WORKFLOW_TIMEOUT")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let max_model_retries = Self::var("MAX_MODEL_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_model_retries);

        Self {
            log_verbosity,
            remote_log_enabled,
            remote_log_group,
            provider_region,
            default_step_timeout,
            default_workflow_timeout,
            max_model_retries,
        }
    }

    fn var(name: &str) -> Option<String> {
        std::env::var(format!("{PREFIX}{name}")).ok()
    }
}

//! Remote makeup and nail-art generation.
//!
//! Makeup is not composited locally: the canvas is encoded as PNG and handed to
//! an [`InferenceService`] as a job. Polling for the result is the caller's
//! concern.

use crate::canvas::{Canvas, RenderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const MAX_PROMPT_CHARS: usize = 1000;

const BLOCKED_TERMS: [&str; 10] = [
    "nude", "naked", "nsfw", "porn", "xxx", "violence", "gore", "blood", "illegal", "drugs",
];

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),
    #[error("render: {0}")]
    Render(#[from] RenderError),
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    #[error("inference service: {0}")]
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum JobStatus {
    Starting,
    Processing,
    /// Output reference (URL or encoded image) produced by the service.
    Succeeded(String),
    Failed(String),
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded(_) | JobStatus::Failed(_) | JobStatus::Canceled
        )
    }
}

/// Makeup options sent with a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeupConfig {
    pub apply_lipstick: bool,
    pub lipstick_color: String,
    pub apply_blush: bool,
    pub blush_color: String,
    /// 0..=100
    pub blush_intensity: u8,
    pub apply_foundation: bool,
    pub foundation_preset: String,
}

impl Default for MakeupConfig {
    fn default() -> Self {
        Self {
            apply_lipstick: true,
            lipstick_color: "Red".into(),
            apply_blush: true,
            blush_color: "Pink".into(),
            blush_intensity: 50,
            apply_foundation: true,
            foundation_preset: "Medium".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NailArtModel {
    NailGenerator1,
    NailGenerator2,
    FluxSchnell,
}

impl NailArtModel {
    pub fn display_name(self) -> &'static str {
        match self {
            NailArtModel::NailGenerator1 => "FLUX.1-dev LoRA Nails Generator",
            NailArtModel::NailGenerator2 => "Nails Woman LoRA",
            NailArtModel::FluxSchnell => "FLUX Schnell (Fast)",
        }
    }

    pub fn model(self) -> &'static str {
        match self {
            NailArtModel::NailGenerator1 | NailArtModel::NailGenerator2 => {
                "black-forest-labs/flux-dev-lora"
            }
            NailArtModel::FluxSchnell => "black-forest-labs/flux-schnell",
        }
    }

    pub fn lora_weights(self) -> Option<&'static str> {
        match self {
            NailArtModel::NailGenerator1 => Some(
                "https://huggingface.co/akhmat-s/FLUX.1-dev-LoRA-Nails-Generator/resolve/main/lora.safetensors",
            ),
            NailArtModel::NailGenerator2 => {
                Some("https://huggingface.co/sheko007/nailswoman/resolve/main/lora.safetensors")
            }
            NailArtModel::FluxSchnell => None,
        }
    }

    /// Token the LoRA was trained on; prepended to the prompt when present.
    pub fn trigger_word(self) -> Option<&'static str> {
        match self {
            NailArtModel::NailGenerator2 => Some("lnailswoman"),
            _ => None,
        }
    }

    fn base_cost(self) -> f32 {
        match self {
            NailArtModel::NailGenerator1 | NailArtModel::NailGenerator2 => 0.025,
            NailArtModel::FluxSchnell => 0.003,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Preview,
    #[default]
    Standard,
    High,
}

impl QualityPreset {
    pub fn steps(self) -> u32 {
        match self {
            QualityPreset::Preview => 4,
            QualityPreset::Standard => 8,
            QualityPreset::High => 28,
        }
    }

    pub fn guidance(self) -> f32 {
        match self {
            QualityPreset::Preview => 1.0,
            QualityPreset::Standard => 2.5,
            QualityPreset::High => 3.5,
        }
    }

    fn cost_multiplier(self) -> f32 {
        match self {
            QualityPreset::Preview => 0.15,
            QualityPreset::Standard => 0.3,
            QualityPreset::High => 1.0,
        }
    }
}

/// Approximate cost in USD of one generation.
pub fn estimate_cost(model: NailArtModel, quality: QualityPreset) -> f32 {
    model.base_cost() * quality.cost_multiplier()
}

/// Trim and check a user prompt: non-empty, bounded length, no blocked terms.
pub fn validate_prompt(prompt: &str) -> Result<&str, RemoteError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(RemoteError::InvalidPrompt("prompt is empty".into()));
    }
    if trimmed.chars().count() > MAX_PROMPT_CHARS {
        return Err(RemoteError::InvalidPrompt(format!(
            "prompt exceeds {MAX_PROMPT_CHARS} characters"
        )));
    }
    let lower = trimmed.to_lowercase();
    if let Some(term) = BLOCKED_TERMS.iter().find(|t| lower.contains(**t)) {
        return Err(RemoteError::InvalidPrompt(format!(
            "prompt contains blocked term \"{term}\""
        )));
    }
    Ok(trimmed)
}

/// A validated text-to-image nail-art request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NailArtRequest {
    pub prompt: String,
    pub model: NailArtModel,
    pub quality: QualityPreset,
    pub width: u32,
    pub height: u32,
    pub seed: Option<u64>,
}

impl NailArtRequest {
    pub const DEFAULT_SIZE: u32 = 1024;

    pub fn new(prompt: &str, model: NailArtModel, quality: QualityPreset) -> Result<Self, RemoteError> {
        let prompt = validate_prompt(prompt)?;
        let prompt = match model.trigger_word() {
            Some(trigger) => format!("{trigger} {prompt}"),
            None => prompt.to_string(),
        };
        Ok(Self {
            prompt,
            model,
            quality,
            width: Self::DEFAULT_SIZE,
            height: Self::DEFAULT_SIZE,
            seed: None,
        })
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Model input parameters as sent to the service.
    pub fn input(&self) -> serde_json::Value {
        let mut input = serde_json::json!({
            "prompt": self.prompt,
            "num_inference_steps": self.quality.steps(),
            "width": self.width,
            "height": self.height,
        });
        let guidance = self.quality.guidance();
        if guidance > 0.0 {
            input["guidance_scale"] = serde_json::json!(guidance);
        }
        if let Some(weights) = self.model.lora_weights() {
            input["lora_weights"] = serde_json::json!(weights);
        }
        if let Some(seed) = self.seed {
            input["seed"] = serde_json::json!(seed);
        }
        input
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    Makeup {
        image_png: Vec<u8>,
        config: MakeupConfig,
    },
    NailArt(NailArtRequest),
}

/// Remote job runner (makeup transfer, image generation).
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn submit(&self, request: JobRequest) -> Result<JobId, RemoteError>;
    async fn status(&self, id: &JobId) -> Result<JobStatus, RemoteError>;
    async fn cancel(&self, id: &JobId) -> Result<(), RemoteError>;
}

/// Submits frames for remote makeup application.
pub struct MakeupCompositor {
    service: Arc<dyn InferenceService>,
}

impl MakeupCompositor {
    pub fn new(service: Arc<dyn InferenceService>) -> Self {
        Self { service }
    }

    pub async fn submit(&self, canvas: &Canvas, config: &MakeupConfig) -> Result<JobId, RemoteError> {
        let image_png = canvas.encode_png()?;
        let bytes = image_png.len();
        let id = self
            .service
            .submit(JobRequest::Makeup {
                image_png,
                config: config.clone(),
            })
            .await?;
        tracing::info!(job = %id, bytes, "makeup job submitted");
        Ok(id)
    }

    pub async fn generate_nail_art(&self, request: NailArtRequest) -> Result<JobId, RemoteError> {
        let model = request.model;
        let id = self.service.submit(JobRequest::NailArt(request)).await?;
        tracing::info!(job = %id, model = model.display_name(), "nail art job submitted");
        Ok(id)
    }

    pub async fn status(&self, id: &JobId) -> Result<JobStatus, RemoteError> {
        self.service.status(id).await
    }

    pub async fn cancel(&self, id: &JobId) -> Result<(), RemoteError> {
        self.service.cancel(id).await
    }
}

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::artifact::NewArtifact;
use crate::models::job::Job;
use crate::pipeline::stage::StageError;

/// Accumulated pipeline state: job parameters, the source image, and the
/// outputs of every stage completed so far. Each stage reads its inputs from
/// here and its output is merged back via [`PipelineContext::apply`].
#[derive(Debug)]
pub struct PipelineContext {
    pub job_id: Uuid,
    pub mode: String,
    pub target_format: String,
    pub max_polygons: Option<i32>,
    pub input_image: Vec<u8>,

    pub preprocess: Option<PreprocessOutput>,
    pub multiview: Option<MultiviewOutput>,
    pub reconstruct: Option<ReconstructOutput>,
    pub extract_mesh: Option<ExtractMeshOutput>,
    pub retopologize: Option<RetopologizeOutput>,
    pub texture: Option<TextureOutput>,
}

impl PipelineContext {
    pub fn new(job: &Job, input_image: Vec<u8>) -> Self {
        Self {
            job_id: job.id,
            mode: job.mode.clone(),
            target_format: job.target_format.clone(),
            max_polygons: job.max_polygons,
            input_image,
            preprocess: None,
            multiview: None,
            reconstruct: None,
            extract_mesh: None,
            retopologize: None,
            texture: None,
        }
    }

    /// Merge a stage output into the context.
    pub fn apply(&mut self, output: StageOutput) {
        match output {
            StageOutput::Preprocess(out) => self.preprocess = Some(out),
            StageOutput::Multiview(out) => self.multiview = Some(out),
            StageOutput::Reconstruct(out) => self.reconstruct = Some(out),
            StageOutput::ExtractMesh(out) => self.extract_mesh = Some(out),
            StageOutput::Retopologize(out) => self.retopologize = Some(out),
            StageOutput::Texture(out) => self.texture = Some(out),
            // Export output is consumed by the orchestrator, not accumulated.
            StageOutput::Export(_) => {}
        }
    }

    pub fn require_preprocess(&self) -> Result<&PreprocessOutput, StageError> {
        self.preprocess
            .as_ref()
            .ok_or_else(|| StageError::fatal("preprocess output missing from context"))
    }

    pub fn require_multiview(&self) -> Result<&MultiviewOutput, StageError> {
        self.multiview
            .as_ref()
            .ok_or_else(|| StageError::fatal("multiview output missing from context"))
    }

    pub fn require_reconstruct(&self) -> Result<&ReconstructOutput, StageError> {
        self.reconstruct
            .as_ref()
            .ok_or_else(|| StageError::fatal("reconstruction output missing from context"))
    }

    pub fn require_extract_mesh(&self) -> Result<&ExtractMeshOutput, StageError> {
        self.extract_mesh
            .as_ref()
            .ok_or_else(|| StageError::fatal("mesh extraction output missing from context"))
    }

    pub fn require_retopologize(&self) -> Result<&RetopologizeOutput, StageError> {
        self.retopologize
            .as_ref()
            .ok_or_else(|| StageError::fatal("retopology output missing from context"))
    }

    pub fn require_texture(&self) -> Result<&TextureOutput, StageError> {
        self.texture
            .as_ref()
            .ok_or_else(|| StageError::fatal("texture output missing from context"))
    }
}

/// Typed output of one stage, merged into the context on success.
#[derive(Debug)]
pub enum StageOutput {
    Preprocess(PreprocessOutput),
    Multiview(MultiviewOutput),
    Reconstruct(ReconstructOutput),
    ExtractMesh(ExtractMeshOutput),
    Retopologize(RetopologizeOutput),
    Texture(TextureOutput),
    Export(ExportOutput),
}

/// Background mask and geometry hint maps derived from the source image.
#[derive(Debug)]
pub struct PreprocessOutput {
    pub width: u32,
    pub height: u32,
    pub mask: Vec<u8>,
    pub depth: Vec<u8>,
    pub normals: Vec<u8>,
}

/// Synthesized camera views around the subject.
#[derive(Debug)]
pub struct MultiviewOutput {
    pub views: Vec<Vec<u8>>,
}

/// Raw volumetric reconstruction result.
#[derive(Debug)]
pub struct ReconstructOutput {
    pub method: String,
    pub raw_mesh: Vec<u8>,
}

/// Watertight mesh extracted and repaired from the raw reconstruction.
#[derive(Debug)]
pub struct ExtractMeshOutput {
    pub mesh: Vec<u8>,
}

/// Polygon-budgeted mesh after retopology.
#[derive(Debug)]
pub struct RetopologizeOutput {
    pub mesh: Vec<u8>,
    pub polygon_count: u32,
}

/// Texture maps keyed by channel name (albedo, normal, ...).
#[derive(Debug)]
pub struct TextureOutput {
    pub maps: BTreeMap<String, Vec<u8>>,
}

/// Final packaged outputs ready for upload to the artifacts bucket.
#[derive(Debug)]
pub struct ExportOutput {
    pub artifacts: Vec<ArtifactDraft>,
}

/// One artifact produced by the export stage: blob bytes plus the record
/// persisted alongside the job.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub key: String,
    pub kind: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ArtifactDraft {
    pub fn record(&self) -> NewArtifact {
        NewArtifact {
            key: self.key.clone(),
            kind: self.kind.clone(),
        }
    }
}

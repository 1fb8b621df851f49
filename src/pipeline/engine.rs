use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::pipeline::context::{
    ArtifactDraft, ExportOutput, ExtractMeshOutput, MultiviewOutput, PipelineContext,
    PreprocessOutput, ReconstructOutput, RetopologizeOutput, StageOutput, TextureOutput,
};
use crate::pipeline::stage::{Stage, StageError};

/// Texture channels produced for every successful job.
pub const TEXTURE_CHANNELS: [&str; 5] = ["albedo", "normal", "roughness", "metallic", "ao"];

/// Polygon budget applied when the job does not specify one.
pub const DEFAULT_POLYGON_BUDGET: i32 = 20_000;

/// Executes one pipeline stage against the accumulated context.
///
/// The numerical algorithms behind each stage (background removal, view
/// synthesis, reconstruction, retopology, texture baking) live behind this
/// trait; the orchestrator only depends on the input/output contract.
#[async_trait]
pub trait StageEngine: Send + Sync {
    async fn run(&self, stage: Stage, ctx: &PipelineContext) -> Result<StageOutput, StageError>;
}

/// Built-in engine producing deterministic placeholder outputs.
///
/// Used for development and tests in place of the GPU-backed engines. It
/// still enforces the real stage contracts: the input must decode as an
/// image, every stage requires its predecessors' outputs, and export emits
/// the full artifact set for the job's target format.
pub struct SyntheticEngine;

#[async_trait]
impl StageEngine for SyntheticEngine {
    async fn run(&self, stage: Stage, ctx: &PipelineContext) -> Result<StageOutput, StageError> {
        match stage {
            Stage::Preprocess => preprocess(ctx),
            Stage::Multiview => multiview(ctx),
            Stage::Reconstruct => reconstruct(ctx),
            Stage::ExtractMesh => extract_mesh(ctx),
            Stage::Retopologize => retopologize(ctx),
            Stage::Texture => texture(ctx),
            Stage::Export => export(ctx),
        }
    }
}

fn preprocess(ctx: &PipelineContext) -> Result<StageOutput, StageError> {
    let decoded = image::load_from_memory(&ctx.input_image)
        .map_err(|e| StageError::fatal(format!("unsupported or corrupt input image: {e}")))?;

    let width = decoded.width();
    let height = decoded.height();

    Ok(StageOutput::Preprocess(PreprocessOutput {
        width,
        height,
        mask: synthetic_map("mask", width, height),
        depth: synthetic_map("depth", width, height),
        normals: synthetic_map("normals", width, height),
    }))
}

fn multiview(ctx: &PipelineContext) -> Result<StageOutput, StageError> {
    let pre = ctx.require_preprocess()?;

    let view_count = match ctx.mode.as_str() {
        "fast" => 4,
        _ => 8,
    };

    let views = (0..view_count)
        .map(|i| synthetic_view(i, pre.width, pre.height))
        .collect();

    Ok(StageOutput::Multiview(MultiviewOutput { views }))
}

fn reconstruct(ctx: &PipelineContext) -> Result<StageOutput, StageError> {
    let views = &ctx.require_multiview()?.views;
    if views.is_empty() {
        return Err(StageError::fatal("multiview stage produced no views"));
    }

    let method = match ctx.mode.as_str() {
        "fast" => "sdf",
        _ => "nerf",
    };

    Ok(StageOutput::Reconstruct(ReconstructOutput {
        method: method.to_string(),
        raw_mesh: synthetic_mesh("raw", views.len() as u32),
    }))
}

fn extract_mesh(ctx: &PipelineContext) -> Result<StageOutput, StageError> {
    let raw = ctx.require_reconstruct()?;

    Ok(StageOutput::ExtractMesh(ExtractMeshOutput {
        mesh: synthetic_mesh("repaired", raw.raw_mesh.len() as u32),
    }))
}

fn retopologize(ctx: &PipelineContext) -> Result<StageOutput, StageError> {
    ctx.require_extract_mesh()?;

    let budget = ctx.max_polygons.unwrap_or(DEFAULT_POLYGON_BUDGET);

    Ok(StageOutput::Retopologize(RetopologizeOutput {
        mesh: synthetic_mesh("retopo", budget as u32),
        polygon_count: budget as u32,
    }))
}

fn texture(ctx: &PipelineContext) -> Result<StageOutput, StageError> {
    ctx.require_retopologize()?;
    let views = &ctx.require_multiview()?.views;

    let maps: BTreeMap<String, Vec<u8>> = TEXTURE_CHANNELS
        .iter()
        .map(|channel| {
            (
                channel.to_string(),
                synthetic_texture(channel, views.len() as u32),
            )
        })
        .collect();

    Ok(StageOutput::Texture(TextureOutput { maps }))
}

fn export(ctx: &PipelineContext) -> Result<StageOutput, StageError> {
    let mesh = ctx.require_retopologize()?;
    let textures = ctx.require_texture()?;

    let mut artifacts = Vec::with_capacity(1 + textures.maps.len());

    artifacts.push(ArtifactDraft {
        key: format!("{}/model.{}", ctx.job_id, ctx.target_format),
        kind: ctx.target_format.clone(),
        content_type: mesh_content_type(&ctx.target_format).to_string(),
        bytes: mesh.mesh.clone(),
    });

    for (channel, bytes) in &textures.maps {
        artifacts.push(ArtifactDraft {
            key: format!("{}/{}.jpg", ctx.job_id, channel),
            kind: channel.clone(),
            content_type: "image/jpeg".to_string(),
            bytes: bytes.clone(),
        });
    }

    Ok(StageOutput::Export(ExportOutput { artifacts }))
}

fn mesh_content_type(format: &str) -> &'static str {
    match format {
        "glb" => "model/gltf-binary",
        "obj" => "model/obj",
        "stl" => "model/stl",
        _ => "application/octet-stream",
    }
}

fn synthetic_map(tag: &str, width: u32, height: u32) -> Vec<u8> {
    format!("{tag}:{width}x{height}").into_bytes()
}

fn synthetic_view(index: u32, width: u32, height: u32) -> Vec<u8> {
    format!("view:{index}:{width}x{height}").into_bytes()
}

fn synthetic_mesh(tag: &str, seed: u32) -> Vec<u8> {
    format!("mesh:{tag}:{seed}").into_bytes()
}

fn synthetic_texture(channel: &str, seed: u32) -> Vec<u8> {
    format!("texture:{channel}:{seed}").into_bytes()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageBuffer, ImageFormat, Rgb};
    use uuid::Uuid;

    use super::*;
    use crate::models::job::{Job, JobStatus};

    fn png_bytes() -> Vec<u8> {
        let img = ImageBuffer::from_pixel(4, 4, Rgb([128u8, 64u8, 32u8]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn test_job(mode: &str, target_format: &str, max_polygons: Option<i32>) -> Job {
        let now = chrono::Utc::now();
        Job {
            id: Uuid::new_v4(),
            owner: "tester".to_string(),
            input_key: "input.png".to_string(),
            input_filename: Some("input.png".to_string()),
            mode: mode.to_string(),
            target_format: target_format.to_string(),
            max_polygons,
            status: JobStatus::Queued,
            stage: None,
            progress: 0.0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn run_all(ctx: &mut PipelineContext) -> ExportOutput {
        let engine = SyntheticEngine;
        let mut export = None;
        for &stage in Stage::all() {
            let output = engine.run(stage, ctx).await.unwrap();
            if let StageOutput::Export(out) = output {
                export = Some(out);
            } else {
                ctx.apply(output);
            }
        }
        export.unwrap()
    }

    #[tokio::test]
    async fn test_full_pipeline_produces_expected_artifacts() {
        let job = test_job("high_quality", "glb", None);
        let mut ctx = PipelineContext::new(&job, png_bytes());

        let export = run_all(&mut ctx).await;

        let kinds: Vec<&str> = export.artifacts.iter().map(|a| a.kind.as_str()).collect();
        assert!(kinds.contains(&"glb"));
        for channel in TEXTURE_CHANNELS {
            assert!(kinds.contains(&channel), "missing channel {channel}");
        }
        assert_eq!(export.artifacts.len(), 1 + TEXTURE_CHANNELS.len());

        let mesh = &export.artifacts[0];
        assert_eq!(mesh.key, format!("{}/model.glb", job.id));
        assert_eq!(mesh.content_type, "model/gltf-binary");
    }

    #[tokio::test]
    async fn test_fast_mode_generates_fewer_views() {
        let job = test_job("fast", "obj", None);
        let mut ctx = PipelineContext::new(&job, png_bytes());

        let engine = SyntheticEngine;
        let pre = engine.run(Stage::Preprocess, &ctx).await.unwrap();
        ctx.apply(pre);
        let views = engine.run(Stage::Multiview, &ctx).await.unwrap();
        ctx.apply(views);

        assert_eq!(ctx.multiview.as_ref().unwrap().views.len(), 4);
        assert!(ctx.reconstruct.is_none());

        let recon = engine.run(Stage::Reconstruct, &ctx).await.unwrap();
        ctx.apply(recon);
        assert_eq!(ctx.reconstruct.as_ref().unwrap().method, "sdf");
    }

    #[tokio::test]
    async fn test_retopology_honors_polygon_budget() {
        let job = test_job("high_quality", "glb", Some(5_000));
        let mut ctx = PipelineContext::new(&job, png_bytes());
        run_all(&mut ctx).await;
        assert_eq!(ctx.retopologize.as_ref().unwrap().polygon_count, 5_000);

        let job = test_job("high_quality", "glb", None);
        let mut ctx = PipelineContext::new(&job, png_bytes());
        run_all(&mut ctx).await;
        assert_eq!(
            ctx.retopologize.as_ref().unwrap().polygon_count,
            DEFAULT_POLYGON_BUDGET as u32
        );
    }

    #[tokio::test]
    async fn test_preprocess_rejects_non_image_input() {
        let job = test_job("high_quality", "glb", None);
        let ctx = PipelineContext::new(&job, b"definitely not an image".to_vec());

        let err = SyntheticEngine
            .run(Stage::Preprocess, &ctx)
            .await
            .unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("input image"));
    }

    #[tokio::test]
    async fn test_stages_require_predecessor_outputs() {
        let job = test_job("high_quality", "glb", None);
        let ctx = PipelineContext::new(&job, png_bytes());

        // Running reconstruct before multiview must fail the contract.
        let err = SyntheticEngine
            .run(Stage::Reconstruct, &ctx)
            .await
            .unwrap_err();
        assert!(err.message.contains("multiview"));
    }
}

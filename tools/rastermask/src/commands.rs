//! Subcommand implementations over the raster service.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use raster_core::{CellType, RasterDataset, ZoneSet, DEFAULT_NODATA};
use raster_store::{
    DatabaseBackend, DatabaseConfig, FileBackend, FileBackendConfig, RasterBackend, RasterService,
};

use crate::config::{MaskJob, MaskJobFile};

/// Storage selection for one side of an operation.
#[derive(Args, Debug)]
pub struct BackendArgs {
    /// File-backend root directory
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Postgres URL (falls back to DATABASE_URL)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl BackendArgs {
    pub fn from_parts(root: Option<PathBuf>, database_url: Option<String>) -> Self {
        Self { root, database_url }
    }

    /// Open the selected backend. A file root wins when both are given.
    pub async fn open(&self) -> Result<Box<dyn RasterBackend>> {
        if let Some(root) = &self.root {
            let backend = FileBackend::new(FileBackendConfig {
                root_dir: root.clone(),
            })
            .await
            .context("Failed to open file backend")?;
            return Ok(Box::new(backend));
        }
        if let Some(url) = &self.database_url {
            let config = DatabaseConfig {
                database_url: url.clone(),
                ..DatabaseConfig::default()
            };
            let backend = DatabaseBackend::connect(&config)
                .await
                .context("Failed to connect to database")?;
            backend
                .migrate()
                .await
                .context("Failed to run migrations")?;
            return Ok(Box::new(backend));
        }
        bail!("no backend selected: pass --root or --database-url (or set DATABASE_URL)");
    }
}

/// How `mask` maps inputs to outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum MaskMode {
    /// One output per input, clipped to the whole mask
    Single,
    /// One output per mask zone, suffixed `_<zone>`
    Multiple,
}

#[derive(Args, Debug)]
pub struct MaskArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Name of the mask raster
    #[arg(short, long)]
    pub mask: Option<String>,

    /// Input raster names (repeatable)
    #[arg(short, long)]
    pub input: Vec<String>,

    /// Output names, parallel to --input (default `<input>_masked`)
    #[arg(short, long)]
    pub output: Vec<String>,

    /// Fill for mask cells the source does not cover
    #[arg(long, default_value_t = DEFAULT_NODATA)]
    pub default_value: f64,

    /// Output cell type (default: keep each source's)
    #[arg(long)]
    pub out_type: Option<String>,

    /// How outputs map to inputs
    #[arg(long, value_enum, default_value = "single")]
    pub mode: MaskMode,

    /// Batch job file (YAML); replaces --mask/--input/--output
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn mask(args: MaskArgs) -> Result<()> {
    let backend = args.backend.open().await?;
    let service = RasterService::new();

    let (mask_name, jobs) = match &args.config {
        Some(path) => {
            let file = MaskJobFile::from_file(path)
                .with_context(|| format!("Failed to load job file {}", path.display()))?;
            file.validate()?;
            (file.mask.clone(), file.resolve())
        }
        None => {
            let mask_name = match args.mask {
                Some(name) => name,
                None => bail!("--mask is required without --config"),
            };
            if args.input.is_empty() {
                bail!("at least one --input is required");
            }
            if !args.output.is_empty() && args.output.len() != args.input.len() {
                bail!(
                    "--output count ({}) must match --input count ({})",
                    args.output.len(),
                    args.input.len()
                );
            }
            let out_type = parse_out_type(args.out_type.as_deref())?;
            let jobs = args
                .input
                .iter()
                .enumerate()
                .map(|(i, input)| MaskJob {
                    input: input.clone(),
                    output: args
                        .output
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("{}_masked", input)),
                    default_value: args.default_value,
                    out_type,
                })
                .collect();
            (mask_name, jobs)
        }
    };

    let mask = service
        .load(backend.as_ref(), &mask_name)
        .await
        .with_context(|| format!("Failed to load mask '{}'", mask_name))?;

    match args.mode {
        MaskMode::Single => {
            for job in &jobs {
                let clipped = run_job(&service, backend.as_ref(), &mask, job).await?;
                service
                    .save(backend.as_ref(), &job.output, &clipped)
                    .await
                    .with_context(|| format!("Failed to save '{}'", job.output))?;
                println!("✓ {} -> {}", job.input, job.output);
            }
        }
        MaskMode::Multiple => {
            let zones = ZoneSet::from_mask(&mask)?;
            if zones.zones().is_empty() {
                bail!("mask '{}' has no valid cells to form zones", mask_name);
            }
            for job in &jobs {
                let clipped = run_job(&service, backend.as_ref(), &mask, job).await?;
                for zone in zones.zones() {
                    let part = zones.extract(zone.id, &clipped)?;
                    let name = format!("{}_{}", job.output, zone.id);
                    service
                        .save(backend.as_ref(), &name, &part)
                        .await
                        .with_context(|| format!("Failed to save '{}'", name))?;
                    println!("✓ {} -> {} (zone {})", job.input, name, zone.id);
                }
            }
        }
    }

    Ok(())
}

/// Load one input and clip it against the mask.
async fn run_job(
    service: &RasterService,
    backend: &dyn RasterBackend,
    mask: &RasterDataset,
    job: &MaskJob,
) -> Result<RasterDataset> {
    let source = service
        .load(backend, &job.input)
        .await
        .with_context(|| format!("Failed to load '{}'", job.input))?;
    let out_type = job.out_type.unwrap_or(source.header().cell_type);
    let clipped = source.masked_by(mask, job.default_value, out_type)?;
    Ok(clipped)
}

pub async fn copy(src: BackendArgs, dst: BackendArgs, source: &str, dest: &str) -> Result<()> {
    let src_backend = src.open().await.context("Failed to open source backend")?;
    let dst_backend = dst
        .open()
        .await
        .context("Failed to open destination backend")?;
    let service = RasterService::new();
    service
        .copy(src_backend.as_ref(), source, dst_backend.as_ref(), dest)
        .await?;
    println!("✓ copied {} -> {}", source, dest);
    Ok(())
}

pub async fn rename(backend: BackendArgs, old_name: &str, new_name: &str) -> Result<()> {
    let backend = backend.open().await?;
    let service = RasterService::new();
    service.rename(backend.as_ref(), old_name, new_name).await?;
    println!("✓ renamed {} -> {}", old_name, new_name);
    Ok(())
}

pub async fn rm(backend: BackendArgs, name: &str) -> Result<()> {
    let backend = backend.open().await?;
    let service = RasterService::new();
    service.delete(backend.as_ref(), name).await?;
    println!("✓ removed {}", name);
    Ok(())
}

pub async fn info(backend: BackendArgs, name: &str) -> Result<()> {
    let backend = backend.open().await?;
    let header = backend.read_header(name).await?;
    println!("{}", serde_json::to_string_pretty(&header)?);
    Ok(())
}

fn parse_out_type(raw: Option<&str>) -> Result<Option<CellType>> {
    match raw {
        Some(s) => {
            let cell_type = s.parse::<CellType>().map_err(anyhow::Error::msg)?;
            Ok(Some(cell_type))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::dense_dataset;

    fn file_args(dir: &tempfile::TempDir) -> BackendArgs {
        BackendArgs::from_parts(Some(dir.path().to_path_buf()), None)
    }

    fn mask_args(dir: &tempfile::TempDir, mask: &str, input: &str) -> MaskArgs {
        MaskArgs {
            backend: file_args(dir),
            mask: Some(mask.to_string()),
            input: vec![input.to_string()],
            output: vec![],
            default_value: -1.0,
            out_type: None,
            mode: MaskMode::Single,
            config: None,
        }
    }

    #[tokio::test]
    async fn test_mask_single_mode_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let service = RasterService::new();
        let backend = file_args(&dir).open().await.unwrap();

        // Mask and source share the demo grid, so values carry over
        // unchanged inside the mask's extent.
        service
            .save(backend.as_ref(), "clip", &dense_dataset(2, 2, 1))
            .await
            .unwrap();
        service
            .save(backend.as_ref(), "terrain", &dense_dataset(4, 4, 1))
            .await
            .unwrap();

        mask(mask_args(&dir, "clip", "terrain")).await.unwrap();

        let clipped = service
            .load(backend.as_ref(), "terrain_masked")
            .await
            .unwrap();
        assert_eq!(clipped.header().rows, 2);
        assert_eq!(clipped.header().cols, 2);
    }

    #[tokio::test]
    async fn test_mask_requires_mask_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = mask_args(&dir, "unused", "terrain");
        args.mask = None;
        assert!(mask(args).await.is_err());
    }

    #[tokio::test]
    async fn test_open_requires_a_backend() {
        let args = BackendArgs::from_parts(None, None);
        assert!(args.open().await.is_err());
    }

    #[test]
    fn test_parse_out_type() {
        assert_eq!(parse_out_type(None).unwrap(), None);
        assert_eq!(
            parse_out_type(Some("int16")).unwrap(),
            Some(CellType::Int16)
        );
        assert!(parse_out_type(Some("float16")).is_err());
    }
}

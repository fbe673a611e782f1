//! Composite job configuration loaded from YAML.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use catalog_client::{AttributeFilter, SearchRequest};
use compute_engine::{ComputeConfig, ReduceDims, Reducer};
use raster_common::{BoundingBox, CrsCode, TimeInterval};
use virtual_array::{BuildParams, CompositePolicy, Resampling};

/// Top-level job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub catalog: CatalogConfig,
    pub search: SearchConfig,
    pub build: BuildConfig,
    #[serde(default)]
    pub compute: ComputeSection,
    pub tiles: TileStoreConfig,
    pub output: OutputConfig,
}

impl JobConfig {
    /// Load and validate a job file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job file {}", path.display()))?;
        let config: JobConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse job file {}", path.display()))?;
        Ok(config)
    }

    /// Build the catalog search request described by the job.
    pub fn search_request(&self) -> Result<SearchRequest> {
        let mut request = SearchRequest::collections(self.search.collections.clone());

        if let Some(bbox) = &self.search.bbox {
            let bbox = BoundingBox::from_corner_string(bbox)
                .with_context(|| format!("invalid search bbox '{}'", bbox))?;
            request = request.within(bbox);
        }

        if let Some(time) = &self.search.time {
            let interval = TimeInterval::from_interval_string(time)
                .with_context(|| format!("invalid search time interval '{}'", time))?;
            request = request.during(interval);
        }

        for filter in &self.search.filters {
            request = request.filter(filter.field.clone(), filter.op, filter.value);
        }

        if let Some(page_size) = self.catalog.page_size {
            request = request.page_size(page_size);
        }

        Ok(request)
    }

    /// Build the virtual-array parameters described by the job.
    pub fn build_params(&self) -> Result<BuildParams> {
        let crs = match &self.build.crs {
            Some(code) => CrsCode::from_authority_string(code)
                .with_context(|| format!("invalid target CRS '{}'", code))?,
            None => CrsCode::Epsg4326,
        };

        let mut params = BuildParams::new(self.build.resolution)
            .with_crs(crs)
            .with_resampling(self.build.resampling)
            .with_policy(self.build.policy);

        if let Some(bbox) = &self.build.bounds {
            let bbox = BoundingBox::from_corner_string(bbox)
                .with_context(|| format!("invalid build bounds '{}'", bbox))?;
            params = params.with_bounds(bbox);
        }

        if let Some(bands) = &self.build.bands {
            params = params.with_bands(bands.clone());
        }

        if let Some(seconds) = self.build.time_tolerance_secs {
            params = params.with_time_tolerance(chrono::Duration::seconds(seconds as i64));
        }

        Ok(params)
    }

    /// Build the compute configuration described by the job.
    pub fn compute_config(&self) -> ComputeConfig {
        let mut config = ComputeConfig::default();
        if let Some(workers) = self.compute.workers {
            config.workers = workers;
        }
        if let Some(retries) = self.compute.max_retries {
            config.max_retries = retries;
        }
        config
    }

    /// Per-read timeout for tile fetches.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.compute.read_timeout_secs.unwrap_or(30))
    }
}

/// Catalog endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog base URL.
    pub url: String,
    /// Page size override.
    pub page_size: Option<usize>,
}

/// Search filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub collections: Vec<String>,
    /// "minx,miny,maxx,maxy" in geographic coordinates.
    pub bbox: Option<String>,
    /// "start/end" interval; either side may be "..".
    pub time: Option<String>,
    #[serde(default)]
    pub filters: Vec<AttributeFilter>,
}

/// Virtual-array output parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Output cell size in target CRS units.
    pub resolution: f64,
    /// Target CRS (default EPSG:4326).
    pub crs: Option<String>,
    /// Explicit output bounds, "minx,miny,maxx,maxy" in the target CRS.
    pub bounds: Option<String>,
    #[serde(default)]
    pub resampling: Resampling,
    /// Band selection, in output order.
    pub bands: Option<Vec<String>>,
    #[serde(default)]
    pub policy: CompositePolicy,
    /// Acquisitions closer than this share one time slot.
    pub time_tolerance_secs: Option<u64>,
}

/// Reduction applied before materializing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReduceConfig {
    pub dims: ReduceDims,
    pub reducer: Reducer,
}

/// Compute section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputeSection {
    pub workers: Option<usize>,
    pub max_retries: Option<u32>,
    pub read_timeout_secs: Option<u64>,
    pub reduce: Option<ReduceConfig>,
    #[serde(default)]
    pub allow_partial: bool,
}

/// Where tiles live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum TileStoreConfig {
    /// S3/MinIO-compatible object storage.
    S3 {
        endpoint: String,
        bucket: String,
        access_key_id: String,
        secret_access_key: String,
        #[serde(default = "default_region")]
        region: String,
        #[serde(default)]
        allow_http: bool,
    },
    /// Local directory (useful for development and testing).
    Local { root: PathBuf },
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl TileStoreConfig {
    /// Construct the object store this config describes.
    pub fn build_store(&self) -> Result<Arc<dyn ObjectStore>> {
        match self {
            TileStoreConfig::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
                allow_http,
            } => {
                let mut builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_bucket_name(bucket)
                    .with_access_key_id(access_key_id)
                    .with_secret_access_key(secret_access_key)
                    .with_region(region);

                if *allow_http {
                    builder = builder.with_allow_http(true);
                }

                let store = builder.build().context("failed to create S3 client")?;
                Ok(Arc::new(store))
            }
            TileStoreConfig::Local { root } => {
                let store = LocalFileSystem::new_with_prefix(root)
                    .with_context(|| format!("failed to open tile root {}", root.display()))?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Output destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Path for the raw f32 output; a JSON metadata sidecar lands next
    /// to it.
    pub path: PathBuf,
}

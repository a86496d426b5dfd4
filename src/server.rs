use std::{env, path::PathBuf, sync::OnceLock};

use clap::Args;
use serde::{Deserialize, Serialize};
use tokio::{fs::{create_dir_all, read_to_string, File}, io::AsyncWriteExt, sync::Mutex};

use crate::{
    domain::render::DEFAULT_MIN_CONFIDENCE,
    error::{Error, Result},
    tools::{clock::SECONDS_IN_HOUR, log::{log_info, log_warn, LogServiceType}, scheduler::DEFAULT_ANALYSIS_CONCURRENCY},
};


static CONFIG: OnceLock<Mutex<ServerConfig>> = OnceLock::new();

const ENV_DIR: &str = "FACELAPSE_DIR";
const ENV_FFMPEG: &str = "FACELAPSE_FFMPEG";
const ENV_DETECTOR: &str = "FACELAPSE_DETECTOR";
const ENV_CONCURRENCY: &str = "FACELAPSE_CONCURRENCY";
const ENV_MIN_CONFIDENCE: &str = "FACELAPSE_MIN_CONFIDENCE";
const ENV_JOB_TTL: &str = "FACELAPSE_JOB_TTL";

const CONFIG_FILE: &str = "config.json";
const JOBS_FOLDER: &str = "jobs";
pub const ORIGINAL_FOLDER: &str = "original";
pub const ALIGNED_FOLDER: &str = "aligned";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Root of the job folders, resolved at startup and never read from config.json.
    #[serde(skip, default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_detector_program")]
    pub detector_program: String,
    #[serde(default = "default_detector_args")]
    pub detector_args: Vec<String>,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    #[serde(default = "default_concurrency")]
    pub analysis_concurrency: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_job_ttl")]
    pub job_ttl_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            detector_program: default_detector_program(),
            detector_args: default_detector_args(),
            ffmpeg_path: default_ffmpeg(),
            analysis_concurrency: default_concurrency(),
            min_confidence: default_min_confidence(),
            job_ttl_seconds: default_job_ttl(),
        }
    }
}

impl ServerConfig {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self { data_dir, ..Default::default() }
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join(JOBS_FOLDER)
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_dir().join(job_id)
    }

    pub fn original_dir(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(ORIGINAL_FOLDER)
    }

    pub fn aligned_dir(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(ALIGNED_FOLDER)
    }
}

fn default_data_dir() -> PathBuf {
    env::temp_dir().join("facelapse")
}

fn default_detector_program() -> String {
    "python3".to_string()
}

fn default_detector_args() -> Vec<String> {
    vec!["scripts/detect_face.py".to_string()]
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_concurrency() -> usize {
    DEFAULT_ANALYSIS_CONCURRENCY
}

fn default_min_confidence() -> f32 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_job_ttl() -> u64 {
    SECONDS_IN_HOUR
}

/// Command line overrides, highest priority.
#[derive(Args, Debug, Default, Clone)]
pub struct ServerArgs {
    /// Folder holding config.json and the job folders
    #[arg(short, long)]
    pub dir: Option<String>,

    /// ffmpeg binary name or path
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// Landmark detector script, run with python3
    #[arg(long)]
    pub detector: Option<String>,

    /// Number of images analyzed at the same time
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub min_confidence: Option<f32>,
}

pub async fn initialize_config(args: &ServerArgs) -> Result<ServerConfig> {
    let config = get_config_with_overrides(args).await?;
    log_info(LogServiceType::Register, format!("LocalPath: {:?}", config.data_dir));
    match CONFIG.get() {
        Some(current) => *current.lock().await = config.clone(),
        None => {
            let _ = CONFIG.set(Mutex::new(config.clone()));
        }
    }
    Ok(config)
}

pub async fn get_config() -> ServerConfig {
    if let Some(config) = CONFIG.get() {
        return config.lock().await.clone();
    }
    let config = match get_config_with_overrides(&ServerArgs::default()).await {
        Ok(config) => config,
        Err(error) => {
            log_warn(LogServiceType::Register, format!("Using default config: {:#}", error));
            ServerConfig::default()
        }
    };
    let _ = CONFIG.set(Mutex::new(config.clone()));
    config
}

pub async fn get_server_local_path(args: &ServerArgs) -> Result<PathBuf> {
    let dir_path = if let Some(argdir) = &args.dir {
        PathBuf::from(argdir)
    } else if let Ok(val) = env::var(ENV_DIR) {
        PathBuf::from(&val)
    } else if let Some(mut dir_path) = dirs::cache_dir() {
        dir_path.push("facelapse");
        dir_path
    } else {
        default_data_dir()
    };

    let Ok(_) = create_dir_all(&dir_path).await else { return Err(Error::ServerUnableToAccessLocalFolder); };
    Ok(dir_path)
}

pub async fn get_config_with_overrides(args: &ServerArgs) -> Result<ServerConfig> {
    let dir_path = get_server_local_path(args).await?;
    let mut config = get_raw_config(&dir_path).await?;
    config.data_dir = dir_path;
    apply_env_overrides(&mut config);
    apply_args(&mut config, args);
    Ok(config)
}

/// Reads `<dir>/config.json`, writing a default one when missing.
pub async fn get_raw_config(dir_path: &PathBuf) -> Result<ServerConfig> {
    let config_path = dir_path.join(CONFIG_FILE);
    if let Ok(data) = read_to_string(&config_path).await {
        let Ok(config) = serde_json::from_str::<ServerConfig>(&data) else { return Err(Error::ServerMalformatedConfigFile); };
        Ok(config)
    } else {
        let new_config = ServerConfig::default();
        let new_config_string = serde_json::to_string_pretty(&new_config)?;
        let Ok(mut file) = File::create(&config_path).await else { return Err(Error::ServerUnableToAccessLocalFolder); };
        file.write_all(new_config_string.as_bytes()).await?;
        Ok(new_config)
    }
}

fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(ffmpeg) = env::var(ENV_FFMPEG) {
        config.ffmpeg_path = ffmpeg;
    }
    if let Ok(detector) = env::var(ENV_DETECTOR) {
        config.detector_args = vec![detector];
    }
    if let Some(concurrency) = env::var(ENV_CONCURRENCY).ok().and_then(|c| c.parse::<usize>().ok()) {
        config.analysis_concurrency = concurrency;
    }
    if let Some(min_confidence) = env::var(ENV_MIN_CONFIDENCE).ok().and_then(|c| c.parse::<f32>().ok()) {
        config.min_confidence = min_confidence;
    }
    if let Some(ttl) = env::var(ENV_JOB_TTL).ok().and_then(|c| c.parse::<u64>().ok()) {
        config.job_ttl_seconds = ttl;
    }
}

fn apply_args(config: &mut ServerConfig, args: &ServerArgs) {
    if let Some(ffmpeg) = &args.ffmpeg {
        config.ffmpeg_path = ffmpeg.clone();
    }
    if let Some(detector) = &args.detector {
        config.detector_args = vec![detector.clone()];
    }
    if let Some(concurrency) = args.concurrency {
        config.analysis_concurrency = concurrency;
    }
    if let Some(min_confidence) = args.min_confidence {
        config.min_confidence = min_confidence;
    }
    config.analysis_concurrency = config.analysis_concurrency.max(1);
}

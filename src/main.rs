use anyhow::{Context, Result, bail};
use clap::Parser;
use heicconv::{
    BatchObserver, BatchResult, ClientConfig, ClientError, ConversionOutcome, ConvertApi,
    ConvertRequest, ConvertedImage, ConverterClient, FileRef, FnObserver, RetryPolicy,
    TargetFormat, config::API_URL_ENV, converter::Payload, run_batch,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// heicconv - HEIC/HEIF conversion client
///
/// Sends HEIC/HEIF images to a conversion service and saves the JPEG/PNG
/// results.
///
/// Examples:
///   heicconv health
///   heicconv convert IMG_0001.HEIC IMG_0002.HEIC --format png --out converted/
#[derive(Parser, Debug)]
#[command(author, version = env!("HEICCONV_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Conversion service base URL
    #[arg(long = "api-url", env = API_URL_ENV, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Per-attempt timeout in milliseconds
    #[arg(long = "timeout-ms", value_name = "MS", global = true)]
    timeout_ms: Option<u64>,

    /// Number of retries after the first attempt
    #[arg(long, value_name = "N", global = true)]
    retries: Option<u32>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Check whether the service is reachable
    Health,

    /// Show image metadata reported by the service
    Info(InfoArgs),

    /// Convert one or more files
    Convert(ConvertArgs),
}

#[derive(clap::Args, Debug)]
struct InfoArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Target format (jpeg or png)
    #[arg(long, short = 'f', default_value = "jpeg")]
    format: TargetFormat,

    /// Output quality between 0.0 and 1.0
    #[arg(long, short = 'q')]
    quality: Option<f32>,

    /// Output directory
    #[arg(long, short = 'o', value_name = "DIR", default_value = ".")]
    out: PathBuf,

    /// Fetch the image bytes directly instead of the JSON-wrapped payload
    #[arg(long)]
    download: bool,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        if let Some(url) = &self.api_url {
            config = config.with_base_url(url.as_str());
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = self.retries {
            let base_delay = config.retry().base_delay();
            config = config.with_retry(RetryPolicy::new(retries, base_delay));
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let client = ConverterClient::new(cli.client_config()).context("Invalid client configuration")?;

    match cli.command {
        Commands::Health => health(&client).await,
        Commands::Info(args) => info(&client, &args.file).await,
        Commands::Convert(args) => convert(&client, args).await,
    }
}

async fn health(client: &ConverterClient) -> Result<()> {
    if !client.is_service_available().await {
        bail!("Service at {} is not available", client.config().base_url());
    }
    println!("{}: available", client.config().base_url());
    if let Ok(info) = client.service_info().await {
        println!("{} (version {})", info.message, info.version);
    }
    Ok(())
}

async fn info(client: &ConverterClient, path: &Path) -> Result<()> {
    let file = FileRef::open(path).await?;
    let meta = client
        .get_image_info(&file)
        .await
        .with_context(|| format!("Failed to read image info for {:?}", path))?;

    println!("{} ({} bytes)", meta.filename, meta.size);
    println!("  dimensions: {}x{}", meta.info.width, meta.info.height);
    if let Some(format) = &meta.info.format {
        println!("  format:     {}", format);
    }
    if let Some(mode) = &meta.info.mode {
        println!("  mode:       {}", mode);
    }
    println!("  alpha:      {}", meta.info.has_transparency);
    Ok(())
}

async fn convert(client: &ConverterClient, args: ConvertArgs) -> Result<()> {
    let mut requests = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let mut request = ConvertRequest::new(FileRef::open(path).await?, args.format);
        if let Some(quality) = args.quality {
            request = request.with_quality(quality);
        }
        requests.push(request);
    }

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create output directory {:?}", args.out))?;

    let result = if args.download {
        download_all(client, &requests, &args.out).await
    } else {
        convert_all(client, &requests, &args.out).await?
    };

    println!(
        "{} succeeded, {} failed, {} total",
        result.successful, result.failed, result.total
    );
    if !result.all_succeeded() {
        bail!("{} of {} files failed", result.failed, result.total);
    }
    Ok(())
}

/// Prints `[i/n]` progress lines to stderr.
fn progress_observer(requests: &[ConvertRequest]) -> impl BatchObserver + '_ {
    let total = requests.len();
    FnObserver::new(
        move |index, _| eprintln!("[{}/{}] {}", index + 1, total, requests[index].file.name()),
        move |index, outcome: &ConversionOutcome| match outcome {
            ConversionOutcome::Success(image) => {
                eprintln!("[{}/{}] ok -> {}", index + 1, total, image.filename)
            }
            ConversionOutcome::Failure(failure) => {
                eprintln!("[{}/{}] failed: {}", index + 1, total, failure.message)
            }
        },
    )
}

async fn convert_all(
    client: &ConverterClient,
    requests: &[ConvertRequest],
    out: &Path,
) -> Result<BatchResult> {
    let observer = progress_observer(requests);
    let result = heicconv::convert_batch(client, requests, &observer).await;

    for (request, outcome) in requests.iter().zip(&result.outcomes) {
        if let ConversionOutcome::Success(image) = outcome {
            let bytes = image
                .decode_bytes()
                .with_context(|| format!("Invalid base64 payload for {}", image.filename))?;
            match bytes {
                Some(bytes) => {
                    let path = output_path(out, request, &image.filename);
                    std::fs::write(&path, bytes)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                }
                None => eprintln!("{}: no inline data returned", image.filename),
            }
        }
    }
    Ok(result)
}

/// Batch over the download endpoint. Bytes are written as each file
/// completes; a failed write counts as that file's failure.
async fn download_all(
    client: &ConverterClient,
    requests: &[ConvertRequest],
    out: &Path,
) -> BatchResult {
    let observer = progress_observer(requests);
    run_batch(requests, &observer, move |request| async move {
        let bytes = client.convert_and_download(request).await?;
        let path = output_path(out, request, "");
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| ClientError::Io {
                path: path.clone(),
                source,
            })?;
        Ok::<_, ClientError>(ConvertedImage {
            filename: file_name(&path),
            original_size: request.file.size().unwrap_or_default(),
            converted_size: bytes.len() as u64,
            payload: Payload::None,
        })
    })
    .await
}

/// Uses the server-provided name when there is one, else the input stem
/// with the target extension.
fn output_path(out: &Path, request: &ConvertRequest, server_name: &str) -> PathBuf {
    let server_name = Path::new(server_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !server_name.is_empty() {
        return out.join(server_name);
    }
    let stem = Path::new(request.file.name())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "converted".to_string());
    out.join(format!("{}.{}", stem, request.format.extension()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// src/bin/cli.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! `s3os`: command line access to one bucket through the object storage adapter.
//!
//! Examples:
//! ```bash
//! s3os url    images/logo.png
//! s3os ls     images/
//! s3os mkdir  images/2025/
//! s3os put    ./logo.png images/logo.png
//! s3os put    ./dataset.tar backups/dataset.tar --multipart --part-size 64
//! s3os get    images/logo.png ./logo.png
//! s3os get    notes.txt --range 0-99
//! s3os cp     images/logo.png images/logo-old.png
//! s3os mv     images/logo-old.png archive/logo.png
//! s3os rm     archive/logo.png
//! s3os exists images/logo.png
//! ```
//!
//! The bucket, region and endpoint come from the environment (`S3_BUCKET`,
//! `AWS_REGION`, `AWS_ENDPOINT_URL`, ... or a `.env` file) unless overridden.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::{self, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use s3_object_storage::constants::{DEFAULT_DOWNLOAD_CHUNK_SIZE, MIN_S3_MULTIPART_PART_SIZE};
use s3_object_storage::{
    ByteRange, ChecksumCalculator, MultipartUploadConfig, S3DriverFactory, S3ObjectStorage,
    S3StorageConfig,
};

const MIB: usize = 1024 * 1024;

#[derive(Parser)]
#[command(name = "s3os", author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Bucket to operate on (overrides S3_BUCKET).
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Region (overrides AWS_REGION).
    #[arg(long, global = true)]
    region: Option<String>,

    /// S3-compatible API endpoint (overrides AWS_ENDPOINT_URL).
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Per-request timeout in seconds for uploads and downloads.
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the public URL of a key. Makes no request.
    Url { key: String },

    /// List the immediate children of a prefix (top level when omitted).
    Ls { prefix: Option<String> },

    /// Create a zero-length directory marker.
    Mkdir { key: String },

    /// Upload a local file.
    Put {
        file: PathBuf,
        key: String,

        /// Use a multipart upload instead of a single PUT.
        #[arg(short, long)]
        multipart: bool,

        /// Part size in MiB for --multipart (minimum 5).
        #[arg(long, default_value_t = 16)]
        part_size: usize,

        /// Do not declare a CRC32 checksum.
        #[arg(long)]
        no_checksum: bool,
    },

    /// Download an object to a file, or to stdout when no file is given.
    Get {
        key: String,
        file: Option<PathBuf>,

        /// Inclusive byte range, e.g. `0-1023`.
        #[arg(short, long, value_parser = parse_range)]
        range: Option<ByteRange>,

        /// Chunk size in bytes for the streamed download.
        #[arg(long, default_value_t = DEFAULT_DOWNLOAD_CHUNK_SIZE)]
        chunk_size: u64,
    },

    /// Server-side copy.
    Cp { source: String, destination: String },

    /// Copy, then delete the source.
    Mv { source: String, destination: String },

    /// Delete an object.
    Rm { key: String },

    /// Print whether a key exists; exits with status 1 when it does not.
    Exists { key: String },
}

fn parse_range(s: &str) -> Result<ByteRange> {
    let (start, end) = s
        .split_once('-')
        .with_context(|| format!("range {s:?} must look like START-END"))?;
    let start = start.trim().parse().context("invalid range start")?;
    let end = end.trim().parse().context("invalid range end")?;
    Ok(ByteRange::new(start, end)?)
}

fn load_config(cli: &Cli) -> Result<S3StorageConfig> {
    dotenvy::dotenv().ok();
    let config = S3StorageConfig::from_lookup(|name| match name {
        "S3_BUCKET" if cli.bucket.is_some() => cli.bucket.clone(),
        "AWS_REGION" if cli.region.is_some() => cli.region.clone(),
        "AWS_ENDPOINT_URL" if cli.endpoint.is_some() => cli.endpoint.clone(),
        _ => std::env::var(name).ok(),
    })
    .context("failed to load configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let mut factory = S3DriverFactory::new(config)
        .await
        .context("failed to create S3 driver")?;
    let storage = factory.make_storage()?;
    let timeout = cli.timeout.map(Duration::from_secs);

    let result = run(&storage, cli.cmd, timeout).await;
    factory.shutdown();
    result
}

async fn run(storage: &S3ObjectStorage, cmd: Command, timeout: Option<Duration>) -> Result<()> {
    match cmd {
        Command::Url { key } => {
            println!("{}", storage.resolve(&key));
        }
        Command::Ls { prefix } => {
            for name in storage.list(prefix.as_deref()).await? {
                println!("{name}");
            }
        }
        Command::Mkdir { key } => {
            storage.create(&key).await?;
        }
        Command::Put {
            file,
            key,
            multipart,
            part_size,
            no_checksum,
        } => {
            let started = Instant::now();
            let bytes = if multipart {
                put_multipart(storage, &file, &key, part_size * MIB, !no_checksum, timeout).await?
            } else {
                put_single(storage, &file, &key, !no_checksum, timeout).await?
            };
            info!("uploaded {} bytes to {} in {:?}", bytes, key, started.elapsed());
            println!("{}", storage.resolve(&key));
        }
        Command::Get {
            key,
            file,
            range,
            chunk_size,
        } => {
            let written = match file {
                Some(path) => {
                    let mut out = File::create(&path)
                        .await
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    get_into(storage, &key, range, chunk_size, timeout, &mut out).await?
                }
                None => get_into(storage, &key, range, chunk_size, timeout, &mut io::stdout()).await?,
            };
            info!("downloaded {} bytes from {}", written, key);
        }
        Command::Cp {
            source,
            destination,
        } => {
            storage.copy(&source, &destination).await?;
        }
        Command::Mv {
            source,
            destination,
        } => {
            storage.move_object(&source, &destination).await?;
        }
        Command::Rm { key } => {
            storage.delete(&key).await?;
        }
        Command::Exists { key } => {
            let found = storage.exists(&key).await?;
            println!("{found}");
            if !found {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

async fn put_single(
    storage: &S3ObjectStorage,
    file: &Path,
    key: &str,
    checksum: bool,
    timeout: Option<Duration>,
) -> Result<u64> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let checksum = checksum.then(|| {
        let mut calc = storage.create_checksum_calculator();
        calc.update(&data);
        calc.finalize()
    });
    let len = data.len() as u64;
    storage
        .upload(key, data, checksum.as_deref(), timeout)
        .await
        .with_context(|| format!("failed to upload {key}"))?;
    Ok(len)
}

async fn put_multipart(
    storage: &S3ObjectStorage,
    file: &Path,
    key: &str,
    part_size: usize,
    checksum: bool,
    timeout: Option<Duration>,
) -> Result<u64> {
    if part_size < MIN_S3_MULTIPART_PART_SIZE {
        bail!("--part-size must be at least 5 MiB");
    }
    let mut input = File::open(file)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;

    let cfg = MultipartUploadConfig {
        part_size,
        verify_checksum: checksum,
        timeout,
    };
    let mut session = storage.start_multipart(key, cfg).await?;

    let mut buf = vec![0u8; part_size];
    loop {
        let n = match input.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("read failed, aborting upload {}", session.upload_id());
                session.cancel().await.ok();
                return Err(e).context("failed to read input file");
            }
        };
        if let Err(e) = session.write(&buf[..n]).await {
            warn!("part upload failed, aborting upload {}", session.upload_id());
            session.cancel().await.ok();
            return Err(e).context("multipart upload failed");
        }
    }

    let upload_id = session.upload_id().clone();
    let summary = match session.complete().await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("completion failed, aborting upload {}", upload_id);
            if let Err(abort) = storage.cancel_multipart_upload(key, &upload_id).await {
                warn!("abort of upload {} for {} failed: {}", upload_id, key, abort);
            }
            return Err(e).context("failed to complete multipart upload");
        }
    };
    info!(
        "completed {} in {} parts (checksum {:?})",
        summary.key, summary.parts, summary.checksum
    );
    Ok(summary.total_bytes)
}

async fn get_into<W>(
    storage: &S3ObjectStorage,
    key: &str,
    range: Option<ByteRange>,
    chunk_size: u64,
    timeout: Option<Duration>,
    out: &mut W,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut chunks = storage.download_stream(key, range, chunk_size, timeout);
    let mut written = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.with_context(|| format!("failed to download {key}"))?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

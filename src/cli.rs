// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: One command: upgrade the listed images in place.

use clap::Parser;
use reimage::runtime::RuntimeType;
use reimage::types::TargetRef;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "reimage")]
#[command(about = "Apply pending security updates to local container images in place")]
#[command(version)]
pub struct Cli {
    /// Images to upgrade: repository[:tag], repository@digest, or image id
    #[arg(required = true, value_name = "IMAGE")]
    pub images: Vec<TargetRef>,

    /// Commit even when nothing was upgraded, and allow untagged images
    #[arg(short, long)]
    pub force: bool,

    /// Skip images that do not exist instead of failing
    #[arg(short = 'i', long)]
    pub ignore_unknown: bool,

    /// Skip images whose inspection fails instead of failing
    #[arg(long)]
    pub ignore_inspect_errors: bool,

    /// HTTP proxy for package downloads inside the upgrade container
    #[arg(long, value_name = "URL", conflicts_with = "squid")]
    pub http_proxy: Option<String>,

    /// HTTPS proxy for package downloads inside the upgrade container
    #[arg(long, value_name = "URL")]
    pub https_proxy: Option<String>,

    /// Run a caching squid sidecar and route all downloads through it
    #[arg(long)]
    pub squid: bool,

    /// Stop running containers whose image was upgraded
    #[arg(short, long)]
    pub stop: bool,

    /// Use this script instead of the bundled upgrade script
    #[arg(long, value_name = "PATH")]
    pub script: Option<PathBuf>,

    /// Settings file (YAML)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Container runtime to use instead of auto-detection
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeType>,

    /// Runtime API socket path
    #[arg(long, value_name = "PATH")]
    pub socket: Option<String>,

    /// Exit non-zero when any image failed to upgrade
    #[arg(long)]
    pub fail_on_error: bool,

    /// Only print upgrades and failures
    #[arg(short, long, conflicts_with_all = ["verbose", "json"])]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print JSON lines instead of text
    #[arg(long)]
    pub json: bool,
}

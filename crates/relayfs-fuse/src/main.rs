//! relaymount - mirror a directory through FUSE.
//!
//! Usage: relaymount <BACKING_ROOT> <MOUNTPOINT> [--log-file PATH]

use anyhow::{Context, Result};
use clap::Parser;
use relayfs_core::{AttrPolicy, SessionConfig, SessionContext, is_superuser};
use relayfs_fuse::{MountConfig, RelayFS};
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relaymount")]
#[command(about = "Mount a directory as a FUSE passthrough filesystem")]
#[command(version)]
struct Cli {
    /// Directory whose contents are exposed
    backing_root: PathBuf,

    /// Mountpoint for the filesystem
    mount: PathBuf,

    /// Append one diagnostic record per operation to this file
    #[arg(long, env = "RELAYFS_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Report fixed attributes instead of the backing files' own
    #[arg(long)]
    synthetic_attrs: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Mount as read-only (default: read-write)
    #[arg(long)]
    read_only: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Every request is forwarded with the daemon's own credentials, so a
    // root daemon would hand root access to anyone who can reach the mount.
    if is_superuser() {
        anyhow::bail!("Running relaymount as root opens unacceptable security holes");
    }

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let mut session_config = SessionConfig::new(&cli.backing_root);
    if let Some(log) = &cli.log_file {
        session_config = session_config.diagnostics_log(log);
    }
    if cli.synthetic_attrs {
        session_config = session_config.attr_policy(AttrPolicy::Synthetic);
    }

    let session = SessionContext::from_config(&session_config).with_context(|| {
        format!(
            "Failed to open backing root {}",
            cli.backing_root.display()
        )
    })?;

    let mountpoint = relayfs_mount::check_mountpoint(&cli.mount, session.backing_root())
        .context("Mount point rejected")?;

    let config = MountConfig::default().read_only(cli.read_only);

    let (tx, rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to set signal handler")?;

    info!(
        backing_root = %session.backing_root().display(),
        mount = %mountpoint.display(),
        "Mounting filesystem (press Ctrl+C to unmount)"
    );

    let fs = RelayFS::with_config(Arc::new(session), config);
    let handle = relayfs_fuse::mount(fs, &mountpoint).context("Failed to mount filesystem")?;

    match rx.recv() {
        Ok(()) => info!("Received interrupt signal, unmounting..."),
        Err(_) => warn!("Signal channel closed unexpectedly"),
    }

    handle.unmount();
    info!("Filesystem unmounted");
    Ok(())
}

//! cep edit server binary.
//!
//! Serves one shared document over WebSocket until interrupted, then drains
//! queued edits before exiting.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use cep_collab::{EditServer, ServerConfig};
use cep_core::EditorConfig;

/// Server command line arguments.
#[derive(Parser, Debug)]
#[command(name = "cep-server")]
#[command(about = "Shared-document concurrent editing server")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Update frames buffered per connection before it is disconnected
    #[arg(long, default_value = "1024")]
    broadcast_capacity: NonZeroUsize,

    /// Applied operations kept for transforming late edits (unbounded if unset)
    #[arg(long, value_name = "OPS")]
    history_limit: Option<usize>,

    /// File whose bytes become the initial document
    #[arg(long, value_name = "PATH")]
    initial_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> std::io::Result<ServerConfig> {
        let initial_content = match &self.initial_file {
            Some(path) => std::fs::read(path)?,
            None => Vec::new(),
        };
        if initial_content.len() > u32::MAX as usize {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "initial document exceeds 4 GiB",
            ));
        }

        Ok(ServerConfig {
            bind_addr: self.bind,
            broadcast_capacity: self.broadcast_capacity,
            editor: EditorConfig {
                initial_content,
                history_limit: self.history_limit,
                ..EditorConfig::default()
            },
            ..ServerConfig::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let server = EditServer::new(args.into_config()?)?;
    log::info!(
        "Starting cep-server with {} byte document",
        server.editor().len()
    );

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupt received, shutting down");
        }
    }

    server.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["cep-server"]).unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.broadcast_capacity.get(), 1024);
        assert!(config.editor.history_limit.is_none());
    }

    #[test]
    fn test_zero_broadcast_capacity_is_refused() {
        let err = Args::try_parse_from(["cep-server", "--broadcast-capacity", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_history_limit_flag() {
        let args = Args::try_parse_from(["cep-server", "--history-limit", "50"]).unwrap();
        assert_eq!(args.into_config().unwrap().editor.history_limit, Some(50));
    }
}

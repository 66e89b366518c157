use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;

/// Runtime configuration for the `ledgerd` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults that run the server out of the
/// current directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ledgerd",
    version,
    about = "An account ledger served over a Unix domain socket"
)]
pub struct CliArgs {
    /// Path of the Unix domain socket to listen on.
    ///
    /// A stale socket file at this path is removed before binding.
    ///
    /// Environment variable: `SOCKET_PATH`
    #[arg(long, env = "SOCKET_PATH", default_value = "./socket")]
    pub socket_path: PathBuf,

    /// Path of the ledger file. Created empty if it does not exist.
    ///
    /// Environment variable: `LEDGER_PATH`
    #[arg(long, env = "LEDGER_PATH", default_value = "accounts.csv")]
    pub ledger_path: PathBuf,

    /// Append-only audit log, one `[YYYY-MM-DD HH:MM:SS] message` line per
    /// event.
    ///
    /// Environment variable: `LOG_FILE`
    #[arg(long, env = "LOG_FILE", default_value = "server.log")]
    pub log_file: PathBuf,

    /// Number of worker tasks. Each worker owns one pending-connection queue
    /// and serves one connection at a time.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 10)]
    pub num_workers: usize,

    /// Longest accepted request line in bytes, excluding the newline.
    ///
    /// Environment variable: `MAX_REQUEST_LENGTH`
    #[arg(long, env = "MAX_REQUEST_LENGTH", default_value_t = 128)]
    pub max_request_length: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub ledger_path: PathBuf,
    pub log_file: PathBuf,
    pub num_workers: usize,
    pub max_request_length: usize,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.max_request_length == 0 {
            bail!("MAX_REQUEST_LENGTH must be greater than 0");
        }

        Ok(Self {
            socket_path: args.socket_path,
            ledger_path: args.ledger_path,
            log_file: args.log_file,
            num_workers: args.num_workers,
            max_request_length: args.max_request_length,
        })
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::interpreter::DEFAULT_MAX_STEPS;
use crate::server::ServerConfig;
use crate::service::ServiceConfig;

pub const DEFAULT_LOG_FILTER: &str = "minima=info";

#[derive(Debug, Parser)]
#[command(name = "minima", version, about = "Minima language toolchain and execution service")]
pub struct Cli {
    /// Tracing filter directive; `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the JSON HTTP API.
    Serve(ServeArgs),
    /// Print the analysis of a program as JSON.
    Analyze(SourceArgs),
    /// Print the three-address code of a program.
    Tac(SourceArgs),
    /// Run a program, answering `get()` prompts from standard input.
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Program file, or `-` for standard input.
    #[arg(default_value = "-")]
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long, env = "MINIMA_MAX_STEPS", default_value_t = DEFAULT_MAX_STEPS)]
    pub max_steps: usize,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, env = "MINIMA_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// Seconds a suspended execution may stay idle before it is dropped.
    #[arg(
        long,
        env = "MINIMA_EXECUTION_TTL",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub execution_ttl: u64,

    /// Seconds between sweeps of idle executions.
    #[arg(
        long,
        env = "MINIMA_SWEEP_INTERVAL",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sweep_interval: u64,

    #[arg(long, env = "MINIMA_MAX_STEPS", default_value_t = DEFAULT_MAX_STEPS)]
    pub max_steps: usize,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            sweep_interval: Duration::from_secs(self.sweep_interval),
            service: ServiceConfig {
                max_steps: self.max_steps,
                execution_ttl: Duration::from_secs(self.execution_ttl),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_match_the_front_end() {
        let cli = Cli::try_parse_from(["minima", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.server_config();
        assert_eq!(config.bind.to_string(), "127.0.0.1:5000");
        assert_eq!(config.service, ServiceConfig::default());
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(cli.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn rejects_a_zero_ttl() {
        assert!(Cli::try_parse_from(["minima", "serve", "--execution-ttl", "0"]).is_err());
    }

    #[test]
    fn source_defaults_to_stdin() {
        let cli = Cli::try_parse_from(["minima", "run", "--max-steps", "10"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.source.file, PathBuf::from("-"));
        assert_eq!(args.max_steps, 10);
    }
}

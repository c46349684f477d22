use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use minima::config::{Cli, Command, RunArgs};
use minima::interpreter::Execution;
use minima::service::{self, Rejected, Service, ServiceConfig};
use minima::{server, tac};

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))
}

fn report(rejected: &Rejected) {
    for diagnostic in &rejected.diagnostics {
        eprintln!("{}", diagnostic.message);
    }
}

fn compile(source: &str) -> Result<tac::TacProgram> {
    service::compile(source).map_err(|rejected| {
        report(&rejected);
        rejected.into()
    })
}

fn run(args: &RunArgs) -> Result<()> {
    if args.source.file == Path::new("-") {
        bail!("`run` needs a program file; standard input is reserved for get() answers");
    }
    let source = read_source(&args.source.file)?;
    let program = compile(&source)?;
    let mut execution = Execution::new(Arc::new(program), args.max_steps);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut progress = execution.start()?;
    loop {
        for line in &progress.output {
            writeln!(stdout, "{line}")?;
        }
        let Some(prompt) = progress.prompt else {
            break;
        };
        write!(stdout, "{prompt} ")?;
        stdout.flush()?;
        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer)? == 0 {
            bail!("standard input closed while waiting for '{prompt}'");
        }
        progress = execution.resume(answer.trim_end_matches(['\n', '\r']))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_filter);

    match &cli.command {
        Command::Serve(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Starting the async runtime")?;
            runtime.block_on(server::serve(args.server_config()))
        }
        Command::Analyze(args) => {
            let source = read_source(&args.file)?;
            let response = Service::new(ServiceConfig::default()).analyze(&source);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Tac(args) => {
            let source = read_source(&args.file)?;
            let program = compile(&source)?;
            println!("{}", program.format());
            Ok(())
        }
        Command::Run(args) => run(args),
    }
}

//! usdk-target CLI - Manage and repair SDK build containers

use std::process;

use anyhow::Context as _;
use clap::Parser;
use tracing::{debug, Level};

use usdk_target::backend::CancelToken;
use usdk_target::cli::{Args, SubCommand};
use usdk_target::container::ContainerManager;
use usdk_target::engine::{check_ready, Reconciler};
use usdk_target::fixables::FixContext;
use usdk_target::output::{format_output, OutputFormat, Report};
use usdk_target::TargetError;

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        let code = e
            .downcast_ref::<TargetError>()
            .map(TargetError::exit_code)
            .unwrap_or(1);
        process::exit(code);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = args.config();
    debug!(?config, "configuration");

    let cancel = CancelToken::new();
    let token = cancel.clone();
    ctrlc::set_handler(move || token.cancel()).context("Failed to set Ctrl+C handler")?;

    let host = config.host();
    let backend = config.backend();
    let wait = config.wait_options(cancel);
    let format = OutputFormat::from_json_flag(args.json);
    let print = |report: Report| println!("{}", format_output(&report, &format));

    let manager = ContainerManager::new(&backend, &host).with_wait(wait.clone());
    let ctx = FixContext::new(&backend, &host).with_wait(wait);
    let reconciler = Reconciler::default();

    match args.command {
        SubCommand::List => print(Report::Targets(manager.list()?)),

        SubCommand::Exists { name } => {
            if !manager.exists(&name)? {
                return Err(TargetError::ContainerNotFound(name).into());
            }
        }

        SubCommand::Rootfs { name } => print(Report::Rootfs(manager.rootfs(&name))),

        SubCommand::Status { name } => print(Report::Status(manager.status(&name)?)),

        SubCommand::Destroy { name } => {
            manager.destroy(&name)?;
            print(Report::Message(format!("Container {} destroyed", name)));
        }

        SubCommand::Initialized { ignore_bridge } => {
            let bridge = (!ignore_bridge).then_some(config.bridge_file.as_path());
            check_ready(&reconciler, &ctx, bridge)?;
        }

        SubCommand::Autofix | SubCommand::Fix { name: None } => {
            reconciler.fix(&ctx)?;
            print(Report::Message("All build targets are fixed".to_string()));
        }

        SubCommand::Fix { name: Some(name) } => {
            reconciler.fix_container(&ctx, &name)?;
            print(Report::Message(format!("Container {} is fixed", name)));
        }

        SubCommand::Check { name: None } => reconciler.check(&ctx)?,

        SubCommand::Check { name: Some(name) } => reconciler.check_container(&ctx, &name)?,
    }

    Ok(())
}

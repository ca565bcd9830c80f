mod args;
mod generate_schema;
mod generator;
mod log;

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::args::{CliArgs, Command, OutputType};
use crate::generator::ExternalGenerator;

fn main() -> anyhow::Result<()> {
    // Git must fail rather than prompt for credentials, so that nothing
    // interactive ever blocks a render.
    // SAFETY: the runtime has not spawned any thread yet.
    unsafe { std::env::set_var("GIT_TERMINAL_PROMPT", "0") };

    let args = CliArgs::parse();
    log::init(args.verbosity()?);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args))
        .map_err(|e| {
            error!("{:?}", e);
            e
        })?;

    Ok(())
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    match args.command {
        Command::Render(cmd_args) => {
            let output = cmd_args.output;
            let request = cmd_args.into_render_request();
            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                }
            });
            let renderer = kargo_render_core::Renderer::new(ExternalGenerator::new());
            let response = renderer.render(request, &cancel).await?;
            if let Some(output_type) = output {
                print_output(output_type, &response);
            }
        }
        Command::GenerateCompletions(cmd_args) => cmd_args.print(),
        Command::GenerateSchema => generate_schema::generate_schema_to_disk()?,
    }
    Ok(())
}

fn print_output(output_type: OutputType, output: impl Serialize) {
    match output_type {
        OutputType::Json => match serde_json::to_string(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!("can't serialize the render response to json: {e}"),
        },
    }
}

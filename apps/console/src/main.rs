use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{Controller, ControllerEvent, HttpTemplateApi};
use shared::domain::{InstanceId, InstanceStatus, TemplateId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod prompt;
mod render;

use config::load_settings;
use prompt::{parse_param, TerminalPrompt};
use render::{render_instance, render_snapshot, render_template};

#[derive(Parser, Debug)]
#[command(name = "broccoli-console", about = "Watch and manage template instances")]
struct Cli {
    /// Backend base url; overrides the config file and environment.
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print records as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every template and print changes until Ctrl-C.
    Watch {
        /// Show when each template was last polled; reprints after every poll.
        #[arg(long)]
        poll_times: bool,
    },
    Templates,
    Instances {
        template_id: String,
    },
    Create {
        template_id: String,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Submit only the --param values without asking for the rest.
        #[arg(long)]
        no_prompt: bool,
    },
    Delete {
        template_id: String,
        instance_id: String,
    },
    Status {
        instance_id: String,
        status: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(server_url) = cli.server_url {
        settings.base_url = server_url;
    }
    let api = HttpTemplateApi::with_timeout(&settings.base_url, settings.request_timeout())
        .with_context(|| format!("cannot use backend at {}", settings.base_url))?;
    let controller = Controller::new(Arc::new(api), settings.controller_options());

    match cli.command {
        Command::Watch { poll_times } => watch(controller, poll_times).await?,
        Command::Templates => {
            controller.load_templates().await?;
            for view in controller.snapshot().await {
                if cli.json {
                    println!("{}", serde_json::to_string(&view.template)?);
                } else {
                    println!("{}", render_template(&view.template));
                }
            }
        }
        Command::Instances { template_id } => {
            let template_id = TemplateId::new(template_id);
            controller.load_templates().await?;
            controller.poll_once(&template_id).await?;
            let instances = controller.instances(&template_id).await.unwrap_or_default();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&instances)?);
            } else {
                for instance in &instances {
                    println!("{}", render_instance(instance));
                }
            }
        }
        Command::Create {
            template_id,
            params,
            no_prompt,
        } => {
            let template_id = TemplateId::new(template_id);
            controller.load_templates().await?;
            let prompt = TerminalPrompt::new(params.into_iter().collect::<BTreeMap<_, _>>(), !no_prompt);
            match controller.create_instance(&template_id, &prompt).await? {
                Some(instance) if cli.json => {
                    println!("{}", serde_json::to_string_pretty(&instance)?)
                }
                Some(instance) => println!("created {}", render_instance(&instance)),
                None => println!("cancelled"),
            }
        }
        Command::Delete {
            template_id,
            instance_id,
        } => {
            let instance_id = InstanceId::new(instance_id);
            controller
                .delete_instance(&TemplateId::new(template_id), &instance_id)
                .await?;
            println!("deleted {instance_id}");
        }
        Command::Status {
            instance_id,
            status,
        } => {
            let instance = controller
                .submit_status(&InstanceId::new(instance_id), InstanceStatus::from(status))
                .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&instance)?);
            } else {
                println!("{}", render_instance(&instance));
            }
        }
    }

    Ok(())
}

async fn watch(controller: Arc<Controller>, poll_times: bool) -> Result<()> {
    let mut events = controller.subscribe_events();
    let count = controller.start().await;
    info!(count, "watching templates");

    let mut last_rendered = String::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ControllerEvent::Error(message)) => eprintln!("error: {message}"),
                Ok(ControllerEvent::PollerStopped { template_id }) => {
                    info!(template_id = %template_id, "poller stopped");
                }
                Ok(_) => {
                    let rendered = render_snapshot(&controller.snapshot().await, poll_times);
                    if rendered != last_rendered {
                        print!("{rendered}");
                        println!("---");
                        last_rendered = rendered;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    controller.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_shows_poll_times_only_on_request() {
        let cli = Cli::try_parse_from(["broccoli-console", "watch", "--poll-times"]).expect("cli");
        assert!(matches!(cli.command, Command::Watch { poll_times: true }));

        let cli = Cli::try_parse_from(["broccoli-console", "watch"]).expect("cli");
        assert!(matches!(cli.command, Command::Watch { poll_times: false }));
    }

    #[test]
    fn create_collects_repeated_params() {
        let cli = Cli::try_parse_from([
            "broccoli-console",
            "create",
            "jupyter",
            "--param",
            "id=nb",
            "--param",
            "memory=2g",
            "--no-prompt",
        ])
        .expect("cli");
        let Command::Create {
            params, no_prompt, ..
        } = cli.command
        else {
            panic!("expected create");
        };
        assert!(no_prompt);
        assert_eq!(
            params,
            vec![
                ("id".to_string(), "nb".to_string()),
                ("memory".to_string(), "2g".to_string())
            ]
        );
    }
}

//! guestwire: poke at a running guest agent from the host.
//!
//! ```text
//! guestwire ping
//! guestwire eval <expression>
//! guestwire exec <code>
//! guestwire modules
//! guestwire call <dotted.path> [arg ...]
//! guestwire run <command line>
//! ```
//!
//! The agent is located through `GUESTWIRE_SOCKET` and, for vsock sockets,
//! `GUESTWIRE_VSOCK_PORT`. Call arguments that parse as integers are sent as
//! integers, everything else as strings.

use anyhow::{bail, Context};
use guestwire_core::plugins::ProcessPlugin;
use guestwire_core::{Guest, PluginRegistry, RemoteSession, RemoteValue, SessionConfig};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: guestwire <ping|eval|exec|modules|call|run> [args...]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries results.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("guestwire_core=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!(USAGE);
    };

    let config = SessionConfig::from_env();
    config.validate()?;
    let session = RemoteSession::connect(&config)
        .await
        .with_context(|| format!("connecting to {}", config.socket_path.display()))?;

    match command.as_str() {
        "ping" => {
            session.ping().await?;
            println!("pong");
        }
        "eval" => {
            let expression = rest.join(" ");
            println!("{}", session.evaluate(&expression).await?);
        }
        "exec" => session.execute(&rest.join(" ")).await?,
        "modules" => {
            for name in session.modules().await? {
                println!("{name}");
            }
        }
        "call" => {
            let Some((path, call_args)) = rest.split_first() else {
                bail!("usage: guestwire call <dotted.path> [arg ...]");
            };
            let call_args: Vec<RemoteValue> = call_args.iter().map(|a| parse_arg(a)).collect();
            println!("{}", session.invoke(path, &call_args, &[]).await?);
        }
        "run" => {
            let mut plugins = PluginRegistry::new();
            plugins.register(ProcessPlugin::new());
            let guest = Guest::start(session, plugins).await?;
            let output = guest.plugin::<ProcessPlugin>()?.shell(&rest.join(" ")).await;
            guest.close().await;

            let output = output?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            if !output.success() {
                std::process::exit(i32::try_from(output.exit_code).unwrap_or(1));
            }
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
    Ok(())
}

fn parse_arg(arg: &str) -> RemoteValue {
    arg.parse::<i64>()
        .map(RemoteValue::Int)
        .unwrap_or_else(|_| RemoteValue::from(arg))
}

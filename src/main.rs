use anyhow::{Context as _, Result};
use clap::Parser as _;
use event_loop::{event_loop, session::Session};
use resolver::{HostSources, Resolution};

mod args;
mod client;
mod event_loop;
mod output;
mod resolver;
mod state;
#[cfg(test)]
mod testing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = args::Args::parse();
    args.init_tracing_subscriber()?;

    let sources = HostSources::from_env(args.host.clone());
    let resolution = resolver::resolve(&sources, args.discovery_timeout())
        .await
        .context("Failed to look for a Volumio player")?;
    let session = match resolution {
        Resolution::Configured(address) | Resolution::Discovered(address) => Session::new(address),
        Resolution::NotFound => {
            tracing::warn!("Discovery found no player");
            Session::without_target("No Volumio player found on the local network. Enter its address.")
        }
    };

    let mut terminal = output::Terminal::enter()?;
    let session = event_loop(
        session,
        output::key_stream(),
        args.refresh_interval(),
        |session| terminal.render(session),
    )
    .await?;
    drop(terminal);
    tracing::info!(
        address = session.target_address(),
        connected = session.connected(),
        quit = session.quitting(),
        "Remote closed"
    );
    Ok(())
}

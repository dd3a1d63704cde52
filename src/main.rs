//! Binary entry point for the exomachine CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use exomachine::paths::absolutize;
use exomachine::{
    ConfigError, Driver, DriverError, ExoscaleClient, ExoscaleConfig, MachineDriver, StateStore,
    StateStoreError,
};

mod cli;

use cli::{Cli, Command};

const DEFAULT_STORE_ROOT: &str = "~/.exomachine/machines";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid store path `{path}`: {message}")]
    StorePath { path: String, message: String },
    #[error("state error: {0}")]
    State(#[from] StateStoreError),
    #[error("{0}")]
    Driver(#[from] DriverError),
    #[error("failed to write output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let store_path = resolve_store_path(&cli.name, cli.store_path.as_deref())?;
    let store = StateStore::new(store_path.clone());
    let config = ExoscaleConfig::load_without_cli_args()?.as_driver_config(&cli.name, store_path)?;
    let api = ExoscaleClient::from_config(&config);
    let mut driver = Driver::new(config, api).with_state(store.load()?);

    let result = run(&mut driver, cli.command).await;
    if mutates_state(cli.command) {
        store.save(driver.state())?;
    }
    let output = result?;
    if let Some(line) = output {
        writeln!(io::stdout(), "{line}").map_err(|err| CliError::Output(err.to_string()))?;
    }
    Ok(())
}

async fn run(
    driver: &mut impl MachineDriver,
    command: Command,
) -> Result<Option<String>, DriverError> {
    match command {
        Command::Create => driver.create().await.map(|()| None),
        Command::Start => driver.start().await.map(|()| None),
        Command::Stop => driver.stop().await.map(|()| None),
        Command::Restart => driver.restart().await.map(|()| None),
        Command::Kill => driver.kill().await.map(|()| None),
        Command::Remove => driver.remove().await.map(|()| None),
        Command::State => Ok(Some(driver.machine_state().await?.to_string())),
        Command::Url => driver.url().await.map(Some),
        Command::SshHostname => driver.ssh_hostname().map(Some),
        Command::SshUsername => Ok(Some(driver.ssh_username())),
    }
}

const fn mutates_state(command: Command) -> bool {
    matches!(command, Command::Create | Command::Remove)
}

fn resolve_store_path(name: &str, store_path: Option<&str>) -> Result<Utf8PathBuf, CliError> {
    let raw = store_path.map_or_else(
        || format!("{DEFAULT_STORE_ROOT}/{name}"),
        str::to_owned,
    );
    absolutize(&raw).map_err(|message| CliError::StorePath { path: raw, message })
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

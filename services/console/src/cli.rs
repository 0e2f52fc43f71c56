use crate::infra::Console;
use crate::server;
use clap::{Args, Parser, Subcommand};
use device_wizard::config::AppConfig;
use device_wizard::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Device Wizard",
    about = "Register devices in a FIWARE platform and provision their MQTT credentials",
    version
)]
struct Cli {
    /// Platform configuration file (overrides DEVICE_WIZARD_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the web console (default command)
    Serve(ServeArgs),
    /// Print broker and agent versions and the identity service state
    Status,
    /// List the device and IoT device types found in the data model
    Types,
    /// Register an IoT agent service group for a device type
    ProvisionService(ProvisionArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
struct ProvisionArgs {
    /// API key devices of this type report with
    #[arg(long)]
    api_key: String,
    /// Device type the service group resolves to
    #[arg(long)]
    device_type: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    if let Some(path) = cli.config {
        config = config.with_platform_file(path)?;
    }

    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(config, args).await,
        Command::Status => status(&config).await,
        Command::Types => types(&config),
        Command::ProvisionService(args) => provision_service(&config, args).await,
    }
}

async fn status(config: &AppConfig) -> Result<(), AppError> {
    let console = Console::from_platform(&config.platform)?;
    let (orion, agent, idm) = tokio::join!(
        console.orion.version(),
        console.iotagent.version(),
        console.idm.is_active()
    );

    println!(
        "Orion LD   {:<40} {}",
        console.orion.url(),
        orion.as_deref().unwrap_or("unreachable")
    );
    println!(
        "IoT Agent  {:<40} {}",
        console.iotagent.url(),
        agent.as_deref().unwrap_or("unreachable")
    );
    println!(
        "Keycloak   {:<40} {}",
        console.idm.server(),
        if idm { "active" } else { "unreachable" }
    );
    Ok(())
}

fn types(config: &AppConfig) -> Result<(), AppError> {
    let datamodel = device_wizard::datamodel::Datamodel::load(&config.platform.datamodel)?;

    println!("Device types:");
    for key in datamodel.device_types() {
        println!("  {key}");
    }
    println!("IoT device types:");
    for key in datamodel.iotdevice_types() {
        println!("  {key}");
    }
    println!("Classes:");
    for class in datamodel.classes() {
        println!("  {class}");
    }
    Ok(())
}

async fn provision_service(config: &AppConfig, args: ProvisionArgs) -> Result<(), AppError> {
    let agent = device_wizard::fiware::IotAgentClient::new(&config.platform.fiware)?;
    agent.create_service(&args.api_key, &args.device_type).await?;
    println!(
        "Service group for '{}' registered with entity type {}",
        args.device_type,
        device_wizard::fiware::entity_type_hash(&args.device_type)
    );
    Ok(())
}

//! Binary entry point for the Elestio CLI.

use std::io::{self, Write};
use std::process;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use elestio::catalog::{SizeCatalog, TemplateCatalog, filter_sizes, search_templates};
use elestio::output::Presenter;
use elestio::poller::{DeploymentPoller, StatusChange, WaitError};
use elestio::resize::ResizeError;
use elestio::services::{
    DeployError, DeployOptions, PowerAction, ResizeRequest, default_project, deploy_service,
    list_projects, list_services, power_action, resize_service, service_details,
};
use elestio::store::{Credential, FileStore, StoreError};
use elestio::{ApiClient, ApiError, ConfigError, ElestioConfig, HttpTransport, SessionManager};

mod cli;

use cli::{
    ActionCommand, Cli, Command, DeployCommand, LoginCommand, ResizeCommand, SizesCommand,
    TargetArgs, TemplatesCommand, WaitCommand,
};

const LOG_ENV: &str = "ELESTIO_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("state directory error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Resize(#[from] ResizeError),
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

type Client = ApiClient<FileStore>;

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
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn connect(config: &ElestioConfig) -> Result<Client, CliError> {
    let transport = HttpTransport::new(config.base_url.clone(), config.http_timeout())?;
    let store = config.file_store()?;
    let session = SessionManager::new(store, transport.clone());
    Ok(ApiClient::new(transport, session))
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = ElestioConfig::load_without_cli_args()?;
    config.validate()?;
    let client = connect(&config)?;
    let mut out = Presenter::new(io::stdout().lock(), cli.json);

    match cli.command {
        Command::Login(args) => login(&client, &mut out, args).await,
        Command::Whoami => {
            let status = client.session().status().await?;
            out.session_status(&status)?;
            Ok(())
        }
        Command::AuthTest => {
            client.session().refresh().await?;
            out.message("Authentication succeeded")?;
            Ok(())
        }
        Command::Projects => {
            let projects = list_projects(&client).await?;
            out.projects(&projects)?;
            Ok(())
        }
        Command::Services(args) => {
            let project = resolve_project(&client, &config, args.project.as_deref()).await?;
            let services = list_services(&client, &project).await?;
            out.services(&project, &services)?;
            Ok(())
        }
        Command::Service(args) => show_service(&client, &config, &mut out, &args).await,
        Command::Deploy(args) => deploy(&client, &config, &mut out, args).await,
        Command::Wait(args) => wait(&client, &config, &mut out, &args).await,
        Command::Resize(args) => resize(&client, &config, &mut out, args).await,
        Command::Action(args) => action(&client, &config, &mut out, &args).await,
        Command::Sizes(args) => sizes(&client, &mut out, &args).await,
        Command::Templates(args) => templates(&client, &mut out, &args).await,
    }
}

async fn resolve_project(
    client: &Client,
    config: &ElestioConfig,
    requested: Option<&str>,
) -> Result<String, CliError> {
    let configured = requested.or(config.default_project.as_deref());
    Ok(default_project(client, configured).await?)
}

async fn login(
    client: &Client,
    out: &mut Presenter<impl Write>,
    args: LoginCommand,
) -> Result<(), CliError> {
    let status = client
        .session()
        .login(Credential::new(args.email, args.token))
        .await?;
    out.session_status(&status)?;
    Ok(())
}

async fn show_service(
    client: &Client,
    config: &ElestioConfig,
    out: &mut Presenter<impl Write>,
    args: &TargetArgs,
) -> Result<(), CliError> {
    let project = resolve_project(client, config, args.project.as_deref()).await?;
    let service = service_details(client, &args.vm_id, &project).await?;
    out.service(&service)?;
    Ok(())
}

async fn deploy(
    client: &Client,
    config: &ElestioConfig,
    out: &mut Presenter<impl Write>,
    args: DeployCommand,
) -> Result<(), CliError> {
    let project_id = resolve_project(client, config, args.project.as_deref()).await?;
    let options = DeployOptions {
        template: args.template,
        project_id,
        name: args.name,
        size: args.size,
        region: args.region,
        provider: args.provider,
        support: args.support,
        admin_email: args.admin_email,
        version: args.version,
        pipeline_name: args.pipeline_name,
        dry_run: args.dry_run,
        wait: !args.no_wait,
        timeout: args.timeout.map(Duration::from_secs),
    };
    let outcome = deploy_service(client, config, &options, report_progress).await?;
    out.deployment(&outcome)?;
    Ok(())
}

async fn wait(
    client: &Client,
    config: &ElestioConfig,
    out: &mut Presenter<impl Write>,
    args: &WaitCommand,
) -> Result<(), CliError> {
    let project = resolve_project(client, config, args.target.project.as_deref()).await?;
    let timeout = args
        .timeout
        .map_or_else(|| config.deploy_timeout(), Duration::from_secs);
    let poller = DeploymentPoller::new(client, client.clock(), project)
        .with_poll_interval(config.poll_interval())
        .with_not_found_interval(config.not_found_interval());
    let service = poller
        .wait_for(&args.target.vm_id, timeout, report_progress)
        .await?;
    out.service(&service)?;
    Ok(())
}

fn report_progress(change: &StatusChange) {
    info!(
        resource_id = %change.resource_id,
        status = change.status.as_deref().unwrap_or("unknown"),
        elapsed_secs = change.elapsed.as_secs(),
        "deployment status changed"
    );
    writeln!(
        io::stderr(),
        "[{}s] {}",
        change.elapsed.as_secs(),
        change.status.as_deref().unwrap_or("unknown")
    )
    .ok();
}

async fn resize(
    client: &Client,
    config: &ElestioConfig,
    out: &mut Presenter<impl Write>,
    args: ResizeCommand,
) -> Result<(), CliError> {
    let project_id = resolve_project(client, config, args.target.project.as_deref()).await?;
    let request = ResizeRequest {
        vm_id: args.target.vm_id,
        size: args.size,
        project_id,
        fallback_provider: config.default_provider.clone(),
        fallback_region: config.default_datacenter.clone(),
        cpu_ram_only: !args.include_disk,
    };
    let outcome = resize_service(client, &request).await?;
    out.resize(&request.vm_id, &outcome)?;
    Ok(())
}

async fn action(
    client: &Client,
    config: &ElestioConfig,
    out: &mut Presenter<impl Write>,
    args: &ActionCommand,
) -> Result<(), CliError> {
    let power = parse_action(&args.action)?;
    let project = resolve_project(client, config, args.target.project.as_deref()).await?;
    let response = power_action(client, &args.target.vm_id, &project, power).await?;
    if out.is_json() {
        out.raw(&response)?;
    } else {
        out.message(&format!(
            "Action {power} accepted for service {}",
            args.target.vm_id
        ))?;
    }
    Ok(())
}

fn parse_action(name: &str) -> Result<PowerAction, CliError> {
    PowerAction::from_str(name).map_err(CliError::InvalidArgument)
}

async fn sizes(
    client: &Client,
    out: &mut Presenter<impl Write>,
    args: &SizesCommand,
) -> Result<(), CliError> {
    let catalog = client.sizes().await?;
    let matching = filter_sizes(&catalog, args.provider.as_deref(), args.country.as_deref());
    out.sizes(&matching)?;
    Ok(())
}

async fn templates(
    client: &Client,
    out: &mut Presenter<impl Write>,
    args: &TemplatesCommand,
) -> Result<(), CliError> {
    let catalog = client.templates().await?;
    let matching = search_templates(&catalog, args.search.as_deref(), args.category.as_deref());
    out.templates(&matching)?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "Error: {err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("reboot", PowerAction::Reboot)]
    #[case("POWEROFF", PowerAction::PowerOff)]
    fn parse_action_accepts_known_names(#[case] name: &str, #[case] expected: PowerAction) {
        let parsed = parse_action(name).unwrap_or_else(|err| panic!("parse {name}: {err}"));
        assert_eq!(parsed, expected);
    }

    #[rstest]
    fn parse_action_rejects_unknown_names() {
        let Err(err) = parse_action("explode") else {
            panic!("unknown action should be rejected");
        };
        assert!(matches!(err, CliError::InvalidArgument(_)), "{err:?}");
    }

    #[rstest]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["elestio", "services", "--json", "--project", "7"])
            .unwrap_or_else(|err| panic!("parse: {err}"));
        assert!(cli.json);
        let Command::Services(args) = cli.command else {
            panic!("expected services command");
        };
        assert_eq!(args.project.as_deref(), Some("7"));
    }

    #[rstest]
    fn action_takes_positional_target_and_name() {
        let cli = Cli::try_parse_from(["elestio", "action", "42", "reboot"])
            .unwrap_or_else(|err| panic!("parse: {err}"));
        let Command::Action(args) = cli.command else {
            panic!("expected action command");
        };
        assert_eq!(args.target.vm_id, "42");
        assert_eq!(args.action, "reboot");
    }

    #[rstest]
    fn write_error_prefixes_the_message() {
        let mut buf = Vec::new();
        let error = CliError::InvalidArgument(String::from("unknown action"));
        write_error(&mut buf, &error);
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert_eq!(rendered, "Error: invalid argument: unknown action\n");
    }
}

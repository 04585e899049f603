//! Command-line interface definitions for the `elestio` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `elestio` binary.
#[derive(Debug, Parser)]
#[command(
    name = "elestio",
    about = "Deploy and manage Elestio services from the command line",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub(crate) json: bool,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of the `elestio` binary.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Verify an API token and store it for later runs.
    #[command(name = "login", about = "Verify an API token and store it for later runs")]
    Login(LoginCommand),
    /// Show the configured identity and session state.
    #[command(name = "whoami", about = "Show the configured identity and session state")]
    Whoami,
    /// Force a fresh authentication with the stored credential.
    #[command(
        name = "auth-test",
        about = "Force a fresh authentication with the stored credential"
    )]
    AuthTest,
    /// List the projects visible to the account.
    #[command(name = "projects", about = "List the projects visible to the account")]
    Projects,
    /// List services in a project.
    #[command(name = "services", about = "List services in a project")]
    Services(ProjectArgs),
    /// Show one service.
    #[command(name = "service", about = "Show one service")]
    Service(TargetArgs),
    /// Deploy a template as a new service.
    #[command(name = "deploy", about = "Deploy a template as a new service")]
    Deploy(DeployCommand),
    /// Wait for a service to finish deploying.
    #[command(name = "wait", about = "Wait for a service to finish deploying")]
    Wait(WaitCommand),
    /// Change the size of a service.
    #[command(name = "resize", about = "Change the size of a service")]
    Resize(ResizeCommand),
    /// Run a power or maintenance action on a service.
    #[command(name = "action", about = "Run a power or maintenance action on a service")]
    Action(ActionCommand),
    /// List server sizes.
    #[command(name = "sizes", about = "List server sizes")]
    Sizes(SizesCommand),
    /// List deployable templates.
    #[command(name = "templates", about = "List deployable templates")]
    Templates(TemplatesCommand),
}

/// Arguments for `elestio login`.
#[derive(Debug, Parser)]
pub(crate) struct LoginCommand {
    /// Account e-mail address.
    #[arg(long, value_name = "EMAIL")]
    pub(crate) email: String,
    /// API token generated in the Elestio dashboard.
    #[arg(long, value_name = "TOKEN", env = "ELESTIO_API_TOKEN", hide_env_values = true)]
    pub(crate) token: String,
}

/// Project selection shared by service commands.
#[derive(Debug, Parser)]
pub(crate) struct ProjectArgs {
    /// Project to operate on; defaults to the configured project.
    #[arg(long, value_name = "ID")]
    pub(crate) project: Option<String>,
}

/// A single service within a project.
#[derive(Debug, Parser)]
pub(crate) struct TargetArgs {
    /// Service vmID or provider server ID.
    #[arg(value_name = "VM_ID")]
    pub(crate) vm_id: String,
    /// Project to operate on; defaults to the configured project.
    #[arg(long, value_name = "ID")]
    pub(crate) project: Option<String>,
}

/// Arguments for `elestio deploy`.
#[derive(Debug, Parser)]
pub(crate) struct DeployCommand {
    /// Template ID, alias, or name.
    #[arg(value_name = "TEMPLATE")]
    pub(crate) template: String,
    /// Target project; defaults to the configured project.
    #[arg(long, value_name = "ID")]
    pub(crate) project: Option<String>,
    /// Server name; generated from the template when omitted.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Server size title, such as `MEDIUM-2C-4G`.
    #[arg(long, value_name = "SIZE")]
    pub(crate) size: Option<String>,
    /// Datacenter identifier.
    #[arg(long, value_name = "REGION")]
    pub(crate) region: Option<String>,
    /// Hosting provider.
    #[arg(long, value_name = "PROVIDER")]
    pub(crate) provider: Option<String>,
    /// Support plan.
    #[arg(long, value_name = "LEVEL")]
    pub(crate) support: Option<String>,
    /// Administrator e-mail; defaults to the login identity.
    #[arg(long, value_name = "EMAIL")]
    pub(crate) admin_email: Option<String>,
    /// Software version; defaults to the template's default tag.
    #[arg(long = "software-version", value_name = "VERSION")]
    pub(crate) version: Option<String>,
    /// Pipeline name for CI/CD targets.
    #[arg(long, value_name = "NAME")]
    pub(crate) pipeline_name: Option<String>,
    /// Print the resolved request without creating anything.
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Return as soon as the deployment is accepted.
    #[arg(long)]
    pub(crate) no_wait: bool,
    /// Seconds to wait for the deployment to complete.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) timeout: Option<u64>,
}

/// Arguments for `elestio wait`.
#[derive(Debug, Parser)]
pub(crate) struct WaitCommand {
    /// Service to watch.
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Seconds to wait before giving up.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) timeout: Option<u64>,
}

/// Arguments for `elestio resize`.
#[derive(Debug, Parser)]
pub(crate) struct ResizeCommand {
    /// Service to resize.
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// New size title; shorthand such as `4C-8G` is auto-corrected.
    #[arg(long, value_name = "SIZE")]
    pub(crate) size: String,
    /// Resize the disk as well as CPU and RAM.
    #[arg(long)]
    pub(crate) include_disk: bool,
}

/// Arguments for `elestio action`.
#[derive(Debug, Parser)]
pub(crate) struct ActionCommand {
    /// Service to act on.
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Action name, such as `reboot` or `poweroff`.
    #[arg(value_name = "ACTION")]
    pub(crate) action: String,
}

/// Arguments for `elestio sizes`.
#[derive(Debug, Parser)]
pub(crate) struct SizesCommand {
    /// Only show sizes offered by this provider.
    #[arg(long, value_name = "PROVIDER")]
    pub(crate) provider: Option<String>,
    /// Only show sizes located in this country.
    #[arg(long, value_name = "COUNTRY")]
    pub(crate) country: Option<String>,
}

/// Arguments for `elestio templates`.
#[derive(Debug, Parser)]
pub(crate) struct TemplatesCommand {
    /// Case-insensitive text to search for.
    #[arg(long, value_name = "TEXT")]
    pub(crate) search: Option<String>,
    /// Only show templates in this category.
    #[arg(long, value_name = "CATEGORY")]
    pub(crate) category: Option<String>,
}

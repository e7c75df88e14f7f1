//! Command-line interface
//!
//! Thin adapter over the renderer: flags map onto build parameters, the
//! rendered document is printed as JSON. Network submission is a separate
//! concern and not part of this tool.

use crate::config::BuildforgeConfig;
use crate::request::BuildManager;
use crate::store::FsTemplateStore;
use crate::utils::PlatformVersion;
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

/// Build request renderer for container-image build orchestration
#[derive(Parser, Debug)]
#[command(
    name = "buildforge",
    about = "Build request renderer for container-image build orchestration",
    version,
    author
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Render a build request document",
        long_about = "Renders the build parameters into the outer and inner templates for \
                      the chosen build type and prints the resulting document.\n\n\
                      Examples:\n  \
                      buildforge render --build-type simple --git-url https://example.com/spam.git \\\n      \
                      --user john --component spam --registry-uri registry.example.com \\\n      \
                      --orchestrator-url https://orchestrator.example.com/"
    )]
    Render(RenderArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RenderArgs {
    #[arg(long, default_value = "prod", help = "Build type (prod|simple)")]
    pub build_type: String,

    #[arg(long, value_name = "DIR", help = "Directory with build templates")]
    pub template_dir: Option<PathBuf>,

    #[arg(long, value_name = "URL", help = "URL of the source git repository")]
    pub git_url: Option<String>,

    #[arg(long, value_name = "REF", help = "Git tree to build")]
    pub git_ref: Option<String>,

    #[arg(long, value_name = "BRANCH", help = "Git branch the build tracks")]
    pub git_branch: Option<String>,

    #[arg(long, help = "User part of the resulting image name")]
    pub user: Option<String>,

    #[arg(long, help = "Component part of the image name")]
    pub component: Option<String>,

    #[arg(long, value_name = "URI", help = "Registry the built image is pushed to")]
    pub registry_uri: Option<String>,

    #[arg(long, value_name = "URL", help = "URL of the build orchestrator")]
    pub orchestrator_url: Option<String>,

    #[arg(long, value_name = "IMAGE", help = "Base image the build starts from")]
    pub base_image: Option<String>,

    #[arg(long, value_name = "LABEL", help = "Name label of the resulting image")]
    pub name_label: Option<String>,

    #[arg(long, value_name = "CMD", help = "Command used to fetch dist-git sources")]
    pub sources_command: Option<String>,

    #[arg(long, help = "Architecture the image is built for")]
    pub architecture: Option<String>,

    #[arg(long, help = "Vendor name label")]
    pub vendor: Option<String>,

    #[arg(long, help = "Host the build runs on")]
    pub build_host: Option<String>,

    #[arg(long, value_name = "URI", help = "Registry authoritative for this image")]
    pub authoritative_registry: Option<String>,

    #[arg(long, help = "Koji tag with packages used to build the image")]
    pub koji_target: Option<String>,

    #[arg(long, value_name = "URL", help = "URL koji packages are fetched from")]
    pub koji_root: Option<String>,

    #[arg(long, value_name = "URL", help = "URL of the koji hub")]
    pub koji_hub: Option<String>,

    #[arg(long, help = "Resource name of the pulp push secret")]
    pub pulp_secret: Option<String>,

    #[arg(long, help = "Name of the pulp registry")]
    pub pulp_registry: Option<String>,

    #[arg(long, help = "Resource name of the delivery-notification secret")]
    pub pdc_secret: Option<String>,

    #[arg(long, value_name = "SERVER:PATH", help = "NFS server and path")]
    pub nfs_server_path: Option<String>,

    #[arg(long, value_name = "DIR", help = "Directory to create on the NFS server")]
    pub nfs_dest_dir: Option<String>,

    #[arg(long, value_name = "URL", help = "URL for git push")]
    pub git_push_url: Option<String>,

    #[arg(long, help = "Username injected into the git push URL")]
    pub git_push_username: Option<String>,

    #[arg(long, value_name = "URL", help = "Yum repo file URL (repeatable)")]
    pub yum_repourls: Vec<String>,

    #[arg(long, value_name = "BOOL", help = "Pass orchestrator auth to reporting stages")]
    pub use_auth: Option<bool>,

    #[arg(long, value_name = "VERSION", help = "Minimum platform version, e.g. 1.0.6")]
    pub required_platform_version: Option<String>,

    #[arg(long, value_name = "CPU", help = "CPU limit for the build")]
    pub cpu_limit: Option<String>,

    #[arg(long, value_name = "MEM", help = "Memory limit for the build")]
    pub memory_limit: Option<String>,

    #[arg(long, value_name = "STORAGE", help = "Storage limit for the build")]
    pub storage_limit: Option<String>,

    #[arg(long, help = "Skip parameter validation before rendering")]
    pub no_validate: bool,
}

impl RenderArgs {
    /// Build the parameter mapping, filling unset flags from configuration.
    fn params(&self, config: &BuildforgeConfig) -> Map<String, Value> {
        let mut params = Map::new();

        let mut put = |name: &str, value: Option<&String>| {
            if let Some(value) = value {
                params.insert(name.to_string(), Value::String(value.clone()));
            }
        };

        put("git_uri", self.git_url.as_ref());
        put("git_ref", self.git_ref.as_ref());
        put("git_branch", self.git_branch.as_ref());
        put("user", self.user.as_ref());
        put("component", self.component.as_ref());
        put(
            "registry_uri",
            self.registry_uri.as_ref().or(config.registry_uri.as_ref()),
        );
        put(
            "orchestrator_url",
            self.orchestrator_url
                .as_ref()
                .or(config.orchestrator_url.as_ref()),
        );
        put("base_image", self.base_image.as_ref());
        put("name_label", self.name_label.as_ref());
        put("sources_command", self.sources_command.as_ref());
        put("architecture", self.architecture.as_ref());
        put("vendor", self.vendor.as_ref());
        put("build_host", self.build_host.as_ref());
        put(
            "authoritative_registry",
            self.authoritative_registry.as_ref(),
        );
        put("koji_target", self.koji_target.as_ref());
        put("koji_root", self.koji_root.as_ref());
        put("koji_hub", self.koji_hub.as_ref());
        put("pulp_secret", self.pulp_secret.as_ref());
        put("pulp_registry", self.pulp_registry.as_ref());
        put("pdc_secret", self.pdc_secret.as_ref());
        put("nfs_server_path", self.nfs_server_path.as_ref());
        put("nfs_dest_dir", self.nfs_dest_dir.as_ref());
        put("git_push_url", self.git_push_url.as_ref());
        put("git_push_username", self.git_push_username.as_ref());

        if !self.yum_repourls.is_empty() {
            params.insert(
                "yum_repourls".to_string(),
                Value::Array(
                    self.yum_repourls
                        .iter()
                        .map(|u| Value::String(u.clone()))
                        .collect(),
                ),
            );
        }
        if let Some(use_auth) = self.use_auth.or(config.use_auth) {
            params.insert("use_auth".to_string(), Value::Bool(use_auth));
        }

        params
    }
}

/// Run the `render` subcommand. Returns the process exit code.
pub fn handle_render(args: &RenderArgs) -> i32 {
    match run_render(args) {
        Ok(rendered) => {
            println!("{:#}", rendered);
            0
        }
        Err(err) => {
            error!("render failed: {:#}", err);
            eprintln!("Error: {:#}", err);
            1
        }
    }
}

fn run_render(args: &RenderArgs) -> Result<Value> {
    let config = BuildforgeConfig::default();
    config.validate()?;

    let template_dir = args
        .template_dir
        .clone()
        .unwrap_or_else(|| config.template_dir.clone());
    let store = Arc::new(FsTemplateStore::new(template_dir));
    let manager = BuildManager::new(store);

    let mut request = manager.build_request(&args.build_type)?;
    request.set_params(&args.params(&config))?;

    if args.cpu_limit.is_some() || args.memory_limit.is_some() || args.storage_limit.is_some() {
        request.set_resource_limits(
            args.cpu_limit.as_deref(),
            args.memory_limit.as_deref(),
            args.storage_limit.as_deref(),
        );
    }

    let version = match &args.required_platform_version {
        Some(raw) => raw.parse::<PlatformVersion>()?,
        None => config.required_platform_version,
    };
    request.set_required_platform_version(version);

    Ok(request.render(!args.no_validate)?)
}

use clap::{ArgMatches, Args, Command, FromArgMatches, builder::RangedU64ValueParser};
use gimmecert_certs::{
    ca::{CertificateAuthorityHierarchy, DEFAULT_CA_HIERARCHY_DEPTH},
    keys::KeySpecification,
};
use snafu::ResultExt;
use tracing::instrument;

use super::{CommandHandler, Context};
use crate::error::{CreateHierarchySnafu, ParseArgumentsSnafu, Result};

#[derive(Debug, Args)]
struct InitArguments {
    /// Base name of the CA subjects, defaults to the name of the project
    /// directory.
    #[arg(short = 'b', long, value_name = "NAME")]
    ca_base_name: Option<String>,

    /// Number of CAs in the hierarchy. Level 1 is the self-signed root, the
    /// last level issues all server and client certificates.
    #[arg(
        short = 'd',
        long,
        value_name = "DEPTH",
        default_value_t = DEFAULT_CA_HIERARCHY_DEPTH,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    ca_hierarchy_depth: usize,

    /// Key specification of the CA keys, `rsa:<bits>` or `ecdsa:<curve>`.
    #[arg(short = 'k', long, value_name = "SPEC", default_value = "rsa:2048")]
    key_specification: KeySpecification,
}

/// Creates the CA hierarchy of a project.
#[derive(Debug)]
pub struct InitCommand;

impl CommandHandler for InitCommand {
    fn name(&self) -> &'static str {
        "init"
    }

    fn command(&self) -> Command {
        InitArguments::augment_args(
            Command::new(self.name()).about("Initialise the CA hierarchy of the project"),
        )
    }

    #[instrument(skip_all)]
    fn run(&self, matches: &ArgMatches, context: &mut Context<'_>) -> Result<()> {
        let arguments = InitArguments::from_arg_matches(matches).context(ParseArgumentsSnafu)?;
        context.project.ensure_uninitialized()?;

        let base_name = arguments
            .ca_base_name
            .unwrap_or_else(|| context.project.name().to_owned());
        let hierarchy = CertificateAuthorityHierarchy::builder()
            .base_name(&base_name)
            .depth(arguments.ca_hierarchy_depth)
            .key_specification(arguments.key_specification)
            .build()
            .context(CreateHierarchySnafu)?;

        let artifacts = context.project.save_hierarchy(&hierarchy)?;
        context.report("CA hierarchy initialised using the following artifacts:", &artifacts)
    }
}

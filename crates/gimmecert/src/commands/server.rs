use clap::{ArgMatches, Args, Command, FromArgMatches};
use gimmecert_certs::{keys::KeySpecification, leaf::EntityKind, reconcile};
use snafu::ResultExt;
use tracing::instrument;

use super::{CommandHandler, Context};
use crate::{
    csr_input::CsrSource,
    layout,
    error::{IssueSnafu, ParseArgumentsSnafu, Result},
};

#[derive(Debug, Args)]
struct ServerArguments {
    /// Name of the server, also the first DNS subject alternative name.
    #[arg(value_name = "NAME", value_parser = layout::parse_entity_name)]
    entity_name: String,

    /// Additional DNS subject alternative names.
    #[arg(value_name = "DNS_NAME")]
    dns_names: Vec<String>,

    /// Issue the certificate for the public key of this CSR instead of
    /// generating a private key. `-` reads the CSR from standard input.
    #[arg(short = 'c', long, value_name = "PATH|-", conflicts_with = "key_specification")]
    csr: Option<CsrSource>,

    /// Key specification of the generated private key, defaults to the one
    /// of the issuing CA.
    #[arg(short = 'k', long, value_name = "SPEC")]
    key_specification: Option<KeySpecification>,
}

/// Issues a server certificate.
#[derive(Debug)]
pub struct ServerCommand;

impl CommandHandler for ServerCommand {
    fn name(&self) -> &'static str {
        "server"
    }

    fn command(&self) -> Command {
        ServerArguments::augment_args(
            Command::new(self.name()).about("Issue a server certificate"),
        )
    }

    #[instrument(skip_all)]
    fn run(&self, matches: &ArgMatches, context: &mut Context<'_>) -> Result<()> {
        let arguments = ServerArguments::from_arg_matches(matches).context(ParseArgumentsSnafu)?;
        let hierarchy = context.project.load_hierarchy()?;
        context
            .project
            .ensure_not_issued(EntityKind::Server, &arguments.entity_name)?;

        let intent =
            context.issuance_intent(arguments.csr.as_ref(), arguments.key_specification)?;
        let issuance = reconcile::issue_server(
            &arguments.entity_name,
            &arguments.dns_names,
            intent,
            hierarchy.issuing_ca(),
        )
        .context(IssueSnafu {
            entity_kind: EntityKind::Server,
        })?;

        let artifacts =
            context
                .project
                .save_issuance(EntityKind::Server, &arguments.entity_name, &issuance)?;
        context.report(
            &format!(
                "Server certificate issued for {name:?} using the following artifacts:",
                name = arguments.entity_name
            ),
            &artifacts,
        )
    }
}

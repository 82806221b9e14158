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
struct ClientArguments {
    /// Name of the client, used as the common name of the subject.
    #[arg(value_name = "NAME", value_parser = layout::parse_entity_name)]
    entity_name: String,

    /// Issue the certificate for the public key of this CSR instead of
    /// generating a private key. `-` reads the CSR from standard input.
    #[arg(short = 'c', long, value_name = "PATH|-", conflicts_with = "key_specification")]
    csr: Option<CsrSource>,

    /// Key specification of the generated private key, defaults to the one
    /// of the issuing CA.
    #[arg(short = 'k', long, value_name = "SPEC")]
    key_specification: Option<KeySpecification>,
}

/// Issues a client certificate.
#[derive(Debug)]
pub struct ClientCommand;

impl CommandHandler for ClientCommand {
    fn name(&self) -> &'static str {
        "client"
    }

    fn command(&self) -> Command {
        ClientArguments::augment_args(
            Command::new(self.name()).about("Issue a client certificate"),
        )
    }

    #[instrument(skip_all)]
    fn run(&self, matches: &ArgMatches, context: &mut Context<'_>) -> Result<()> {
        let arguments = ClientArguments::from_arg_matches(matches).context(ParseArgumentsSnafu)?;
        let hierarchy = context.project.load_hierarchy()?;
        context
            .project
            .ensure_not_issued(EntityKind::Client, &arguments.entity_name)?;

        let intent =
            context.issuance_intent(arguments.csr.as_ref(), arguments.key_specification)?;
        let issuance =
            reconcile::issue_client(&arguments.entity_name, intent, hierarchy.issuing_ca())
                .context(IssueSnafu {
                    entity_kind: EntityKind::Client,
                })?;

        let artifacts =
            context
                .project
                .save_issuance(EntityKind::Client, &arguments.entity_name, &issuance)?;
        context.report(
            &format!(
                "Client certificate issued for {name:?} using the following artifacts:",
                name = arguments.entity_name
            ),
            &artifacts,
        )
    }
}

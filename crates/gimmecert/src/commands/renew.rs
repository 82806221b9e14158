use clap::{ArgMatches, Args, Command, FromArgMatches};
use gimmecert_certs::{
    keys::KeySpecification,
    leaf::EntityKind,
    reconcile::{self, RenewalOptions},
};
use snafu::ResultExt;
use tracing::instrument;

use super::{CommandHandler, Context};
use crate::{
    csr_input::CsrSource,
    layout,
    error::{ConflictingRenewalOptionsSnafu, ParseArgumentsSnafu, RenewSnafu, Result},
};

#[derive(Debug, Args)]
struct RenewArguments {
    /// Kind of the entity to renew.
    #[arg(value_name = "server|client")]
    entity_kind: EntityKind,

    /// Name of the entity to renew.
    #[arg(value_name = "NAME", value_parser = layout::parse_entity_name)]
    entity_name: String,

    /// Replace the key material with a freshly generated private key.
    #[arg(short = 'p', long)]
    new_private_key: bool,

    /// Key specification of the new private key, defaults to the one of the
    /// renewed certificate. Requires `--new-private-key`.
    #[arg(short = 'k', long, value_name = "SPEC")]
    key_specification: Option<KeySpecification>,

    /// Replace the key material with the public key of this CSR. `-` reads
    /// the CSR from standard input.
    #[arg(short = 'c', long, value_name = "PATH|-")]
    csr: Option<CsrSource>,

    /// Replace the additional DNS names of a server certificate. Names are
    /// separated by commas, an empty value removes all additional names.
    #[arg(short = 'u', long, value_name = "DNS_NAMES")]
    update_dns_names: Option<String>,
}

impl RenewArguments {
    fn into_options(self) -> RenewalOptions<CsrSource> {
        RenewalOptions {
            new_private_key: self.new_private_key,
            key_specification: self.key_specification,
            csr: self.csr,
            dns_names: self.update_dns_names.as_deref().map(split_dns_names),
        }
    }
}

fn split_dns_names(dns_names: &str) -> Vec<String> {
    dns_names
        .split(',')
        .map(str::trim)
        .filter(|dns_name| !dns_name.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Renews a server or client certificate.
#[derive(Debug)]
pub struct RenewCommand;

impl CommandHandler for RenewCommand {
    fn name(&self) -> &'static str {
        "renew"
    }

    fn command(&self) -> Command {
        RenewArguments::augment_args(
            Command::new(self.name()).about("Renew a server or client certificate"),
        )
    }

    #[instrument(skip_all)]
    fn run(&self, matches: &ArgMatches, context: &mut Context<'_>) -> Result<()> {
        let arguments = RenewArguments::from_arg_matches(matches).context(ParseArgumentsSnafu)?;
        let entity_kind = arguments.entity_kind;
        let entity_name = arguments.entity_name.clone();

        // Reject conflicts before touching the project or reading a CSR
        let options = arguments.into_options();
        if let Err(conflict) = options.validate(entity_kind) {
            return ConflictingRenewalOptionsSnafu { conflict }.fail();
        }

        let hierarchy = context.project.load_hierarchy()?;
        let old_certificate = context.project.load_certificate(entity_kind, &entity_name)?;
        let options = options.try_map_csr(|source| context.read_csr(&source))?;

        let renewal = reconcile::renew(
            entity_kind,
            &old_certificate,
            options,
            hierarchy.issuing_ca(),
        )
        .context(RenewSnafu { entity_kind })?;

        let artifacts = context
            .project
            .save_renewal(entity_kind, &entity_name, &renewal)?;
        context.report(
            &format!(
                "Renewed {entity_kind} certificate for {entity_name:?} using the following artifacts:"
            ),
            &artifacts,
        )
    }
}

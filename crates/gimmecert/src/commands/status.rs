use std::io::Write;

use clap::{ArgMatches, Command};
use gimmecert_certs::{
    ext::subject_alternative_dns_names, leaf::EntityKind, name::common_name_of,
    validity::ValidityWindow,
};
use snafu::ResultExt;
use strum::IntoEnumIterator;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::instrument;
use x509_cert::{Certificate, name::Name};

use super::{CommandHandler, Context};
use crate::error::{FormatTimeSnafu, ReadValiditySnafu, Result, WriteOutputSnafu};

/// Shows the CA hierarchy and all issued certificates.
#[derive(Debug)]
pub struct StatusCommand;

impl CommandHandler for StatusCommand {
    fn name(&self) -> &'static str {
        "status"
    }

    fn command(&self) -> Command {
        Command::new(self.name()).about("Show the CA hierarchy and all issued certificates")
    }

    #[instrument(skip_all)]
    fn run(&self, _matches: &ArgMatches, context: &mut Context<'_>) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let mut report = String::new();

        if !context.project.is_initialized()? {
            report.push_str("CA hierarchy has not been initialised.\n");
            return write_report(context, &report);
        }

        report.push_str(&format!("Project: {}\n\nCA hierarchy:\n", context.project.name()));
        let hierarchy = context.project.load_hierarchy()?;
        for (index, ca) in hierarchy.levels().enumerate() {
            let annotation = if index + 1 == hierarchy.depth() {
                " [issuing CA]"
            } else {
                ""
            };

            report.push_str(&format!(
                "    Level {level}: {subject}{annotation}\n",
                level = index + 1,
                subject = display_name(ca.subject_name()),
            ));
            report.push_str(&format!(
                "        {}\n",
                describe_validity(ca.validity(), now)?
            ));
        }

        for entity_kind in EntityKind::iter() {
            let heading = match entity_kind {
                EntityKind::Server => "Server certificates",
                EntityKind::Client => "Client certificates",
            };
            report.push_str(&format!("\n{heading}:\n"));

            let entities = context.project.entities(entity_kind)?;
            if entities.is_empty() {
                report.push_str("    None\n");
            }

            for entity in entities {
                report.push_str(&format!(
                    "    {name}: {subject}\n",
                    name = entity.name,
                    subject = display_name(&entity.certificate.tbs_certificate.subject),
                ));
                report.push_str(&format!(
                    "        {}\n",
                    describe_validity(&certificate_validity(&entity.certificate)?, now)?
                ));

                if entity_kind == EntityKind::Server {
                    report.push_str(&format!(
                        "        DNS names: {}\n",
                        subject_alternative_dns_names(&entity.certificate).join(", ")
                    ));
                }

                let key_material = entity
                    .key_material
                    .map_or_else(|| "missing".to_owned(), |state| state.to_string());
                report.push_str(&format!("        Key material: {key_material}\n"));
            }
        }

        write_report(context, &report)
    }
}

fn write_report(context: &mut Context<'_>, report: &str) -> Result<()> {
    context
        .output
        .write_all(report.as_bytes())
        .context(WriteOutputSnafu)
}

fn display_name(name: &Name) -> String {
    common_name_of(name).unwrap_or_else(|| name.to_string())
}

fn certificate_validity(certificate: &Certificate) -> Result<ValidityWindow> {
    ValidityWindow::of_certificate(certificate).context(ReadValiditySnafu)
}

fn describe_validity(window: &ValidityWindow, now: OffsetDateTime) -> Result<String> {
    let marker = if now < window.not_before() {
        " [NOT YET VALID]"
    } else if now > window.not_after() {
        " [EXPIRED]"
    } else {
        ""
    };

    Ok(format!(
        "Valid from {} until {}{marker}",
        window.not_before().format(&Rfc3339).context(FormatTimeSnafu)?,
        window.not_after().format(&Rfc3339).context(FormatTimeSnafu)?,
    ))
}

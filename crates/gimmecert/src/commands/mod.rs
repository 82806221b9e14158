//! The command table of the `gimmecert` binary.
//!
//! Every command is a [`CommandHandler`] registered in one explicitly ordered
//! [`CommandTable`]. The table builds the clap [`Command`] and dispatches the
//! matched subcommand to its handler.
use std::{
    ffi::OsString,
    fmt::Debug,
    io::{Read, Write},
    path::PathBuf,
};

use clap::{ArgMatches, Args, Command, FromArgMatches};
use gimmecert_certs::{keys::KeySpecification, reconcile::IssuanceIntent};
use snafu::{OptionExt, ResultExt};
use tracing::{debug, instrument};
use x509_cert::request::CertReq;

use crate::{
    csr_input::{self, CsrSource},
    error::{
        MissingCommandSnafu, ParseArgumentsSnafu, ReadCsrSnafu, Result, UnknownCommandSnafu,
        WriteOutputSnafu,
    },
    project::{Artifacts, Project},
};

mod client;
mod init;
mod renew;
mod server;
mod status;

pub use client::ClientCommand;
pub use init::InitCommand;
pub use renew::RenewCommand;
pub use server::ServerCommand;
pub use status::StatusCommand;

/// The environment variable selecting the project directory.
pub const PROJECT_DIRECTORY_ENV: &str = "GIMMECERT_PROJECT_DIR";

/// Arguments shared by all commands.
#[derive(Debug, Args)]
pub struct GlobalArguments {
    /// Directory of the project, the CA and all issued artifacts are stored
    /// below its `.gimmecert` directory.
    #[arg(
        long,
        global = true,
        env = PROJECT_DIRECTORY_ENV,
        default_value = ".",
        value_name = "DIRECTORY"
    )]
    pub project_dir: PathBuf,
}

/// Everything a command needs to run.
pub struct Context<'a> {
    pub project: Project,
    pub input: &'a mut dyn Read,
    pub output: &'a mut dyn Write,

    /// Whether the input is a terminal, a prompt is shown before reading a
    /// CSR from it.
    pub interactive: bool,
}

impl Context<'_> {
    pub fn read_csr(&mut self, source: &CsrSource) -> Result<CertReq> {
        let prompt: Option<&mut dyn Write> = if self.interactive {
            Some(&mut *self.output)
        } else {
            None
        };

        csr_input::read_csr(source, &mut *self.input, prompt).context(ReadCsrSnafu)
    }

    /// A given CSR wins over a key specification, clap rejects passing both.
    pub fn issuance_intent(
        &mut self,
        csr: Option<&CsrSource>,
        key_specification: Option<KeySpecification>,
    ) -> Result<IssuanceIntent> {
        match csr {
            Some(source) => Ok(IssuanceIntent::UseCsr(self.read_csr(source)?)),
            None => Ok(IssuanceIntent::GenerateKey(key_specification)),
        }
    }

    /// Writes a headline followed by the locations of all written and
    /// removed artifacts.
    pub fn report(&mut self, headline: &str, artifacts: &Artifacts) -> Result<()> {
        writeln!(self.output, "{headline}").context(WriteOutputSnafu)?;

        for (description, key) in &artifacts.written {
            writeln!(
                self.output,
                "    {description}: {}",
                self.project.location(key).display()
            )
            .context(WriteOutputSnafu)?;
        }

        for key in &artifacts.removed {
            writeln!(
                self.output,
                "    Removed: {}",
                self.project.location(key).display()
            )
            .context(WriteOutputSnafu)?;
        }

        Ok(())
    }
}

/// A subcommand of the `gimmecert` binary.
pub trait CommandHandler: Debug {
    /// The name the subcommand is invoked with.
    fn name(&self) -> &'static str;

    /// The clap definition of the subcommand, named [`Self::name`].
    fn command(&self) -> Command;

    fn run(&self, matches: &ArgMatches, context: &mut Context<'_>) -> Result<()>;
}

/// The ordered set of commands, built once per invocation.
#[derive(Debug)]
pub struct CommandTable {
    handlers: Vec<Box<dyn CommandHandler>>,
}

impl CommandTable {
    pub fn new(handlers: Vec<Box<dyn CommandHandler>>) -> Self {
        Self { handlers }
    }

    /// All commands of the `gimmecert` binary in help order.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(InitCommand),
            Box::new(ServerCommand),
            Box::new(ClientCommand),
            Box::new(RenewCommand),
            Box::new(StatusCommand),
        ])
    }

    pub fn cli(&self) -> Command {
        let root = Command::new("gimmecert")
            .about("Issue and renew X.509 certificates from a local CA hierarchy for test environments")
            .version(env!("CARGO_PKG_VERSION"))
            .subcommand_required(true)
            .arg_required_else_help(true);

        self.handlers
            .iter()
            .fold(GlobalArguments::augment_args(root), |root, handler| {
                root.subcommand(handler.command())
            })
    }

    /// Runs the subcommand selected by `matches`, which must come from
    /// [`Self::cli`].
    #[instrument(skip_all)]
    pub fn execute(
        &self,
        matches: &ArgMatches,
        input: &mut dyn Read,
        output: &mut dyn Write,
        interactive: bool,
    ) -> Result<()> {
        let global = GlobalArguments::from_arg_matches(matches).context(ParseArgumentsSnafu)?;
        let (name, sub_matches) = matches.subcommand().context(MissingCommandSnafu)?;
        let handler = self
            .handlers
            .iter()
            .find(|handler| handler.name() == name)
            .context(UnknownCommandSnafu { name })?;

        debug!(command = name, project_dir = %global.project_dir.display(), "running command");

        let mut context = Context {
            project: Project::open(&global.project_dir)?,
            input,
            output,
            interactive,
        };
        handler.run(sub_matches, &mut context)
    }

    /// Parses `args` (including the binary name) and runs the selected
    /// subcommand non-interactively.
    pub fn try_execute_from<I, T>(
        &self,
        args: I,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self
            .cli()
            .try_get_matches_from(args)
            .context(ParseArgumentsSnafu)?;
        self.execute(&matches, input, output, false)
    }
}

//! Reading externally supplied CSRs from a file or from standard input.
use std::{
    convert::Infallible,
    fs,
    io::{self, Read, Write},
    path::PathBuf,
    str::FromStr,
};

use gimmecert_certs::{ErrorKind, request};
use snafu::{ResultExt, Snafu};
use x509_cert::request::CertReq;

/// The argument value selecting standard input.
pub const STDIN_ARGUMENT: &str = "-";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read CSR from {}", path.display()))]
    ReadFile { source: io::Error, path: PathBuf },

    #[snafu(display("failed to read CSR from standard input"))]
    ReadStdin { source: io::Error },

    #[snafu(display("failed to prompt for CSR"))]
    Prompt { source: io::Error },

    #[snafu(display("malformed CSR from {origin}"))]
    Decode {
        source: request::Error,
        origin: String,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode { .. } => ErrorKind::MalformedCsr,
            _ => ErrorKind::Other,
        }
    }
}

/// Where a CSR is read from, `-` selects standard input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CsrSource {
    Stdin,
    Path(PathBuf),
}

impl FromStr for CsrSource {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input == STDIN_ARGUMENT {
            Ok(Self::Stdin)
        } else {
            Ok(Self::Path(PathBuf::from(input)))
        }
    }
}

impl std::fmt::Display for CsrSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => f.write_str("standard input"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Reads and decodes a PEM encoded CSR.
///
/// Standard input is read until end of input. When `prompt` is given, a hint
/// explaining how to finish the input is written to it first.
pub fn read_csr(
    source: &CsrSource,
    input: &mut dyn Read,
    prompt: Option<&mut dyn Write>,
) -> Result<CertReq, Error> {
    let pem = match source {
        CsrSource::Stdin => {
            if let Some(prompt) = prompt {
                writeln!(
                    prompt,
                    "Please enter the CSR (finish with Ctrl-D on an empty line):"
                )
                .context(PromptSnafu)?;
                prompt.flush().context(PromptSnafu)?;
            }
            read_until_eof(input).context(ReadStdinSnafu)?
        }
        CsrSource::Path(path) => fs::read_to_string(path).context(ReadFileSnafu { path })?,
    };

    request::from_pem(&pem).context(DecodeSnafu {
        origin: source.to_string(),
    })
}

pub fn read_until_eof(input: &mut dyn Read) -> io::Result<String> {
    let mut contents = String::new();
    input.read_to_string(&mut contents)?;
    Ok(contents)
}

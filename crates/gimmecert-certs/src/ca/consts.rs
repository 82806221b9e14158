use x509_cert::der::pem::LineEnding;

/// The default number of CA levels in a freshly initialized hierarchy.
pub const DEFAULT_CA_HIERARCHY_DEPTH: usize = 1;

/// Line ending used for every PEM document written by this crate.
pub const PEM_LINE_ENDING: LineEnding = LineEnding::LF;

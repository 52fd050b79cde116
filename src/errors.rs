//! Error taxonomy for the compilation pipeline.
//!
//! Validation findings are not errors: they travel as [`crate::schema::Message`] values.
//! A resolution miss is `None`, not an error.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Source could not be read or parsed during static inspection.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Compiling or executing a module inside the sandbox failed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to compile {} for extraction: {source}", path.display())]
    Compile {
        path: PathBuf,
        #[source]
        source: BuildError,
    },

    #[error("{} threw during extraction: {message}", path.display())]
    Execution { path: PathBuf, message: String },

    #[error("{} has no default export", path.display())]
    MissingDefault { path: PathBuf },

    #[error("default export of {} is a {kind} and cannot leave the sandbox", path.display())]
    NotSerializable { path: PathBuf, kind: String },
}

/// Fatal failure while emitting a bundle.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("syntax error in {file}: {message}")]
    Syntax { file: String, message: String },

    #[error("transform failed for {file}: {message}")]
    Transform { file: String, message: String },

    #[error("could not resolve \"{specifier}\" from {importer}")]
    Unresolved { specifier: String, importer: String },

    #[error("invalid define key \"{key}\"")]
    InvalidDefine { key: String },

    #[error("cannot assign to substituted expression \"{key}\" in {file}")]
    IncompatibleDefine { file: String, key: String },

    #[error("invalid target \"{target}\": {message}")]
    InvalidTarget { target: String, message: String },

    #[error("refusing to overwrite {}", path.display())]
    OutputExists { path: PathBuf },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Anything that aborts the compilation of a single module.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

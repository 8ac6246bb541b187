//! Rich diagnostic error types for atomspace-hub.
//!
//! Configuration-time failures (duplicate ids, missing files, decode errors)
//! abort startup; query-time failures (parse errors, unknown spaces) are
//! scoped to the single request that produced them.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the hub.
#[derive(Debug, Error, Diagnostic)]
pub enum HubError {
    #[error("an atomspace with id \"{id}\" already exists")]
    #[diagnostic(
        code(hub::space::duplicate_id),
        help(
            "Space ids must be unique across the settings file. \
             Rename one of the entries or remove the existing space first."
        )
    )]
    DuplicateId { id: String },

    #[error("invalid atomspace id \"{id}\": {reason}")]
    #[diagnostic(
        code(hub::space::invalid_id),
        help(
            "Each space is served at `/{{id}}`, so ids must be non-empty, \
             must not contain '/', and must not shadow the metadata routes."
        )
    )]
    InvalidId { id: String, reason: String },

    #[error("atomspace with id \"{id}\" not found")]
    #[diagnostic(
        code(hub::space::not_found),
        help("List the loaded spaces with `GET /atomspaces`.")
    )]
    SpaceNotFound { id: String },

    #[error("no such file: {path}")]
    #[diagnostic(
        code(hub::ingest::file_not_found),
        help("Check the `scmFile` path in the settings file. Relative paths resolve against the working directory.")
    )]
    FileNotFound { path: String },

    #[error("no such directory: {path}")]
    #[diagnostic(
        code(hub::ingest::dir_not_found),
        help("Check the `pathDir` path in the settings file and that it names a directory.")
    )]
    DirectoryNotFound { path: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(hub::io),
        help("A filesystem operation failed. Check permissions on the path.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path} at line {line}: {message}")]
    #[diagnostic(
        code(hub::ingest::decode),
        help(
            "Knowledge files hold Atomese s-expressions such as \
             `(InheritanceLink (ConceptNode \"a\") (ConceptNode \"b\"))`."
        )
    )]
    Decode {
        path: String,
        line: usize,
        message: String,
    },

    #[error("failed to parse expression at byte {offset}: {message}")]
    #[diagnostic(
        code(hub::query::parse),
        help("Send a single well-formed Atomese expression, e.g. `(GetLink (InheritanceLink (VariableNode \"$x\") (ConceptNode \"animal\")))`.")
    )]
    Parse { offset: usize, message: String },

    #[error("query against unknown atomspace \"{id}\"")]
    #[diagnostic(
        code(hub::query::not_found),
        help("The space may have been removed after the endpoint was bound.")
    )]
    QueryNotFound { id: String },

    #[error("query did not complete within {timeout:?}")]
    #[diagnostic(
        code(hub::query::timeout),
        help("Raise `--query-timeout` or set it to 0 to wait without limit.")
    )]
    QueryTimeout { timeout: Duration },

    #[error("invalid settings: {message}")]
    #[diagnostic(
        code(hub::config),
        help(
            "The settings file is a JSON array of entries like \
             `{{\"id\": \"bio\", \"scmFile\": \"bio.scm\"}}` or \
             `{{\"id\": \"bio\", \"pathDir\": \"data/bio\"}}`."
        )
    )]
    Config { message: String },

    #[error("transport error: {message}")]
    #[diagnostic(
        code(hub::transport),
        help("The client connection failed or could not keep up with the result stream.")
    )]
    Transport { message: String },
}

/// Convenience result type for hub operations.
pub type HubResult<T> = std::result::Result<T, HubError>;

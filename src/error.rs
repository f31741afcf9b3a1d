use std::path::PathBuf;
use thiserror::Error;

/// Remote error signatures that mean the stored credentials were rejected
const AUTH_FAILURE_SIGNATURES: &[&str] = &[
    "INVALID_LOGIN",
    "INVALID_OPERATION_WITH_EXPIRED_PASSWORD",
    "LOGIN_MUST_USE_SECURITY_TOKEN",
];

/// Failures a caller may want to tell apart from plain I/O errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Directory already exists!")]
    DirectoryExists(PathBuf),
    #[error("Please specify a project name")]
    MissingName,
    #[error("Please specify a username")]
    MissingUsername,
    #[error("Could not find a metadata root (src) in {0}")]
    MissingMetadataRoot(PathBuf),
    #[error("Could not find package.xml in {0}")]
    MissingManifest(PathBuf),
    #[error("Cannot create a project inside the directory it is created from: {0}")]
    DestinationInsideOrigin(PathBuf),
    #[error("This does not look like a project: {0} is missing")]
    NotAProject(PathBuf),
    #[error("Could not retrieve a password for project {0}")]
    MissingPassword(String),
    #[error("Unrecognized metadata type: {0}")]
    UnknownMetadataType(String),
    #[error("Project is not connected to the server")]
    NotConnected,
    #[error("Project has not been initialized")]
    NotInitialized,
    #[error("Authentication failed: {0}")]
    Authentication(String),
}

/// Check whether an error message carries one of the authentication signatures
pub fn is_auth_failure(message: &str) -> bool {
    AUTH_FAILURE_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

/// Rewrap a remote error as `SyncError::Authentication` when it matches a signature
pub fn classify_remote_error(err: anyhow::Error) -> anyhow::Error {
    if matches!(err.downcast_ref::<SyncError>(), Some(SyncError::Authentication(_))) {
        return err;
    }

    let message = format!("{:#}", err);
    if is_auth_failure(&message) {
        SyncError::Authentication(message).into()
    }
    else {
        err
    }
}

/// Whether an error (anywhere in its chain) is an authentication failure
pub fn is_authentication_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(cause.downcast_ref::<SyncError>(), Some(SyncError::Authentication(_)))
    }) || is_auth_failure(&format!("{:#}", err))
}

//! Operations exposed by the CLI: export, import and inspect.

use std::path::Path;

use crate::{
    artifact::{read_companion, validate_package},
    config::ServiceConfig,
    error::DeployError,
    http::{FilePart, Transport},
    progress::Progress,
    runtime::Runtime,
};

mod export;
mod import;
mod inspect;
pub mod services;

pub use export::{ExportKind, ExportOutcome, ExportRequest, export};
pub use import::{ImportOutcome, ImportRequest, import};
pub use inspect::{InspectOutcome, InspectRequest, inspect};

pub(crate) const PACKAGE_FIELD: &str = "packageFileName";
pub(crate) const CUSTOMIZATION_FIELD: &str = "customizationFileName";
pub(crate) const ADMIN_SETTINGS_FIELD: &str = "adminConsoleSettingsFileName";
pub(crate) const PLUGINS_FIELD: &str = "pluginsFileName";

/// Collaborators every operation runs against.
pub struct Context<'a, T: Transport + ?Sized, R: Runtime + ?Sized> {
    pub transport: &'a T,
    pub runtime: &'a R,
    pub progress: &'a dyn Progress,
    pub service: &'a ServiceConfig,
}

impl<'a, T: Transport + ?Sized, R: Runtime + ?Sized> Context<'a, T, R> {
    pub fn new(
        transport: &'a T,
        runtime: &'a R,
        progress: &'a dyn Progress,
        service: &'a ServiceConfig,
    ) -> Self {
        Self {
            transport,
            runtime,
            progress,
            service,
        }
    }
}

fn file_name(path: &Path) -> Result<String, DeployError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DeployError::Validation(format!("{} has no file name", path.display())))
}

/// Validate the package archive and load it as the `packageFileName` part.
pub(crate) fn package_part<R: Runtime + ?Sized>(
    runtime: &R,
    path: &Path,
) -> Result<FilePart, DeployError> {
    let data = validate_package(runtime, path)?;
    Ok(FilePart::new(PACKAGE_FIELD, file_name(path)?, data))
}

/// Load an optional companion file as the part named `field`.
pub(crate) fn companion_part<R: Runtime + ?Sized>(
    runtime: &R,
    field: &str,
    what: &str,
    path: Option<&Path>,
) -> Result<Option<FilePart>, DeployError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let data = read_companion(runtime, what, path)?;
    Ok(Some(FilePart::new(field, file_name(path)?, data)))
}

//! Deployment pipeline.
//!
//! One pass per host start: packed bundles (`.tar`) directly under the
//! applications directory are unpacked in place, then every subdirectory is
//! deployed as an application. A failing unit (bad archive, bad manifest,
//! unresolvable handler, or a panic out of application-provided start code)
//! is logged and skipped. The host keeps serving whatever did start; nothing
//! in this module is fatal to the process.

use crate::app::{AppRegistry, Application, DeployContext, LifecycleState};
use crate::error::DeployError;
use crate::loader::HandlerTable;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Extension identifying a packed bundle.
pub const BUNDLE_EXT: &str = "tar";

/// Packed bundles directly under `dir`, lazily.
pub fn discover_bundles(dir: &Path) -> io::Result<impl Iterator<Item = PathBuf>> {
    let entries = std::fs::read_dir(dir)?;
    Ok(entries.filter_map(|entry| {
        let path = entry.ok()?.path();
        let packed = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(BUNDLE_EXT));
        packed.then_some(path)
    }))
}

/// Candidate application roots (subdirectories of `dir`), lazily.
pub fn discover_roots(dir: &Path) -> io::Result<impl Iterator<Item = PathBuf>> {
    let entries = std::fs::read_dir(dir)?;
    Ok(entries.filter_map(|entry| {
        let path = entry.ok()?.path();
        path.is_dir().then_some(path)
    }))
}

/// Extract a packed bundle into `dest/<stem>`, replacing any previous
/// extraction of the same bundle.
pub fn unpack(bundle: &Path, dest: &Path) -> Result<PathBuf, DeployError> {
    let bundle_name = bundle
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("bundle")
        .to_string();
    let extract = |source: io::Error| DeployError::Extract {
        bundle: bundle_name.clone(),
        source,
    };

    let stem = bundle
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| extract(io::Error::new(io::ErrorKind::InvalidInput, "unnamed bundle")))?;
    let target = dest.join(stem);
    if target.exists() {
        std::fs::remove_dir_all(&target).map_err(extract)?;
    }
    std::fs::create_dir_all(&target).map_err(extract)?;

    let file = File::open(bundle).map_err(extract)?;
    tar::Archive::new(file).unpack(&target).map_err(extract)?;
    Ok(target)
}

/// Construct and start one application from an unpacked root.
///
/// The start procedure runs under `catch_unwind`: a panic out of
/// application-provided code marks the unit Failed like any other start
/// error instead of unwinding into the host.
pub fn deploy(
    root: &Path,
    ctx: &DeployContext,
    own: HandlerTable,
) -> Result<Arc<Application>, DeployError> {
    let mut app = Application::new(root, ctx);
    let name = app.name().to_string();

    let outcome =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| app.start(ctx, own)));
    match outcome {
        Ok(Ok(())) => Ok(Arc::new(app)),
        Ok(Err(source)) => {
            app.mark(LifecycleState::Failed);
            Err(DeployError::Start { app: name, source })
        }
        Err(_) => {
            app.mark(LifecycleState::Failed);
            Err(DeployError::StartPanic(name))
        }
    }
}

/// Run the whole pipeline against one applications directory.
///
/// `own_tables` carries per-application handler tables registered through
/// the embedding API, keyed by application (directory) name; each is
/// consumed by its unit's loader.
///
/// Returns the number of units registered. Errors out only when the
/// directory itself cannot be scanned.
pub fn deploy_all(
    apps_dir: &Path,
    registry: &AppRegistry,
    ctx: &DeployContext,
    own_tables: &mut HashMap<String, HandlerTable>,
) -> io::Result<usize> {
    for bundle in discover_bundles(apps_dir)? {
        info!(bundle = %bundle.display(), "unpacking bundle");
        if let Err(e) = unpack(&bundle, apps_dir) {
            error!(error = %e, "bundle skipped");
        }
    }

    let mut deployed = 0;
    for root in discover_roots(apps_dir)? {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app")
            .to_string();
        let own = own_tables.remove(&name).unwrap_or_default();
        match deploy(&root, ctx, own) {
            Ok(app) => {
                registry.register(app);
                deployed += 1;
            }
            Err(e) => {
                // Contained: this unit stays out of the registry, the rest
                // of the scan continues.
                error!(app = %name, error = %e, "deployment failed, application excluded");
            }
        }
    }
    info!(deployed, "deployment pass complete");
    Ok(deployed)
}

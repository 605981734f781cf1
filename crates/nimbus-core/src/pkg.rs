//! Platform package naming and unpacking.
//!
//! A platform package is a gzipped tarball named `Nimbus_major.minor.micro.npkg`
//! whose payload is the prepared platform directory (daemon bits, bundled
//! services, the privileged updater executable).

use crate::fsx;
use crate::version::PlatformVersion;
use crate::{NimbusError, Result};
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};

/// Package file extension.
pub const PACKAGE_EXT: &str = "npkg";

/// Extract the version embedded in a package file name.
///
/// The name must be of the form `Name_major.minor.micro.npkg`; anything else
/// yields `None`.
pub fn version_from_package(pkg: &Path) -> Option<PlatformVersion> {
    let name = pkg.file_name()?.to_str()?;
    let stem = name.strip_suffix(&format!(".{PACKAGE_EXT}"))?;
    let (_, version) = stem.split_once('_')?;
    PlatformVersion::parse(version).ok().filter(|v| v.major().is_some())
}

/// Unpacks one platform package into a working directory.
pub struct PlatformUnpacker {
    pkg: PathBuf,
    dest_dir: PathBuf,
    version: PlatformVersion,
    staging: PathBuf,
}

impl PlatformUnpacker {
    pub fn new(pkg: &Path, dest_dir: &Path, version: PlatformVersion) -> Self {
        let staging = dest_dir.join(format!("unpack-{version}"));
        Self {
            pkg: pkg.to_path_buf(),
            dest_dir: dest_dir.to_path_buf(),
            version,
            staging,
        }
    }

    /// Extract the package archive into a staging area under the working
    /// directory.
    pub fn unpack(&self) -> Result<()> {
        let file = std::fs::File::open(&self.pkg)
            .map_err(|e| NimbusError::io_with_path(e, &self.pkg))?;
        fsx::remove_best_effort(&self.staging);
        std::fs::create_dir_all(&self.staging)
            .map_err(|e| NimbusError::io_with_path(e, &self.staging))?;

        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive.unpack(&self.staging).map_err(|e| NimbusError::Unpack {
            message: format!("{}: {e}", self.pkg.display()),
        })
    }

    /// Run the package's embedded install step: stage the payload into the
    /// version-named platform directory the privileged installer will be
    /// pointed at.
    pub fn install(&self) -> Result<()> {
        let platform_dir = self.dest_dir.join(self.version.to_string());
        fsx::remove_best_effort(&platform_dir);
        fsx::copy_dir_all(&self.staging, &platform_dir)?;
        fsx::remove_best_effort(&self.staging);
        Ok(())
    }
}

//! Module manifest retrieval.

use crate::error::{Error, ErrorKind, Result, WrapOp};
use crate::git::{CodeHost, RevInfo, join_path};

pub const MANIFEST_FILE: &str = "go.mod";

/// Reads `go.mod` at the module root, verbatim.
pub struct ManifestReader;

impl ManifestReader {
    pub fn read(host: &dyn CodeHost, subdir: &str, revision: &RevInfo) -> Result<Vec<u8>> {
        const OP: &str = "manifest.read";
        let path = join_path(subdir, MANIFEST_FILE);
        match host.read_file(&revision.id, &path).wrap(OP)? {
            Some(bytes) => Ok(bytes),
            None => Err(Error::new(
                OP,
                ErrorKind::ManifestNotFound {
                    path,
                    revision: revision.id.clone(),
                },
            )),
        }
    }
}

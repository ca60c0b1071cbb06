/// What a repository backend supports. The orchestrator queries this and
/// degrades behavior rather than failing — e.g. skip hardlink creation when
/// `hard_link` is false, create parent directories explicitly when `path`
/// is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryFeatures {
    pub compress: bool,
    pub hard_link: bool,
    pub sym_link: bool,
    pub path_sync: bool,
    pub path: bool,
}

impl RepositoryFeatures {
    pub const fn local_filesystem() -> Self {
        RepositoryFeatures {
            compress: true,
            hard_link: true,
            sym_link: true,
            path_sync: true,
            path: true,
        }
    }
}

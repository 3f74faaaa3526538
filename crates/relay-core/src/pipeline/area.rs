use std::{
    io,
    path::{Path, PathBuf},
};

use crate::timefmt;

/// Job-scoped directory under the work root holding the project and the job log.
#[derive(Debug)]
pub struct WorkingArea {
    path: PathBuf,
}

impl WorkingArea {
    /// Creates `<root>/YYYY.MM.DD-H.m-<uuid>`, creating `root` when needed.
    pub async fn create(root: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let name = format!(
            "{}{}",
            timefmt::area_prefix(timefmt::now_local()),
            uuid::Uuid::new_v4().simple()
        );
        let path = root.join(name);
        tokio::fs::create_dir(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(self) -> io::Result<()> {
        tokio::fs::remove_dir_all(&self.path).await
    }
}

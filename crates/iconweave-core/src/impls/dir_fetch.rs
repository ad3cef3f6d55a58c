//! DirectoryFetcher - ローカルディレクトリを配信元とみなす Fetcher
//!
//! `file://` はそのまま、それ以外は URL の path を root 配下に写像する。

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::domain::FetchError;
use crate::ports::Fetcher;

pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, url: &Url) -> Result<PathBuf, FetchError> {
        if url.scheme() == "file" {
            return url
                .to_file_path()
                .map_err(|_| FetchError::status(400, url.as_str()));
        }
        let mut path = self.root.clone();
        for segment in url.path_segments().into_iter().flatten() {
            if segment.is_empty() {
                continue;
            }
            if segment == ".." {
                return Err(FetchError::status(403, url.as_str()));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl Fetcher for DirectoryFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError> {
        let path = self.locate(url)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FetchError::status(404, url.as_str())),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(FetchError::status(403, url.as_str()))
            }
            Err(e) => Err(FetchError::connection(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn maps_url_path_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("icons/regular")).unwrap();
        std::fs::write(dir.path().join("icons/regular/a.svg"), b"<svg/>").unwrap();

        let fetcher = DirectoryFetcher::new(dir.path());
        let url = Url::parse("https://app.example/icons/regular/a.svg").unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), Bytes::from_static(b"<svg/>"));

        let missing = Url::parse("https://app.example/icons/regular/b.svg").unwrap();
        assert_eq!(
            fetcher.fetch(&missing).await.unwrap_err(),
            FetchError::status(404, missing.as_str())
        );
    }
}
